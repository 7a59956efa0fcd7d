//! A stand-in for the platform under test: the GraphQL endpoint, the identity
//! service's login API and the storefront REST endpoints, with canned data.
use axum::{
    debug_handler,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

pub const MOCK_API_KEY: &str = "mock-api-key";
pub const MOCK_LOGIN_ID: &str = "load@test.com";
pub const MOCK_PASSWORD: &str = "password";
pub const MOCK_TOKEN: &str = "mock-access-token";

/// Products with ids `1..=PRODUCT_COUNT` exist; anything else is a 404.
pub const PRODUCT_COUNT: u32 = 500;

#[derive(Clone, Debug)]
pub struct MockConfig {
    pub api_key: String,
    pub login_id: String,
    pub password: String,
    pub token: String,
    /// Added to every GraphQL response.
    pub graphql_delay: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            api_key: MOCK_API_KEY.to_string(),
            login_id: MOCK_LOGIN_ID.to_string(),
            password: MOCK_PASSWORD.to_string(),
            token: MOCK_TOKEN.to_string(),
            graphql_delay: Duration::ZERO,
        }
    }
}

type AppState = Arc<MockConfig>;

pub fn router(config: MockConfig) -> Router {
    Router::new()
        .route("/", get(homepage))
        .route("/graphql", post(graphql))
        .route("/api/login", post(login))
        .route("/api/search", get(search))
        .route("/api/products", get(products))
        .route("/api/products/:id", get(product))
        .route("/api/cart/add", post(add_to_cart))
        .route("/delay/ms/:delay_ms", get(delay))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(config))
}

pub async fn serve(listener: TcpListener, config: MockConfig) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Mock service listening on {addr}");
    }
    axum::serve(listener, router(config)).await
}

pub async fn run(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, MockConfig::default()).await
}

/* Identity */

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    login_id: String,
    password: String,
}

#[debug_handler]
async fn login(
    State(config): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Response {
    counter!("mock-service.login").increment(1);

    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| key == config.api_key);
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "Invalid API key").into_response();
    }

    if req.login_id == config.login_id && req.password == config.password {
        Json(json!({
            "token": config.token,
            "user": { "id": "user123", "email": req.login_id },
        }))
        .into_response()
    } else {
        debug!("Rejected login for {}", req.login_id);
        StatusCode::NOT_FOUND.into_response()
    }
}

/* GraphQL */

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlRequest {
    #[allow(unused)]
    query: String,
    operation_name: String,
    #[serde(default)]
    variables: Value,
}

fn has_session(headers: &HeaderMap, token: &str) -> bool {
    let expected = format!("access_token={token}");
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .any(|cookie| cookie.trim() == expected)
}

fn errors(message: &str) -> Json<Value> {
    Json(json!({ "data": null, "errors": [{ "message": message }] }))
}

#[debug_handler]
async fn graphql(
    State(config): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GraphQlRequest>,
) -> Json<Value> {
    counter!("mock-service.graphql", "operation" => req.operation_name.clone()).increment(1);
    if !config.graphql_delay.is_zero() {
        tokio::time::sleep(config.graphql_delay).await;
    }

    let session_required = matches!(
        req.operation_name.as_str(),
        "LineItemRows" | "AddMessageToConversations"
    );
    if session_required && !has_session(&headers, &config.token) {
        return errors("Not authenticated");
    }

    let vars = &req.variables;
    let data = match req.operation_name.as_str() {
        "LineItemRows" => line_item_rows(vars),
        "AddMessageToConversations" => match add_message(vars) {
            Some(data) => data,
            None => return errors("Invalid input for AddMessageToConversations"),
        },
        "GetUserProfile" => json!({
            "user": {
                "id": vars["userId"].as_str().unwrap_or("user123"),
                "name": "Load Test User",
                "email": MOCK_LOGIN_ID,
                "profile": { "avatar": null, "bio": "", "createdAt": "2024-01-01T00:00:00Z" },
            }
        }),
        "GetProducts" => {
            let limit = vars["limit"].as_u64().unwrap_or(20).min(PRODUCT_COUNT as u64) as u32;
            let offset = vars["offset"].as_u64().unwrap_or(0) as u32;
            let edges: Vec<Value> = (offset + 1..=(offset + limit).min(PRODUCT_COUNT))
                .map(|id| json!({ "node": product_json(id) }))
                .collect();
            json!({
                "products": {
                    "edges": edges,
                    "pageInfo": {
                        "hasNextPage": offset + limit < PRODUCT_COUNT,
                        "endCursor": (offset + limit).to_string(),
                    },
                }
            })
        }
        "AddToCart" => {
            let quantity = vars["quantity"].as_u64().unwrap_or(0);
            if quantity == 0 {
                json!({
                    "addToCart": {
                        "success": false,
                        "message": "Quantity must be positive",
                        "cart": null,
                    }
                })
            } else {
                json!({
                    "addToCart": {
                        "success": true,
                        "message": null,
                        "cart": {
                            "id": "cart123",
                            "items": [{
                                "product": { "id": vars["productId"], "name": "Product" },
                                "quantity": quantity,
                            }],
                            "total": 19.99 * quantity as f64,
                        }
                    }
                })
            }
        }
        other => return errors(&format!("Unknown operation {other}")),
    };

    Json(json!({ "data": data }))
}

fn line_item_rows(vars: &Value) -> Value {
    let page_size = vars["page"]["pageSize"].as_u64().unwrap_or(25);
    let rows: Vec<Value> = (1..=page_size.min(5))
        .map(|id| {
            json!({
                "id": id.to_string(),
                "name": format!("Line item {id}"),
                "status": "LIVE",
                "__typename": "LineItemRow",
            })
        })
        .collect();
    json!({
        "lineItemRows": {
            "rows": rows,
            "pageInfo": { "totalCount": rows.len(), "pageSize": page_size },
        }
    })
}

fn add_message(vars: &Value) -> Option<Value> {
    let messages = vars["input"]["messages"].as_array()?;
    let created: Vec<Value> = messages
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            json!({
                "id": (i + 1).to_string(),
                "body": msg["body"],
                "bodyPlainText": msg["bodyPlainText"],
                "isInternal": msg["isInternal"],
                "conversationId": msg["conversationId"],
                "__typename": "MessageType",
            })
        })
        .collect();
    Some(json!({ "addMessageToConversations": created }))
}

/* Storefront */

fn product_json(id: u32) -> Value {
    json!({
        "id": id,
        "name": format!("Product {id}"),
        "price": 9.99 + id as f64,
        "description": "A product",
        "inStock": id % 7 != 0,
    })
}

#[debug_handler]
async fn homepage() -> Html<&'static str> {
    counter!("mock-service.homepage").increment(1);
    Html("<!DOCTYPE html><html><head><title>Shop</title></head><body><h1>Shop</h1></body></html>")
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[debug_handler]
async fn search(Query(query): Query<SearchQuery>) -> Json<Value> {
    let results: Vec<Value> = (1..=3)
        .map(|id| json!({ "id": id, "name": format!("{} {id}", query.q) }))
        .collect();
    Json(json!({ "query": query.q, "results": results }))
}

#[debug_handler]
async fn products() -> Json<Value> {
    Json(json!({ "products": (1..=10).map(product_json).collect::<Vec<_>>() }))
}

#[debug_handler]
async fn product(Path(id): Path<u32>) -> Result<Json<Value>, StatusCode> {
    if (1..=PRODUCT_COUNT).contains(&id) {
        Ok(Json(product_json(id)))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Deserialize)]
struct CartRequest {
    product_id: u32,
    quantity: u32,
}

#[debug_handler]
async fn add_to_cart(Json(req): Json<CartRequest>) -> (StatusCode, Json<Value>) {
    if req.quantity == 0 || !(1..=PRODUCT_COUNT).contains(&req.product_id) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "message": "Invalid product or quantity" })),
        );
    }
    (
        StatusCode::CREATED,
        Json(json!({ "success": true, "product_id": req.product_id, "quantity": req.quantity })),
    )
}

#[debug_handler]
async fn delay(Path(delay_ms): Path<u64>) {
    counter!("mock-service.delay").increment(1);
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}
