//! Storefront traffic over plain HTTP.
use crate::graphql::{error_messages, Auth, GraphQlClient, GraphQlOutcome, Operation};
use crate::http::{send, status_ok};
use crate::queries::{user_profile_variables, GET_USER_PROFILE};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use stampede::prelude::*;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

pub const SEARCH_TERMS: [&str; 8] = [
    "laptop",
    "phone",
    "headphones",
    "keyboard",
    "mouse",
    "monitor",
    "desk",
    "chair",
];

/// The shorter list the browse/buy personas pick from.
pub const SHOPPER_SEARCH_TERMS: [&str; 3] = ["laptop", "phone", "tablet"];

pub const PRODUCT_FIELDS: [&str; 3] = ["id", "name", "price"];

const JOURNEY_PRODUCT_ID: u32 = 123;
const SIMULATED_TOKEN: &str = "simulated_token";

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, terms: &[&'a str]) -> &'a str {
    terms.choose(rng).copied().unwrap_or("laptop")
}

fn product_id<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(1..=100)
}

/* Response checks */

pub fn check_homepage(status: StatusCode, body: &[u8]) -> Result<(), String> {
    if status != StatusCode::OK {
        return Err(format!("Unexpected status: {}", status.as_u16()));
    }
    let text = String::from_utf8_lossy(body);
    if text.contains("<!DOCTYPE html>") || text.contains("<html") {
        Ok(())
    } else {
        Err("Homepage didn't return HTML".to_string())
    }
}

pub fn check_search(status: StatusCode, body: &[u8]) -> Result<(), String> {
    if status != StatusCode::OK {
        return Err(format!("Search failed: {}", status.as_u16()));
    }
    let data: Value =
        serde_json::from_slice(body).map_err(|_| "Invalid JSON response".to_string())?;
    match data.get("results") {
        Some(results) if data.is_object() => {
            trace!("Search returned {} results", results.as_array().map_or(0, Vec::len));
            Ok(())
        }
        _ => Err("Invalid search response format".to_string()),
    }
}

/// A 404 is an expected miss, not a failure.
pub fn check_product(status: StatusCode, body: &[u8]) -> Result<(), String> {
    match status {
        StatusCode::OK => {
            let data: Value =
                serde_json::from_slice(body).map_err(|_| "Invalid JSON response".to_string())?;
            let missing: Vec<&str> = PRODUCT_FIELDS
                .iter()
                .copied()
                .filter(|field| data.get(field).is_none())
                .collect();
            if missing.is_empty() {
                Ok(())
            } else {
                Err(format!("Missing fields: {missing:?}"))
            }
        }
        StatusCode::NOT_FOUND => Ok(()),
        status => Err(format!("Unexpected status: {}", status.as_u16())),
    }
}

pub fn check_cart(status: StatusCode, body: &[u8]) -> Result<(), String> {
    if status != StatusCode::OK && status != StatusCode::CREATED {
        return Err(format!("Add to cart failed: {}", status.as_u16()));
    }
    let data: Value =
        serde_json::from_slice(body).map_err(|_| "Invalid JSON response".to_string())?;
    if data.get("success").and_then(Value::as_bool).unwrap_or(false) {
        Ok(())
    } else {
        Err("Add to cart reported failure".to_string())
    }
}

/* RealisticWebUser */

#[derive(Copy, Clone, Debug)]
pub enum WebTask {
    Homepage,
    Search,
    ProductDetail,
    UserProfile,
    AddToCart,
}

/// A validated mix of browsing, searching, a GraphQL profile lookup and the
/// occasional add to cart.
pub struct RealisticWebUser {
    client: Client,
    graphql: GraphQlClient,
    user_id: String,
    token: String,
    requests_made: u64,
    rng: SmallRng,
}

impl RealisticWebUser {
    pub fn new(client: Client, graphql: GraphQlClient) -> Self {
        Self {
            client,
            graphql,
            user_id: String::new(),
            token: String::new(),
            requests_made: 0,
            rng: SmallRng::from_entropy(),
        }
    }

    fn authenticate(&mut self) {
        self.token = SIMULATED_TOKEN.to_string();
    }
}

impl User for RealisticWebUser {
    type Task = WebTask;

    fn tasks(&self) -> Result<TaskSet<WebTask>, TaskSetError> {
        TaskSet::weighted([
            (WebTask::Homepage, 5),
            (WebTask::Search, 3),
            (WebTask::ProductDetail, 2),
            (WebTask::UserProfile, 1),
            (WebTask::AddToCart, 1),
        ])
    }

    fn wait_time(&self) -> WaitTime {
        WaitTime::between_secs(1., 5.)
    }

    async fn on_start(&mut self, ctx: &UserContext) -> Result<(), UserError> {
        self.user_id = format!("user_{}", self.rng.gen_range(1000..=9999));
        self.authenticate();
        info!("User {} ({}) ready", ctx.id(), self.user_id);
        Ok(())
    }

    async fn execute(&mut self, task: WebTask, ctx: &UserContext) {
        self.requests_made += 1;
        let bearer = format!("Bearer {}", self.token);

        match task {
            WebTask::Homepage => {
                let req = self
                    .client
                    .get(ctx.url("/"))
                    .header(reqwest::header::AUTHORIZATION, &bearer);
                send(ctx, "GET", "Homepage", req, check_homepage).await;
            }
            WebTask::Search => {
                let query = pick(&mut self.rng, &SEARCH_TERMS);
                let req = self
                    .client
                    .get(ctx.url(&format!("/api/search?q={query}")))
                    .header(reqwest::header::AUTHORIZATION, &bearer);
                send(ctx, "GET", "Search API", req, check_search).await;
            }
            WebTask::ProductDetail => {
                let id = product_id(&mut self.rng);
                let req = self
                    .client
                    .get(ctx.url(&format!("/api/products/{id}")))
                    .header(reqwest::header::AUTHORIZATION, &bearer);
                send(ctx, "GET", "Product Detail API", req, check_product).await;
            }
            WebTask::UserProfile => {
                let op = Operation::new("GetUserProfile", GET_USER_PROFILE)
                    .variables(user_profile_variables(&self.user_id))
                    .label("GraphQL: User Profile");
                let exchange = self.graphql.exchange(&op, Auth::Bearer(&self.token)).await;
                ctx.fire(exchange.event_with(&op, check_profile(&exchange.outcome, op.name)));
            }
            WebTask::AddToCart => {
                let id = product_id(&mut self.rng);
                let quantity = self.rng.gen_range(1..=3);
                let req = self
                    .client
                    .post(ctx.url("/api/cart/add"))
                    .header(reqwest::header::AUTHORIZATION, &bearer)
                    .json(&json!({
                        "product_id": id,
                        "quantity": quantity,
                        "user_id": self.user_id,
                    }));
                if send(ctx, "POST", "Add to Cart API", req, check_cart).await {
                    debug!("Added product {id} to cart");
                }
            }
        }
    }

    async fn on_stop(&mut self, ctx: &UserContext) {
        info!(
            "User {} stopping after {:.1}s ({} requests)",
            self.user_id,
            ctx.lifetime().as_secs_f64(),
            self.requests_made
        );
    }
}

/* BrowserUser */

#[derive(Copy, Clone, Debug)]
pub enum BrowseTask {
    Homepage,
    Search,
    Product,
}

/// Window shopper: mostly browses, rarely looks closer.
pub struct BrowserUser {
    client: Client,
    rng: SmallRng,
}

impl BrowserUser {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            rng: SmallRng::from_entropy(),
        }
    }
}

impl User for BrowserUser {
    type Task = BrowseTask;

    fn tasks(&self) -> Result<TaskSet<BrowseTask>, TaskSetError> {
        TaskSet::weighted([
            (BrowseTask::Homepage, 10),
            (BrowseTask::Search, 5),
            (BrowseTask::Product, 1),
        ])
    }

    fn wait_time(&self) -> WaitTime {
        WaitTime::between_secs(2., 5.)
    }

    async fn execute(&mut self, task: BrowseTask, ctx: &UserContext) {
        let (name, path) = match task {
            BrowseTask::Homepage => ("Browse: Homepage", "/".to_string()),
            BrowseTask::Search => (
                "Browse: Search",
                format!("/api/search?q={}", pick(&mut self.rng, &SHOPPER_SEARCH_TERMS)),
            ),
            BrowseTask::Product => (
                "Browse: Product",
                format!("/api/products/{}", product_id(&mut self.rng)),
            ),
        };
        send(ctx, "GET", name, self.client.get(ctx.url(&path)), status_ok).await;
    }
}

/* BuyerUser */

#[derive(Copy, Clone, Debug)]
pub enum BuyTask {
    Search,
    Product,
    AddToCart,
}

/// Motivated shopper: fewer page views, more carts.
pub struct BuyerUser {
    client: Client,
    rng: SmallRng,
}

impl BuyerUser {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            rng: SmallRng::from_entropy(),
        }
    }
}

impl User for BuyerUser {
    type Task = BuyTask;

    fn tasks(&self) -> Result<TaskSet<BuyTask>, TaskSetError> {
        TaskSet::weighted([
            (BuyTask::Search, 3),
            (BuyTask::Product, 5),
            (BuyTask::AddToCart, 2),
        ])
    }

    fn wait_time(&self) -> WaitTime {
        WaitTime::between_secs(1., 3.)
    }

    async fn execute(&mut self, task: BuyTask, ctx: &UserContext) {
        match task {
            BuyTask::Search => {
                let query = pick(&mut self.rng, &SHOPPER_SEARCH_TERMS);
                let req = self.client.get(ctx.url(&format!("/api/search?q={query}")));
                send(ctx, "GET", "Buyer: Search", req, status_ok).await;
            }
            BuyTask::Product => {
                let id = product_id(&mut self.rng);
                let req = self.client.get(ctx.url(&format!("/api/products/{id}")));
                send(ctx, "GET", "Buyer: Product", req, status_ok).await;
            }
            BuyTask::AddToCart => {
                let req = self
                    .client
                    .post(ctx.url("/api/cart/add"))
                    .json(&json!({ "product_id": product_id(&mut self.rng), "quantity": 1 }));
                send(ctx, "POST", "Buyer: Add to Cart", req, status_ok).await;
            }
        }
    }
}

/* JourneyUser */

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum JourneyStep {
    Homepage,
    Search,
    Product,
    AddToCart,
}

/// Walks homepage, search, product and cart in that order, over and over.
pub struct JourneyUser {
    client: Client,
}

impl JourneyUser {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl User for JourneyUser {
    type Task = JourneyStep;

    fn tasks(&self) -> Result<TaskSet<JourneyStep>, TaskSetError> {
        TaskSet::sequential([
            JourneyStep::Homepage,
            JourneyStep::Search,
            JourneyStep::Product,
            JourneyStep::AddToCart,
        ])
    }

    fn wait_time(&self) -> WaitTime {
        WaitTime::between_secs(1., 2.)
    }

    async fn execute(&mut self, step: JourneyStep, ctx: &UserContext) {
        let (method, name, req) = match step {
            JourneyStep::Homepage => ("GET", "Journey: Homepage", self.client.get(ctx.url("/"))),
            JourneyStep::Search => (
                "GET",
                "Journey: Search",
                self.client.get(ctx.url("/api/search?q=laptop")),
            ),
            JourneyStep::Product => (
                "GET",
                "Journey: Product Detail",
                self.client
                    .get(ctx.url(&format!("/api/products/{JOURNEY_PRODUCT_ID}"))),
            ),
            JourneyStep::AddToCart => (
                "POST",
                "Journey: Add to Cart",
                self.client
                    .post(ctx.url("/api/cart/add"))
                    .json(&json!({ "product_id": JOURNEY_PRODUCT_ID, "quantity": 1 })),
            ),
        };
        send(ctx, method, name, req, status_ok).await;
    }
}

fn check_profile(outcome: &GraphQlOutcome, operation: &str) -> Option<String> {
    match outcome {
        GraphQlOutcome::GraphQlErrors(errors) => {
            Some(format!("GraphQL errors: {:?}", error_messages(errors)))
        }
        GraphQlOutcome::Success(data) if data.get("user").is_none() => {
            Some("Unexpected GraphQL response structure".to_string())
        }
        GraphQlOutcome::Success(_) => None,
        other => other.failure_message(operation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn homepage_wants_html() {
        assert!(check_homepage(StatusCode::OK, b"<!DOCTYPE html><html></html>").is_ok());
        assert!(check_homepage(StatusCode::OK, b"<html lang=\"en\">").is_ok());
        assert_eq!(
            check_homepage(StatusCode::OK, b"{}").unwrap_err(),
            "Homepage didn't return HTML"
        );
        assert_eq!(
            check_homepage(StatusCode::SERVICE_UNAVAILABLE, b"").unwrap_err(),
            "Unexpected status: 503"
        );
    }

    #[test]
    fn search_needs_results() {
        assert!(check_search(StatusCode::OK, br#"{"results":[{"id":1}]}"#).is_ok());
        assert_eq!(
            check_search(StatusCode::OK, br#"[1,2]"#).unwrap_err(),
            "Invalid search response format"
        );
        assert_eq!(
            check_search(StatusCode::OK, b"nope").unwrap_err(),
            "Invalid JSON response"
        );
    }

    #[test]
    fn profile_lists_graphql_error_messages() {
        let errors = GraphQlOutcome::GraphQlErrors(vec![
            json!({"message": "User not found"}),
            json!({"path": ["user"]}),
        ]);
        assert_eq!(
            check_profile(&errors, "GetUserProfile").unwrap(),
            r#"GraphQL errors: ["User not found", "Unknown"]"#
        );

        let ok = GraphQlOutcome::Success(json!({"user": {"id": "user123"}}));
        assert_eq!(check_profile(&ok, "GetUserProfile"), None);

        let shapeless = GraphQlOutcome::Success(json!({"viewer": {}}));
        assert_eq!(
            check_profile(&shapeless, "GetUserProfile").unwrap(),
            "Unexpected GraphQL response structure"
        );
    }

    #[test]
    fn product_missing_fields_and_404() {
        assert!(check_product(StatusCode::OK, br#"{"id":1,"name":"Desk","price":10}"#).is_ok());
        assert_eq!(
            check_product(StatusCode::OK, br#"{"id":1}"#).unwrap_err(),
            r#"Missing fields: ["name", "price"]"#
        );
        assert!(check_product(StatusCode::NOT_FOUND, b"").is_ok());
        assert!(check_product(StatusCode::INTERNAL_SERVER_ERROR, b"").is_err());
    }

    #[test]
    fn cart_accepts_created() {
        assert!(check_cart(StatusCode::CREATED, br#"{"success":true}"#).is_ok());
        assert_eq!(
            check_cart(StatusCode::OK, br#"{"success":false}"#).unwrap_err(),
            "Add to cart reported failure"
        );
        assert_eq!(
            check_cart(StatusCode::BAD_REQUEST, b"").unwrap_err(),
            "Add to cart failed: 400"
        );
    }

    #[test]
    fn journey_is_ordered() {
        let user = JourneyUser::new(Client::new());
        let mut tasks = user.tasks().unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let steps: Vec<_> = (0..5).map(|_| tasks.next_task(&mut rng)).collect();
        assert_eq!(
            steps,
            vec![
                JourneyStep::Homepage,
                JourneyStep::Search,
                JourneyStep::Product,
                JourneyStep::AddToCart,
                JourneyStep::Homepage,
            ]
        );
    }
}
