mod utils;
#[allow(unused)]
use utils::*;

use mock_service::{MockConfig, MOCK_API_KEY, MOCK_LOGIN_ID, MOCK_PASSWORD, MOCK_TOKEN};
use reqwest::{Client, StatusCode};
use stampede_scenarios::graphql::{Auth, GraphQlClient, GraphQlError, GraphQlOutcome, Operation};
use stampede_scenarios::queries::{
    add_message_variables, line_item_rows_variables, products_variables, LINE_ITEM_ROWS,
};
use stampede_scenarios::{AuthError, Credentials, IdentityClient};

fn line_item_rows() -> Operation<'static> {
    Operation::new("LineItemRows", LINE_ITEM_ROWS).variables(line_item_rows_variables())
}

#[tokio::test]
async fn authenticated_query_succeeds() {
    let host = mock(MockConfig::default()).await;
    let graphql = GraphQlClient::new(Client::new(), &host);

    let exchange = graphql.exchange(&line_item_rows(), Auth::Cookie(MOCK_TOKEN)).await;
    assert!(exchange.outcome.is_success(), "{:?}", exchange.outcome);
    assert!(exchange.response_length > 0);

    let rows = &exchange.outcome.data().unwrap()["lineItemRows"]["rows"];
    assert_eq!(rows.as_array().unwrap().len(), 5);

    let event = exchange.event(&line_item_rows());
    assert!(event.is_success());
    assert_eq!(event.request_type, "POST");
    assert_eq!(event.name, "LineItemRows");
}

#[tokio::test]
async fn missing_session_is_a_graphql_error() {
    let host = mock(MockConfig::default()).await;
    let graphql = GraphQlClient::new(Client::new(), &host);

    let exchange = graphql.exchange(&line_item_rows(), Auth::None).await;
    let GraphQlOutcome::GraphQlErrors(errors) = &exchange.outcome else {
        panic!("expected GraphQL errors, got {:?}", exchange.outcome);
    };
    assert_eq!(errors[0]["message"], "Not authenticated");

    let event = exchange.event(&line_item_rows());
    let error = event.error.unwrap();
    assert!(error.starts_with("errors in request LineItemRows"), "{error}");
    assert!(error.contains("Not authenticated"));
}

#[tokio::test]
async fn mutation_with_variables() {
    let host = mock(MockConfig::default()).await;
    let graphql = GraphQlClient::new(Client::new(), &host);
    let op = Operation::new(
        "AddMessageToConversations",
        stampede_scenarios::queries::ADD_MESSAGE_TO_CONVERSATIONS,
    )
    .variables(add_message_variables(419246, "Load test message 1", false));

    let exchange = graphql.exchange(&op, Auth::Cookie(MOCK_TOKEN)).await;
    let created = &exchange.outcome.data().unwrap()["addMessageToConversations"][0];
    assert_eq!(created["bodyPlainText"], "Load test message 1");
    assert_eq!(created["conversationId"], 419246);
}

#[tokio::test]
async fn non_200_fails_regardless_of_body() {
    let host = mock(MockConfig::default()).await;
    // Nothing is mounted under this prefix.
    let graphql = GraphQlClient::new(Client::new(), &format!("{host}/v2"));
    let op = Operation::new("GetProducts", stampede_scenarios::queries::GET_PRODUCTS)
        .variables(products_variables(20, 0));

    let exchange = graphql.exchange(&op, Auth::None).await;
    assert!(matches!(
        exchange.outcome,
        GraphQlOutcome::Transport(GraphQlError::Status(404))
    ));
    assert_eq!(
        exchange.event(&op).error.as_deref(),
        Some("response failed with non-200 status code 404")
    );
}

#[tokio::test]
async fn connection_refused_is_a_transport_failure() {
    init();
    let graphql = GraphQlClient::new(Client::new(), "http://127.0.0.1:1");

    let exchange = graphql.exchange(&line_item_rows(), Auth::None).await;
    assert!(matches!(
        exchange.outcome,
        GraphQlOutcome::Transport(GraphQlError::Exception(_))
    ));
    assert!(!exchange.event(&line_item_rows()).is_success());
}

#[tokio::test]
async fn login_returns_token() {
    let host = mock(MockConfig::default()).await;
    let identity = IdentityClient::new(Client::new(), &host, MOCK_API_KEY);

    let token = identity
        .login(&Credentials::new(MOCK_LOGIN_ID, MOCK_PASSWORD))
        .await
        .unwrap();
    assert_eq!(token, MOCK_TOKEN);
}

#[tokio::test]
async fn rejected_login_carries_status() {
    let host = mock(MockConfig::default()).await;

    let identity = IdentityClient::new(Client::new(), &host, MOCK_API_KEY);
    let err = identity
        .login(&Credentials::new(MOCK_LOGIN_ID, "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::Rejected {
            status: StatusCode::NOT_FOUND,
            ..
        }
    ));

    let identity = IdentityClient::new(Client::new(), &host, "bad-key");
    let err = identity
        .login(&Credentials::new(MOCK_LOGIN_ID, MOCK_PASSWORD))
        .await
        .unwrap_err();
    let AuthError::Rejected { status, body } = err else {
        panic!("expected rejection");
    };
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, "Invalid API key");
}
