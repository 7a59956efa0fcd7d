//! One-endpoint GraphQL requests and their classification.
//!
//! Every call is a POST to `<host>/graphql` and ends in a [`GraphQlOutcome`]:
//!
//! 1. non-200 status: failure, regardless of the body
//! 2. body not JSON: failure with the parse error
//! 3. body with an `errors` member: failure, errors kept verbatim
//! 4. body without `data`: failure
//! 5. otherwise success
//!
//! The outcome is also reported to the run as a `POST` request event.
use reqwest::header::{ACCEPT, AUTHORIZATION, COOKIE};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use stampede::UserContext;
use stampede_core::RequestEvent;
use std::time::{Duration, Instant};
use thiserror::Error;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

pub const GRAPHQL_PATH: &str = "/graphql";
pub const REQUEST_TYPE: &str = "POST";

/// Reasons a response never got as far as carrying GraphQL errors or data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphQlError {
    #[error("response failed with non-200 status code {0}")]
    Status(u16),

    /// Transport failure or an unparseable body.
    #[error("{0}")]
    Exception(String),

    #[error("response carried no data")]
    MissingData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphQlOutcome {
    /// The `data` member of the response.
    Success(Value),
    GraphQlErrors(Vec<Value>),
    Transport(GraphQlError),
}

impl GraphQlOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GraphQlOutcome::Success(_))
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            GraphQlOutcome::Success(data) => Some(data),
            _ => None,
        }
    }

    /// The failure text recorded against `operation`, `None` on success.
    pub fn failure_message(&self, operation: &str) -> Option<String> {
        match self {
            GraphQlOutcome::Success(_) => None,
            GraphQlOutcome::GraphQlErrors(errors) => {
                let errors = Value::Array(errors.clone());
                Some(format!("errors in request {operation} {errors}"))
            }
            GraphQlOutcome::Transport(err @ GraphQlError::Status(_)) => Some(err.to_string()),
            GraphQlOutcome::Transport(GraphQlError::Exception(msg)) => {
                Some(format!("exception in request {operation} with {msg}"))
            }
            GraphQlOutcome::Transport(GraphQlError::MissingData) => {
                Some(format!("no data in request {operation}"))
            }
        }
    }
}

/// The `message` of each GraphQL error, `Unknown` where there is none.
pub fn error_messages(errors: &[Value]) -> Vec<&str> {
    errors
        .iter()
        .map(|e| e.get("message").and_then(Value::as_str).unwrap_or("Unknown"))
        .collect()
}

/// Classify a response from its status code and raw body.
pub fn classify(status: u16, body: &[u8]) -> GraphQlOutcome {
    if status != 200 {
        return GraphQlOutcome::Transport(GraphQlError::Status(status));
    }

    let mut parsed: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(err) => return GraphQlOutcome::Transport(GraphQlError::Exception(err.to_string())),
    };

    if let Some(errors) = parsed.get_mut("errors").map(Value::take) {
        let errors = match errors {
            Value::Array(errors) => errors,
            other => vec![other],
        };
        return GraphQlOutcome::GraphQlErrors(errors);
    }

    match parsed.get_mut("data").map(Value::take) {
        Some(Value::Null) | None => GraphQlOutcome::Transport(GraphQlError::MissingData),
        Some(data) => GraphQlOutcome::Success(data),
    }
}

/// A named query or mutation with its variables.
#[derive(Debug, Clone)]
pub struct Operation<'a> {
    pub name: &'a str,
    pub query: &'a str,
    pub variables: Option<Value>,
    /// Name to report the request under, defaults to `name`.
    pub label: Option<&'a str>,
}

impl<'a> Operation<'a> {
    pub fn new(name: &'a str, query: &'a str) -> Self {
        Self {
            name,
            query,
            variables: None,
            label: None,
        }
    }

    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn report_name(&self) -> &str {
        self.label.unwrap_or(self.name)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphQlBody<'a> {
    query: &'a str,
    operation_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    variables: Option<&'a Value>,
}

/// How the session token travels with a request.
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    None,
    /// `cookie: access_token=<token>`
    Cookie(&'a str),
    /// `Authorization: Bearer <token>`
    Bearer(&'a str),
}

/// A finished call, before it is reported.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub outcome: GraphQlOutcome,
    pub response_time: Duration,
    pub response_length: usize,
}

impl Exchange {
    pub fn event(&self, operation: &Operation<'_>) -> RequestEvent {
        self.event_checked(operation, |_| Ok(()))
    }

    /// Like [`Exchange::event`], with an extra check on the `data` of an
    /// otherwise successful response.
    pub fn event_checked<F>(&self, operation: &Operation<'_>, check: F) -> RequestEvent
    where
        F: FnOnce(&Value) -> Result<(), String>,
    {
        let failure = match &self.outcome {
            GraphQlOutcome::Success(data) => check(data).err(),
            outcome => outcome.failure_message(operation.name),
        };
        self.event_with(operation, failure)
    }

    /// The event for this exchange with a caller-chosen failure, if any.
    pub fn event_with(&self, operation: &Operation<'_>, failure: Option<String>) -> RequestEvent {
        let name = operation.report_name();
        match failure {
            None => {
                RequestEvent::success(REQUEST_TYPE, name, self.response_time, self.response_length)
            }
            Some(err) => RequestEvent::failure(REQUEST_TYPE, name, self.response_time, err)
                .with_length(self.response_length),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GraphQlClient {
    client: Client,
    endpoint: String,
}

impl GraphQlClient {
    pub fn new(client: Client, host: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", host.trim_end_matches('/'), GRAPHQL_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one operation and classify the response without reporting it.
    pub async fn exchange(&self, operation: &Operation<'_>, auth: Auth<'_>) -> Exchange {
        let body = GraphQlBody {
            query: operation.query,
            operation_name: operation.name,
            variables: operation.variables.as_ref(),
        };
        let mut req = self.client.post(&self.endpoint).header(ACCEPT, "*/*").json(&body);
        req = match auth {
            Auth::None => req,
            Auth::Cookie(token) => req.header(COOKIE, format!("access_token={token}")),
            Auth::Bearer(token) => req.header(AUTHORIZATION, format!("Bearer {token}")),
        };

        let start = Instant::now();
        let res = match req.send().await {
            Ok(res) => res,
            Err(err) => {
                return Exchange {
                    outcome: GraphQlOutcome::Transport(GraphQlError::Exception(err.to_string())),
                    response_time: start.elapsed(),
                    response_length: 0,
                }
            }
        };
        let status = res.status().as_u16();
        let body = res.bytes().await;
        let response_time = start.elapsed();

        match body {
            Ok(body) => Exchange {
                outcome: classify(status, &body),
                response_time,
                response_length: body.len(),
            },
            Err(err) => Exchange {
                outcome: GraphQlOutcome::Transport(GraphQlError::Exception(err.to_string())),
                response_time,
                response_length: 0,
            },
        }
    }

    /// Send, classify and report one operation.
    pub async fn execute(
        &self,
        ctx: &UserContext,
        operation: &Operation<'_>,
        auth: Auth<'_>,
    ) -> GraphQlOutcome {
        let exchange = self.exchange(operation, auth).await;
        let event = exchange.event(operation);
        if let Some(err) = &event.error {
            debug!("{} failed: {err}", operation.name);
        }
        ctx.fire(event);
        exchange.outcome
    }
}
