use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// A single completed unit of work reported by a user task.
///
/// Every task reports through one of these, whether it spoke HTTP, GraphQL or
/// pub/sub. `error` is `None` on success.
#[derive(Clone, Debug, Serialize)]
pub struct RequestEvent {
    pub request_type: String,
    pub name: String,
    pub response_time: Duration,
    pub response_length: usize,
    pub error: Option<String>,
    pub context: Map<String, Value>,
}

impl RequestEvent {
    pub fn success(request_type: &str, name: &str, response_time: Duration, length: usize) -> Self {
        Self {
            request_type: request_type.to_string(),
            name: name.to_string(),
            response_time,
            response_length: length,
            error: None,
            context: Map::new(),
        }
    }

    pub fn failure(
        request_type: &str,
        name: &str,
        response_time: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            request_type: request_type.to_string(),
            name: name.to_string(),
            response_time,
            response_length: 0,
            error: Some(error.into()),
            context: Map::new(),
        }
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.response_length = length;
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn response_time_ms(&self) -> f64 {
        self.response_time.as_secs_f64() * 1e3
    }
}
