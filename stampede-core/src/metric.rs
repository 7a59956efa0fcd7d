use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Count,
    Rate,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Count => "count",
            MetricKind::Rate => "rate",
        };
        f.write_str(s)
    }
}

/// A metric on its way to an external backend. Not retained after sending.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub kind: MetricKind,
    pub tags: Vec<String>,
}

impl MetricSample {
    pub fn new(name: &str, value: f64, kind: MetricKind, tags: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            value,
            kind,
            tags,
        }
    }

    pub fn gauge(name: &str, value: f64, tags: Vec<String>) -> Self {
        Self::new(name, value, MetricKind::Gauge, tags)
    }

    pub fn count(name: &str, value: f64, tags: Vec<String>) -> Self {
        Self::new(name, value, MetricKind::Count, tags)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Info,
    Warning,
    Error,
    Success,
}

/// An annotation in the backend's event stream.
#[derive(Clone, Debug, Serialize)]
pub struct MetricEvent {
    pub title: String,
    pub text: String,
    pub alert_type: AlertType,
    pub tags: Vec<String>,
}
