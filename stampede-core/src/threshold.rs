use crate::{DEFAULT_AVG_RESPONSE_TIME_MS, DEFAULT_FAILURE_PERCENT, DEFAULT_P95_RESPONSE_TIME_MS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A results-table column that can carry a limit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdMetric {
    AvgResponseTime,
    FailurePercent,
    P95ResponseTime,
}

impl ThresholdMetric {
    /// Column header in the stats CSV.
    pub fn column(&self) -> &'static str {
        match self {
            ThresholdMetric::AvgResponseTime => "Average Response Time",
            ThresholdMetric::FailurePercent => "Failure %",
            ThresholdMetric::P95ResponseTime => "95%",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ThresholdMetric::FailurePercent => "%",
            _ => "ms",
        }
    }
}

impl fmt::Display for ThresholdMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThresholdMetric::AvgResponseTime => "Average response time",
            ThresholdMetric::FailurePercent => "Failure rate",
            ThresholdMetric::P95ResponseTime => "95th percentile response time",
        };
        f.write_str(s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub metric: ThresholdMetric,
    pub limit: f64,
}

impl ThresholdRule {
    pub fn new(metric: ThresholdMetric, limit: f64) -> Self {
        Self { metric, limit }
    }

    /// Strictly greater than the limit is a breach.
    pub fn breached_by(&self, value: f64) -> bool {
        value > self.limit
    }

    pub fn defaults() -> Vec<ThresholdRule> {
        vec![
            ThresholdRule::new(ThresholdMetric::AvgResponseTime, DEFAULT_AVG_RESPONSE_TIME_MS),
            ThresholdRule::new(ThresholdMetric::FailurePercent, DEFAULT_FAILURE_PERCENT),
            ThresholdRule::new(ThresholdMetric::P95ResponseTime, DEFAULT_P95_RESPONSE_TIME_MS),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_exclusive() {
        let rule = ThresholdRule::new(ThresholdMetric::AvgResponseTime, 2000.);
        assert!(rule.breached_by(2500.));
        assert!(!rule.breached_by(2000.));
        assert!(!rule.breached_by(1500.));
    }
}
