use std::time::Duration;

pub const DEFAULT_USERS: usize = 1;
pub const DEFAULT_SPAWN_RATE: f64 = 1.;

/// The default limit on a row's average response time, in milliseconds.
pub const DEFAULT_AVG_RESPONSE_TIME_MS: f64 = 2000.;

/// The default limit on a row's failure percentage.
pub const DEFAULT_FAILURE_PERCENT: f64 = 5.;

/// The default limit on a row's 95th percentile response time, in milliseconds.
pub const DEFAULT_P95_RESPONSE_TIME_MS: f64 = 5000.;

/// Error rate (percent) above which the completion event is raised as an error.
pub const ALERT_ERROR_RATE_PERCENT: f64 = 5.;

/// Percentiles written to the stats report, in column order.
pub const REPORT_PERCENTILES: [f64; 9] = [0.5, 0.66, 0.75, 0.8, 0.9, 0.95, 0.98, 0.99, 1.0];

/// Label used for the totals row of every report.
pub const AGGREGATED: &str = "Aggregated";

pub const QUICK_USERS: usize = 10;
pub const QUICK_SPAWN_RATE: f64 = 2.;
pub const QUICK_RUN_TIME: Duration = Duration::from_secs(60);

/// Monthly VU-hour allowance used by `calc`.
pub const FREE_TIER_VU_HOURS: f64 = 200.;
