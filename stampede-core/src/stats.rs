use serde::Serialize;
use std::time::Duration;

/// Totals for a finished run.
///
/// Response times are in milliseconds. `duration` spans from the first user
/// spawn to the last recorded request.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunStatistics {
    pub user_count: usize,
    pub num_requests: u64,
    pub num_failures: u64,
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub median_response_time: f64,
    pub p95_response_time: f64,
    pub duration: Duration,
}

impl RunStatistics {
    /// Failure share as a percentage, 0 when nothing was sent.
    pub fn failure_percent(&self) -> f64 {
        if self.num_requests == 0 {
            0.
        } else {
            self.num_failures as f64 / self.num_requests as f64 * 100.
        }
    }

    pub fn requests_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0. {
            self.num_requests as f64 / secs
        } else {
            0.
        }
    }
}
