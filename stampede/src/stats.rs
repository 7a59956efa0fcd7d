//! Request aggregation.
//!
//! [`RequestStats`] is always the first listener of a run. It keeps one
//! [`StatsEntry`] per `(request type, name)` pair plus a running total, and
//! counts failures by their error text.
use crate::events::Listener;
use pdatastructs::tdigest::{TDigest, K1};
use stampede_core::{RequestEvent, RunStatistics, AGGREGATED, REPORT_PERCENTILES};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

const TDIGEST_BACKLOG_SIZE: usize = 100;
const TDIGEST_COMPRESSION: f64 = 100.;

#[derive(Debug, Clone)]
struct StatsEntry {
    num_requests: u64,
    num_failures: u64,
    total_response_time: f64,
    min_response_time: Option<f64>,
    max_response_time: f64,
    total_content_length: u64,
    latency: TDigest<K1>,
}

impl StatsEntry {
    fn new() -> Self {
        Self {
            num_requests: 0,
            num_failures: 0,
            total_response_time: 0.,
            min_response_time: None,
            max_response_time: 0.,
            total_content_length: 0,
            latency: default_tdigest(),
        }
    }

    fn log(&mut self, event: &RequestEvent) {
        let ms = event.response_time_ms();
        self.num_requests += 1;
        if !event.is_success() {
            self.num_failures += 1;
        }
        self.total_response_time += ms;
        self.min_response_time = Some(self.min_response_time.map_or(ms, |min| min.min(ms)));
        self.max_response_time = self.max_response_time.max(ms);
        self.total_content_length += event.response_length as u64;
        self.latency.insert(ms);
    }

    fn percentile(&self, quantile: f64) -> f64 {
        if self.num_requests == 0 {
            return 0.;
        }
        if quantile >= 1. {
            return self.max_response_time;
        }

        let ms = self.latency.quantile(quantile);
        if ms.is_finite() {
            ms
        } else {
            error!("NaN percentile calculation for q={quantile}.");
            0.
        }
    }

    fn snapshot(&self, request_type: &str, name: &str, elapsed: Duration) -> EntrySnapshot {
        let secs = elapsed.as_secs_f64();
        let per_sec = |n: u64| if secs > 0. { n as f64 / secs } else { 0. };
        let avg = |total: f64| {
            if self.num_requests == 0 {
                0.
            } else {
                total / self.num_requests as f64
            }
        };

        EntrySnapshot {
            request_type: request_type.to_string(),
            name: name.to_string(),
            num_requests: self.num_requests,
            num_failures: self.num_failures,
            avg_response_time: avg(self.total_response_time),
            min_response_time: self.min_response_time.unwrap_or(0.),
            max_response_time: self.max_response_time,
            avg_content_length: avg(self.total_content_length as f64),
            requests_per_second: per_sec(self.num_requests),
            failures_per_second: per_sec(self.num_failures),
            percentiles: REPORT_PERCENTILES.map(|q| self.percentile(q)),
        }
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(TDIGEST_COMPRESSION), TDIGEST_BACKLOG_SIZE)
}

struct StatsTable {
    entries: BTreeMap<(String, String), StatsEntry>,
    total: StatsEntry,
    failures: BTreeMap<(String, String, String), u64>,
    started: Instant,
    last_request: Option<Instant>,
    user_count: usize,
}

/// Thread-safe request aggregation for one run.
pub struct RequestStats {
    table: Mutex<StatsTable>,
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(StatsTable {
                entries: BTreeMap::new(),
                total: StatsEntry::new(),
                failures: BTreeMap::new(),
                started: Instant::now(),
                last_request: None,
                user_count: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatsTable> {
        // A panicking listener must not take the statistics down with it.
        match self.table.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Restart the clock, e.g. when the first user is spawned.
    pub fn reset_clock(&self) {
        self.lock().started = Instant::now();
    }

    pub fn set_user_count(&self, user_count: usize) {
        self.lock().user_count = user_count;
    }

    pub fn log(&self, event: &RequestEvent) {
        {
            let mut table = self.lock();
            table.last_request = Some(Instant::now());
            table.total.log(event);
            table
                .entries
                .entry((event.request_type.clone(), event.name.clone()))
                .or_insert_with(StatsEntry::new)
                .log(event);

            if let Some(error) = &event.error {
                *table
                    .failures
                    .entry((event.request_type.clone(), event.name.clone(), error.clone()))
                    .or_insert(0) += 1;
            }
        }

        #[cfg(feature = "metrics")]
        record_metrics(event);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let table = self.lock();
        let elapsed = match table.last_request {
            Some(last) => last.saturating_duration_since(table.started),
            None => table.started.elapsed(),
        };

        let entries = table
            .entries
            .iter()
            .map(|((request_type, name), entry)| entry.snapshot(request_type, name, elapsed))
            .collect();

        let failures = table
            .failures
            .iter()
            .map(|((method, name, error), occurrences)| FailureSnapshot {
                method: method.clone(),
                name: name.clone(),
                error: error.clone(),
                occurrences: *occurrences,
            })
            .collect();

        StatsSnapshot {
            entries,
            total: table.total.snapshot(AGGREGATED, AGGREGATED, elapsed),
            failures,
            elapsed,
            user_count: table.user_count,
        }
    }
}

impl Listener for RequestStats {
    fn on_request(&self, event: &RequestEvent) {
        self.log(event);
    }

    fn on_spawning_complete(&self, user_count: usize) {
        self.set_user_count(user_count);
    }
}

#[cfg(feature = "metrics")]
fn record_metrics(event: &RequestEvent) {
    let labels = [
        ("type", event.request_type.clone()),
        ("name", event.name.clone()),
    ];
    metrics::counter!("stampede_requests_total", &labels).increment(1);
    if !event.is_success() {
        metrics::counter!("stampede_failures_total", &labels).increment(1);
    }
    metrics::histogram!("stampede_response_time", &labels)
        .record(event.response_time.as_secs_f64());
}

/// One row of the results table. Times are in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySnapshot {
    pub request_type: String,
    pub name: String,
    pub num_requests: u64,
    pub num_failures: u64,
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub avg_content_length: f64,
    pub requests_per_second: f64,
    pub failures_per_second: f64,
    /// Indexed like [`REPORT_PERCENTILES`].
    pub percentiles: [f64; REPORT_PERCENTILES.len()],
}

impl EntrySnapshot {
    pub fn failure_percent(&self) -> f64 {
        if self.num_requests == 0 {
            0.
        } else {
            self.num_failures as f64 / self.num_requests as f64 * 100.
        }
    }

    pub fn median_response_time(&self) -> f64 {
        self.percentile(0.5)
    }

    pub fn percentile(&self, quantile: f64) -> f64 {
        REPORT_PERCENTILES
            .iter()
            .position(|q| (*q - quantile).abs() < f64::EPSILON)
            .map(|idx| self.percentiles[idx])
            .unwrap_or(0.)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailureSnapshot {
    pub method: String,
    pub name: String,
    pub error: String,
    pub occurrences: u64,
}

/// Point-in-time copy of a run's statistics.
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub entries: Vec<EntrySnapshot>,
    pub total: EntrySnapshot,
    pub failures: Vec<FailureSnapshot>,
    pub elapsed: Duration,
    pub user_count: usize,
}

impl StatsSnapshot {
    pub fn statistics(&self) -> RunStatistics {
        RunStatistics {
            user_count: self.user_count,
            num_requests: self.total.num_requests,
            num_failures: self.total.num_failures,
            avg_response_time: self.total.avg_response_time,
            min_response_time: self.total.min_response_time,
            max_response_time: self.total.max_response_time,
            median_response_time: self.total.median_response_time(),
            p95_response_time: self.total.percentile(0.95),
            duration: self.elapsed,
        }
    }

    pub fn entry(&self, request_type: &str, name: &str) -> Option<&EntrySnapshot> {
        self.entries
            .iter()
            .find(|e| e.request_type == request_type && e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, ms: u64, error: Option<&str>) -> RequestEvent {
        let rt = Duration::from_millis(ms);
        match error {
            None => RequestEvent::success("POST", name, rt, 100),
            Some(err) => RequestEvent::failure("POST", name, rt, err),
        }
    }

    #[test]
    fn aggregates_per_name_and_total() {
        let stats = RequestStats::new();
        stats.log(&event("LineItemRows", 100, None));
        stats.log(&event("LineItemRows", 300, None));
        stats.log(&event("AddMessage", 50, Some("boom")));
        stats.log(&event("AddMessage", 70, Some("boom")));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.entries.len(), 2);

        let line_items = snapshot.entry("POST", "LineItemRows").unwrap();
        assert_eq!(line_items.num_requests, 2);
        assert_eq!(line_items.num_failures, 0);
        assert_eq!(line_items.avg_response_time, 200.);
        assert_eq!(line_items.min_response_time, 100.);
        assert_eq!(line_items.max_response_time, 300.);
        assert_eq!(line_items.avg_content_length, 100.);

        let messages = snapshot.entry("POST", "AddMessage").unwrap();
        assert_eq!(messages.failure_percent(), 100.);
        assert_eq!(messages.avg_content_length, 0.);

        assert_eq!(snapshot.total.num_requests, 4);
        assert_eq!(snapshot.total.failure_percent(), 50.);
        assert_eq!(snapshot.total.name, AGGREGATED);

        assert_eq!(snapshot.failures.len(), 1);
        assert_eq!(snapshot.failures[0].occurrences, 2);
        assert_eq!(snapshot.failures[0].error, "boom");
    }

    #[test]
    fn percentiles_are_ordered() {
        let stats = RequestStats::new();
        for ms in 1..=1_000 {
            stats.log(&event("q", ms, None));
        }
        let total = stats.snapshot().total;

        let median = total.median_response_time();
        assert!((450. ..=550.).contains(&median), "median was {median}");
        assert!(total.percentile(0.95) >= median);
        assert_eq!(total.percentile(1.0), 1_000.);
        assert!(total.percentiles.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn empty_snapshot() {
        let snapshot = RequestStats::new().snapshot();
        let stats = snapshot.statistics();
        assert_eq!(stats.num_requests, 0);
        assert_eq!(stats.avg_response_time, 0.);
        assert_eq!(snapshot.total.percentiles, [0.; 9]);
    }
}
