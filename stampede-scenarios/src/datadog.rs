//! Forwarding run metrics and lifecycle events to Datadog.
//!
//! [`DatadogReporter`] is a [`Listener`]: it turns request and lifecycle
//! callbacks into metric samples and events and queues them for a single
//! worker task that posts them through a [`MetricsSink`]. Forwarding is
//! best-effort. A full queue drops the submission and a failed post is
//! logged; neither ever reaches the load-generating users.
use async_channel::{bounded, Receiver, Sender, TrySendError};
use reqwest::Client;
use serde::Serialize;
use stampede::events::{Listener, TestStart};
use stampede_core::{
    AlertType, MetricEvent, MetricKind, MetricSample, RequestEvent, RunStatistics,
    ALERT_ERROR_RATE_PERCENT,
};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

pub const DEFAULT_SITE: &str = "datadoghq.com";
pub const DEFAULT_ENVIRONMENT: &str = "staging";
pub const DEFAULT_SERVICE: &str = "stampede-load-test";
pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_PREFIX: &str = "stampede";
pub const DEFAULT_TEST_NAME: &str = "stampede_load_test";

const QUEUE_CAPACITY: usize = 10_000;
const MAX_BATCH: usize = 100;

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error(
        "Datadog credentials not found. Set DATADOG_API_KEY and DATADOG_APP_KEY ({0} is missing)"
    )]
    MissingCredential(&'static str),

    #[error("Datadog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Datadog rejected the submission with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Datadog credentials, site and the tags stamped on every submission.
#[derive(Clone)]
pub struct DatadogConfig {
    pub api_key: String,
    pub app_key: String,
    pub site: String,
    pub environment: String,
    pub service: String,
    pub version: String,
}

impl DatadogConfig {
    /// Looks up `DATADOG_API_KEY`, `DATADOG_APP_KEY`, `DATADOG_SITE`,
    /// `DATADOG_ENVIRONMENT`, `DATADOG_SERVICE` and `DATADOG_VERSION`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReporterError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());
        let required = |key: &'static str| var(key).ok_or(ReporterError::MissingCredential(key));

        Ok(Self {
            api_key: required("DATADOG_API_KEY")?,
            app_key: required("DATADOG_APP_KEY")?,
            site: or("DATADOG_SITE", DEFAULT_SITE),
            environment: or("DATADOG_ENVIRONMENT", DEFAULT_ENVIRONMENT),
            service: or("DATADOG_SERVICE", DEFAULT_SERVICE),
            version: or("DATADOG_VERSION", DEFAULT_VERSION),
        })
    }

    pub fn api_base(&self) -> String {
        format!("https://api.{}", self.site)
    }

    pub fn default_tags(&self) -> Vec<String> {
        vec![
            format!("environment:{}", self.environment),
            format!("service:{}", self.service),
            format!("version:{}", self.version),
        ]
    }
}

/// Where queued submissions end up.
pub trait MetricsSink: Send + Sync + 'static {
    fn submit_series(
        &self,
        samples: &[MetricSample],
    ) -> impl Future<Output = Result<(), ReporterError>> + Send;

    fn submit_event(
        &self,
        event: &MetricEvent,
    ) -> impl Future<Output = Result<(), ReporterError>> + Send;
}

/* HTTP API */

#[derive(Serialize)]
struct Series<'a> {
    series: Vec<SeriesPoint<'a>>,
}

#[derive(Serialize)]
struct SeriesPoint<'a> {
    metric: &'a str,
    points: [(i64, f64); 1],
    #[serde(rename = "type")]
    kind: MetricKind,
    tags: &'a [String],
}

#[derive(Serialize)]
struct EventBody<'a> {
    title: &'a str,
    text: &'a str,
    alert_type: AlertType,
    tags: &'a [String],
    date_happened: i64,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The v1 series and events endpoints.
#[derive(Clone)]
pub struct DatadogApi {
    client: Client,
    base_url: String,
    api_key: String,
    app_key: String,
}

impl DatadogApi {
    pub fn new(client: Client, config: &DatadogConfig) -> Self {
        Self::with_base_url(client, config, &config.api_base())
    }

    /// Point at a different host, e.g. a local intake proxy.
    pub fn with_base_url(client: Client, config: &DatadogConfig, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            app_key: config.app_key.clone(),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), ReporterError> {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("DD-API-KEY", &self.api_key)
            .header("DD-APPLICATION-KEY", &self.app_key)
            .json(body)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ReporterError::Rejected {
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            })
        }
    }
}

impl MetricsSink for DatadogApi {
    async fn submit_series(&self, samples: &[MetricSample]) -> Result<(), ReporterError> {
        let now = unix_now();
        let body = Series {
            series: samples
                .iter()
                .map(|s| SeriesPoint {
                    metric: &s.name,
                    points: [(now, s.value)],
                    kind: s.kind,
                    tags: &s.tags,
                })
                .collect(),
        };
        self.post("/api/v1/series", &body).await
    }

    async fn submit_event(&self, event: &MetricEvent) -> Result<(), ReporterError> {
        let body = EventBody {
            title: &event.title,
            text: &event.text,
            alert_type: event.alert_type,
            tags: &event.tags,
            date_happened: unix_now(),
        };
        self.post("/api/v1/events", &body).await
    }
}

/* Reporter */

enum Submission {
    Metric(MetricSample),
    Event(MetricEvent),
    Flush(oneshot::Sender<()>),
}

/// Queues metrics and events for Datadog and reports run lifecycle as a
/// [`Listener`].
pub struct DatadogReporter {
    tx: Sender<Submission>,
    default_tags: Vec<String>,
    prefix: String,
    test_name: Mutex<String>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DatadogReporter {
    /// Start the worker on the current runtime.
    pub fn spawn<S: MetricsSink>(sink: S, default_tags: Vec<String>) -> Arc<Self> {
        let (tx, rx) = bounded(QUEUE_CAPACITY);
        let worker = tokio::spawn(worker(sink, rx).in_current_span());
        info!("Datadog reporter initialized");

        Arc::new(Self {
            tx,
            default_tags,
            prefix: DEFAULT_PREFIX.to_string(),
            test_name: Mutex::new(DEFAULT_TEST_NAME.to_string()),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// The Datadog HTTP API with the config's credentials and tags.
    pub fn from_config(client: Client, config: &DatadogConfig) -> Arc<Self> {
        Self::spawn(DatadogApi::new(client, config), config.default_tags())
    }

    fn metric_name(&self, suffix: &str) -> String {
        format!("{}.{}", self.prefix, suffix)
    }

    fn tags(&self, extra: &[String]) -> Vec<String> {
        let mut tags = self.default_tags.clone();
        tags.extend_from_slice(extra);
        tags
    }

    fn enqueue(&self, submission: Submission) {
        match self.tx.try_send(submission) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("Datadog queue full, dropping submission"),
            Err(TrySendError::Closed(_)) => warn!("Datadog reporter stopped, dropping submission"),
        }
    }

    pub fn send_metric(&self, name: &str, value: f64, kind: MetricKind, tags: &[String]) {
        self.enqueue(Submission::Metric(MetricSample::new(name, value, kind, self.tags(tags))));
    }

    /// One request: its response time (ms), a count, and a failure count
    /// when it failed.
    pub fn report_request(
        &self,
        request_type: &str,
        name: &str,
        response_time: f64,
        success: bool,
    ) {
        let tags = [
            format!("request_type:{request_type}"),
            format!("endpoint:{name}"),
            format!("success:{success}"),
        ];
        self.send_metric(
            &self.metric_name("request.response_time"),
            response_time,
            MetricKind::Gauge,
            &tags,
        );
        self.send_metric(&self.metric_name("request.count"), 1., MetricKind::Count, &tags);
        if !success {
            self.send_metric(&self.metric_name("request.failures"), 1., MetricKind::Count, &tags);
        }
    }

    pub fn report_test_summary(&self, stats: &RunStatistics, test_name: &str, duration: Duration) {
        let tags = [format!("test_name:{test_name}")];
        let secs = duration.as_secs_f64();
        let rps = if secs > 0. {
            stats.num_requests as f64 / secs
        } else {
            0.
        };

        let gauges = [
            ("test.total_requests", stats.num_requests as f64),
            ("test.total_failures", stats.num_failures as f64),
            ("test.avg_response_time", stats.avg_response_time),
            ("test.requests_per_second", rps),
            ("test.error_rate", stats.failure_percent()),
        ];
        for (suffix, value) in gauges {
            self.send_metric(&self.metric_name(suffix), value, MetricKind::Gauge, &tags);
        }
        info!("Test summary queued for Datadog: {test_name}");
    }

    pub fn create_event(&self, title: &str, text: &str, alert_type: AlertType, tags: &[String]) {
        self.enqueue(Submission::Event(MetricEvent {
            title: title.to_string(),
            text: text.to_string(),
            alert_type,
            tags: self.tags(tags),
        }));
    }

    /// Wait until everything queued so far has been handed to the sink.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Submission::Flush(ack)).await.is_err() {
            return;
        }
        let _ = done.await;
    }

    /// Flush, then stop the worker.
    pub async fn shutdown(&self) {
        self.flush().await;
        self.tx.close();
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

impl Listener for DatadogReporter {
    fn on_test_start(&self, start: &TestStart) {
        if let Ok(mut name) = self.test_name.lock() {
            *name = start.name.clone();
        }
        self.create_event(
            "Load Test Started",
            &format!("Starting load test with {} users", start.target_user_count),
            AlertType::Info,
            &["test:start".to_string()],
        );
    }

    fn on_request(&self, event: &RequestEvent) {
        self.report_request(
            &event.request_type,
            &event.name,
            event.response_time_ms(),
            event.is_success(),
        );
    }

    fn on_spawning_complete(&self, user_count: usize) {
        self.send_metric(
            &self.metric_name("users.active"),
            user_count as f64,
            MetricKind::Gauge,
            &[],
        );
    }

    fn on_test_stop(&self, stats: &RunStatistics) {
        let test_name = self
            .test_name
            .lock()
            .map(|name| name.clone())
            .unwrap_or_else(|_| DEFAULT_TEST_NAME.to_string());
        self.report_test_summary(stats, &test_name, stats.duration);

        let error_rate = stats.failure_percent();
        let alert_type = if error_rate > ALERT_ERROR_RATE_PERCENT {
            AlertType::Error
        } else {
            AlertType::Success
        };
        let text = format!(
            "Test Summary:\n\
             - Total Requests: {}\n\
             - Failures: {} ({:.2}%)\n\
             - Avg Response Time: {:.2}ms\n\
             - Max Response Time: {:.2}ms",
            stats.num_requests,
            stats.num_failures,
            error_rate,
            stats.avg_response_time,
            stats.max_response_time
        );
        self.create_event("Load Test Completed", &text, alert_type, &["test:complete".to_string()]);
    }
}

#[instrument(name = "datadog", skip_all)]
async fn worker<S: MetricsSink>(sink: S, rx: Receiver<Submission>) {
    let mut batch: Vec<MetricSample> = Vec::with_capacity(MAX_BATCH);

    while let Ok(first) = rx.recv().await {
        let mut next = Some(first);
        while let Some(submission) = next.take() {
            match submission {
                Submission::Metric(sample) => {
                    batch.push(sample);
                    if batch.len() < MAX_BATCH {
                        next = rx.try_recv().ok();
                    }
                    if next.is_none() {
                        submit_batch(&sink, &mut batch).await;
                    }
                }
                Submission::Event(event) => {
                    submit_batch(&sink, &mut batch).await;
                    match sink.submit_event(&event).await {
                        Ok(()) => debug!("Datadog event created: {}", event.title),
                        Err(err) => error!("Failed to create Datadog event: {err}"),
                    }
                }
                Submission::Flush(ack) => {
                    submit_batch(&sink, &mut batch).await;
                    let _ = ack.send(());
                }
            }
        }
    }

    submit_batch(&sink, &mut batch).await;
    debug!("Datadog worker stopped");
}

async fn submit_batch<S: MetricsSink>(sink: &S, batch: &mut Vec<MetricSample>) {
    if batch.is_empty() {
        return;
    }
    if let Err(err) = sink.submit_series(batch).await {
        error!("Failed to send {} metrics: {err}", batch.len());
    }
    batch.clear();
}
