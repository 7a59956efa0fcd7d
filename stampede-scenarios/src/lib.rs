//! Load-test scenarios for the platform's GraphQL API, its storefront REST
//! endpoints and Redis pub/sub, plus the pieces around a run: identity
//! login, Datadog forwarding and CI threshold checks.
//!
//! Scenarios are registered in [`scenario::Scenario`] and run through the
//! `stampede` binary:
//!
//! ```text
//! $ stampede run line-items --users 50 --spawn-rate 5 --run-time 2h --csv results/stats
//! $ check-thresholds results/stats_stats.csv
//! ```
pub mod auth;
pub mod calc;
pub mod datadog;
pub mod graphql;
pub mod http;
pub mod pubsub;
pub mod queries;
pub mod scenario;
pub mod settings;
pub mod thresholds;
pub mod users;

pub use auth::{AuthError, Credentials, IdentityClient, Login};
pub use datadog::{DatadogApi, DatadogConfig, DatadogReporter, MetricsSink, ReporterError};
pub use graphql::{classify, Auth, GraphQlClient, GraphQlError, GraphQlOutcome, Operation};
pub use pubsub::{Broker, MemoryBroker, PubSubError, RedisBroker};
pub use scenario::Scenario;
pub use settings::SettingsError;
pub use thresholds::{Breach, ThresholdChecker, ThresholdError};
