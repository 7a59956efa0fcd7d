use crate::{DEFAULT_SPAWN_RATE, DEFAULT_USERS};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid duration {input:?}: {source}")]
    Duration {
        input: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("Spawn rate must be a positive number, got {0}")]
    SpawnRate(f64),

    #[error("A run needs at least one user")]
    NoUsers,
}

/// Parameters for a single swarm run.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub host: String,
    pub users: usize,
    /// Users started per second.
    pub spawn_rate: f64,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub run_time: Option<Duration>,
}

impl RunConfig {
    pub fn new(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: host.trim_end_matches('/').to_string(),
            users: DEFAULT_USERS,
            spawn_rate: DEFAULT_SPAWN_RATE,
            run_time: None,
        }
    }

    pub fn users(mut self, users: usize) -> Self {
        self.users = users;
        self
    }

    pub fn spawn_rate(mut self, spawn_rate: f64) -> Self {
        self.spawn_rate = spawn_rate;
        self
    }

    pub fn run_time(mut self, run_time: Duration) -> Self {
        self.run_time = Some(run_time);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.users == 0 {
            return Err(ConfigError::NoUsers);
        }
        if !(self.spawn_rate.is_finite() && self.spawn_rate > 0.) {
            return Err(ConfigError::SpawnRate(self.spawn_rate));
        }
        self.spawn_interval()?;
        Ok(())
    }

    /// Interval between two consecutive user spawns.
    pub fn spawn_interval(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(1. / self.spawn_rate)
            .map_err(|_| ConfigError::SpawnRate(self.spawn_rate))
    }
}

/// Parse a human duration such as `30s`, `2h` or `1h30m`.
pub fn parse_run_time(input: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(input.trim()).map_err(|source| ConfigError::Duration {
        input: input.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_run_time("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_run_time("1h30m").unwrap(), Duration::from_secs(5400));
        assert!(parse_run_time("soon").is_err());
    }

    #[test]
    fn rejects_bad_spawn_rate() {
        let config = RunConfig::new("t", "http://localhost:3000/").spawn_rate(0.);
        assert!(matches!(config.validate(), Err(ConfigError::SpawnRate(_))));
        assert_eq!(config.host, "http://localhost:3000");
    }

    #[test]
    fn fractional_spawn_rate_interval() {
        let config = RunConfig::new("t", "http://localhost").spawn_rate(0.5);
        assert_eq!(config.spawn_interval().unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn vanishing_spawn_rate_is_rejected() {
        let config = RunConfig::new("t", "http://localhost").spawn_rate(1e-30);
        assert!(matches!(config.spawn_interval(), Err(ConfigError::SpawnRate(_))));
        assert!(matches!(config.validate(), Err(ConfigError::SpawnRate(_))));
    }

    #[test]
    fn run_time_serializes_as_seconds() {
        let config = RunConfig::new("t", "http://localhost").run_time(Duration::from_secs(90));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["run_time"], 90);
    }
}
