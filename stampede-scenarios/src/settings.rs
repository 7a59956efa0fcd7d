//! Command-line and environment settings shared by the scenario binaries.
//!
//! Every option falls back to the variable the scenarios have always read
//! from `.env`, so a populated `.env` is enough to run any scenario.
use crate::auth::{Credentials, IdentityClient, Login};
use crate::pubsub::{PubSubError, DEFAULT_REDIS_URL};
use clap::Args;
use stampede_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{0} is not set. Pass it on the command line or add it to .env")]
    Missing(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    PubSub(#[from] PubSubError),
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, SettingsError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(SettingsError::Missing(name))
}

#[derive(Args, Clone, Debug, Default)]
pub struct TargetArgs {
    /// Base URL of the system under test.
    #[arg(long, env = "TARGET_HOST")]
    pub host: Option<String>,
}

impl TargetArgs {
    pub fn host(&self) -> Result<String, SettingsError> {
        required(&self.host, "TARGET_HOST")
    }
}

/// Identity service login used by the authenticated GraphQL scenarios.
#[derive(Args, Clone, Debug, Default)]
pub struct AuthArgs {
    #[arg(long, env = "FUSION_AUTH_API_KEY", hide_env_values = true)]
    pub auth_api_key: Option<String>,

    #[arg(long, env = "FUSION_AUTH_BASE_URI")]
    pub auth_base_uri: Option<String>,

    #[arg(long, env = "LOCUST_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "LOCUST_USER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

impl AuthArgs {
    pub fn credentials(&self) -> Result<Credentials, SettingsError> {
        Ok(Credentials::new(
            &required(&self.username, "LOCUST_USERNAME")?,
            &required(&self.password, "LOCUST_USER_PASSWORD")?,
        ))
    }

    pub fn identity(&self, client: reqwest::Client) -> Result<IdentityClient, SettingsError> {
        Ok(IdentityClient::new(
            client,
            &required(&self.auth_base_uri, "FUSION_AUTH_BASE_URI")?,
            &required(&self.auth_api_key, "FUSION_AUTH_API_KEY")?,
        ))
    }

    pub fn login(&self, client: reqwest::Client) -> Result<Login, SettingsError> {
        Ok(Login::new(self.identity(client)?, self.credentials()?))
    }
}

#[derive(Args, Clone, Debug)]
pub struct RedisArgs {
    #[arg(long, env = "REDIS_URL", default_value = DEFAULT_REDIS_URL)]
    pub redis_url: String,

    /// Use an in-process broker instead of Redis. Useful for dry runs.
    #[arg(long)]
    pub memory_broker: bool,
}

impl Default for RedisArgs {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            memory_broker: false,
        }
    }
}
