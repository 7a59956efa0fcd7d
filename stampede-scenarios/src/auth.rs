//! Session tokens from the identity service's login API.
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

pub const LOGIN_PATH: &str = "/api/login";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to login {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("Login succeeded with status {0} but no token was returned")]
    MissingToken(StatusCode),

    #[error("Login request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct Credentials {
    pub login_id: String,
    pub password: String,
}

impl Credentials {
    pub fn new(login_id: &str, password: &str) -> Self {
        Self {
            login_id: login_id.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login_id", &self.login_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    login_id: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

/// Client for the identity service. Cheap to clone.
#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    base_uri: Arc<str>,
    api_key: Arc<str>,
}

impl IdentityClient {
    pub fn new(client: Client, base_uri: &str, api_key: &str) -> Self {
        Self {
            client,
            base_uri: Arc::from(base_uri.trim_end_matches('/')),
            api_key: Arc::from(api_key),
        }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Exchange credentials for a session token.
    #[instrument(name = "login", skip_all, fields(login_id = %credentials.login_id))]
    pub async fn login(&self, credentials: &Credentials) -> Result<String, AuthError> {
        let url = format!("{}{}", self.base_uri, LOGIN_PATH);
        let res = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, &*self.api_key)
            .json(&LoginRequest {
                login_id: &credentials.login_id,
                password: &credentials.password,
            })
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!("Login rejected with {status}");
            return Err(AuthError::Rejected { status, body });
        }

        let body: LoginResponse = res.json().await?;
        match body.token {
            Some(token) if !token.is_empty() => {
                debug!("Login succeeded");
                Ok(token)
            }
            _ => Err(AuthError::MissingToken(status)),
        }
    }
}

impl fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityClient")
            .field("base_uri", &self.base_uri)
            .finish_non_exhaustive()
    }
}

/// Everything a user needs to fetch its own token in `on_start`.
#[derive(Clone, Debug)]
pub struct Login {
    pub identity: IdentityClient,
    pub credentials: Credentials,
}

impl Login {
    pub fn new(identity: IdentityClient, credentials: Credentials) -> Self {
        Self {
            identity,
            credentials,
        }
    }

    pub async fn token(&self) -> Result<String, AuthError> {
        self.identity.login(&self.credentials).await
    }
}
