//! Client for the external routing authority.

use crate::config::RemoteConfig;
use crate::error::ConfigError;
use crate::tenant::TenantKey;
use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Route payload as returned by the authority. The password is still an encrypted
/// `iv:cipher` blob; every field is optional so the resolver decides what is usable.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RemoteRoute {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("tenant unknown to routing authority")]
    NotFound,
    #[error("tenant suspended by routing authority")]
    Suspended,
    #[error("routing authority unavailable: {0}")]
    Unavailable(String),
}

/// A source of routes for tenants that are not statically configured.
#[async_trait]
pub trait RoutingAuthority: Send + Sync {
    async fn lookup(&self, key: &TenantKey) -> Result<RemoteRoute, RemoteError>;
}

/// `GET {base_url}/{TENANT}` with a bearer token and a bounded timeout. No retries.
pub struct HttpRoutingAuthority {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl HttpRoutingAuthority {
    pub fn new(config: &RemoteConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Load(format!("routing authority client: {}", e)))?;
        Ok(HttpRoutingAuthority {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url_for(&self, key: &TenantKey) -> String {
        format!("{}/{}", self.base_url, key.as_str())
    }
}

#[async_trait]
impl RoutingAuthority for HttpRoutingAuthority {
    async fn lookup(&self, key: &TenantKey) -> Result<RemoteRoute, RemoteError> {
        let mut request = self.client.get(self.url_for(key));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Unavailable("request timed out".into())
            } else {
                RemoteError::Unavailable(format!("request failed: {}", e.without_url()))
            }
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(RemoteError::NotFound),
            StatusCode::FORBIDDEN => return Err(RemoteError::Suspended),
            status if !status.is_success() => {
                return Err(RemoteError::Unavailable(format!("unexpected status {}", status)));
            }
            _ => {}
        }

        response
            .json::<RemoteRoute>()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("malformed payload: {}", e.without_url())))
    }
}
