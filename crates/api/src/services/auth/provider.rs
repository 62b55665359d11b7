//! Identity Provider port and its HTTP implementation.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::config::IdentityConfig;

/// What the Identity Provider reveals about a valid token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityClaims {
    pub id: String,
    pub email: String,
}

/// Identity Provider failures. Callers collapse all of them into one
/// "invalid or expired" answer; the detail is for logs only.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("identity provider rejected token with status {0}")]
    Rejected(u16),

    /// The provider could not be reached.
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),

    /// The success body was not `{id, email, ...}`.
    #[error("identity provider response undecodable: {0}")]
    Decode(String),
}

/// Exchanges a bearer token for the subject it belongs to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Look up the subject behind `token`.
    async fn lookup(&self, token: &str) -> Result<IdentityClaims, ProviderError>;
}

/// Identity Provider reached over HTTP: `GET {verify_url}` with the token as
/// a bearer credential and the service key in `apikey`.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    client: Client,
    verify_url: Url,
    service_key: SecretString,
}

impl std::fmt::Debug for HttpIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIdentityProvider")
            .field("verify_url", &self.verify_url.as_str())
            .field("service_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpIdentityProvider {
    /// # Errors
    ///
    /// Returns `ProviderError::Unreachable` if the HTTP client cannot be built.
    pub fn new(config: &IdentityConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Unreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            verify_url: config.verify_url.clone(),
            service_key: config.service_key.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip_all)]
    async fn lookup(&self, token: &str) -> Result<IdentityClaims, ProviderError> {
        let response = self
            .client
            .get(self.verify_url.clone())
            .bearer_auth(token)
            .header("apikey", self.service_key.expose_secret())
            .send()
            .await
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Rejected(status.as_u16()));
        }

        response
            .json::<IdentityClaims>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}
