//! Bearer credentials for the parsing service.
//!
//! The orchestrator resolves a [`CredentialSource`] exactly once per run and
//! threads the resulting [`ApiKey`] down to every request. Nothing reads the
//! key from ambient state after that point.

use crate::error::ConnectorError;
use async_trait::async_trait;
use std::fmt;

/// Environment variable read by [`EnvCredentials::default`].
pub const API_KEY_ENV: &str = "UPSTAGE_API_KEY";

/// Keys this short are masked completely.
const MASK_MIN_LEN: usize = 8;

/// An opaque bearer token. `Debug` and `Display` never reveal it.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a token; surrounding whitespace is trimmed.
    pub fn new(key: impl Into<String>) -> Result<Self, ConnectorError> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(ConnectorError::MissingCredential {
                hint: "The API key is empty.".into(),
            });
        }
        Ok(Self(key))
    }

    /// Safe to log: the first four characters and an ellipsis for keys longer
    /// than eight characters, `****` otherwise.
    pub fn masked(&self) -> String {
        if self.0.chars().count() <= MASK_MIN_LEN {
            return "****".to_string();
        }
        let prefix: String = self.0.chars().take(4).collect();
        format!("{prefix}…")
    }

    /// `Bearer <token>`.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&self.masked()).finish()
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Supplies the API key for a run.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn api_key(&self) -> Result<ApiKey, ConnectorError>;
}

#[async_trait]
impl CredentialSource for ApiKey {
    async fn api_key(&self) -> Result<ApiKey, ConnectorError> {
        Ok(self.clone())
    }
}

/// Reads the key from an environment variable at resolution time.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(API_KEY_ENV)
    }
}

#[async_trait]
impl CredentialSource for EnvCredentials {
    async fn api_key(&self) -> Result<ApiKey, ConnectorError> {
        match std::env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => ApiKey::new(value),
            _ => Err(ConnectorError::MissingCredential {
                hint: format!("Set {} or pass --api-key.", self.var),
            }),
        }
    }
}
