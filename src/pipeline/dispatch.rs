//! Upload dispatch: one authenticated POST per attachment.
//!
//! The only stage with network I/O. No retries and no timeout beyond the HTTP
//! client's default; recovery is left to the orchestrator's failure policy.
//!
//! Failures are split in two so callers can tell them apart:
//! * [`ConnectorError::Transport`]: the endpoint was never reached, or the
//!   connection broke while reading the response;
//! * [`ConnectorError::Remote`]: the endpoint answered with a non-2xx status.

use crate::credentials::ApiKey;
use crate::error::ConnectorError;
use crate::pipeline::multipart::MultipartBody;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// A fully materialised upload, built fresh per attachment.
#[derive(Debug)]
pub struct UploadRequest {
    url: String,
    api_key: ApiKey,
    body: MultipartBody,
}

impl UploadRequest {
    pub fn new(url: impl Into<String>, api_key: &ApiKey, body: MultipartBody) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.clone(),
            body,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> &MultipartBody {
        &self.body
    }

    /// `Authorization` header value.
    pub fn authorization(&self) -> String {
        self.api_key.bearer()
    }

    /// `Content-Type` header value.
    pub fn content_type(&self) -> String {
        self.body.content_type()
    }
}

/// Sends one [`UploadRequest`] and returns the decoded response body.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, request: UploadRequest) -> Result<Value, ConnectorError>;
}

/// [`Dispatch`] over HTTP with `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpDispatcher {
    client: Client,
}

impl HttpDispatcher {
    pub fn new() -> Result<Self, ConnectorError> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConnectorError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Use a caller-configured client (proxies, custom TLS, timeouts).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Dispatch for HttpDispatcher {
    async fn dispatch(&self, request: UploadRequest) -> Result<Value, ConnectorError> {
        let authorization = request.authorization();
        let content_type = request.content_type();
        let UploadRequest { url, body, .. } = request;

        debug!(url = %url, bytes = body.len(), "Dispatching upload");

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, content_type)
            .body(body.into_bytes())
            .send()
            .await
            .map_err(|e| ConnectorError::Transport {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ConnectorError::Transport {
            url: url.clone(),
            reason: format!("failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(ConnectorError::Remote {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(url = %url, status = status.as_u16(), bytes = text.len(), "Upload accepted");
        Ok(decode_response(text))
    }
}

/// JSON bodies are parsed; anything else is passed through as a string.
pub fn decode_response(text: String) -> Value {
    match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(_) => Value::String(text),
    }
}
