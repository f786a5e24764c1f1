//! HTTP producer for the caching proxy
//!
//! Forwards an operation's JSON payload to `{base_url}/{operation}` and hands
//! the decoded JSON response back untouched.

use crate::config::UpstreamConfig;
use crate::core::{CacheError, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Client for the expensive API sitting behind the cache
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    base_url: String,
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CacheError::Internal(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build a client from configuration, `None` when no base URL is set
    pub fn from_config(config: &UpstreamConfig) -> Result<Option<Self>> {
        config
            .base_url
            .as_deref()
            .map(|url| Self::new(url, Duration::from_secs(config.timeout_secs)))
            .transpose()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST the payload for `operation` and return the JSON response
    pub async fn call(&self, operation: &str, payload: &Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, operation);
        debug!("Upstream call {}", url);

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| CacheError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CacheError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| CacheError::Upstream(format!("invalid JSON response: {}", e)))
    }
}
