//! HTTP implementation of [`RemoteEndpoint`]

use super::{BatchResponse, RemoteEndpoint};
use crate::config::SyncConfig;
use crate::sync::errors::{SyncError, SyncOpResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// POSTs items as JSON to one URL
#[derive(Clone)]
pub struct HttpEndpoint {
    client: Client,
    url: Url,
}

impl HttpEndpoint {
    pub fn new(
        url: &str,
        headers: impl IntoIterator<Item = (String, String)>,
        timeout: Duration,
    ) -> SyncOpResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| SyncError::NotConfigured(format!("invalid endpoint '{}': {}", url, e)))?;

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SyncError::NotConfigured(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| SyncError::NotConfigured(format!("invalid header value: {}", e)))?;
            header_map.insert(name, value);
        }

        let client = Client::builder()
            .default_headers(header_map)
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::NotConfigured(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }

    /// Build from the `[sync]` section; the endpoint must be set
    pub fn from_config(config: &SyncConfig) -> SyncOpResult<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| SyncError::NotConfigured("no sync endpoint configured".to_string()))?;
        Self::new(endpoint, config.headers.clone(), config.request_timeout)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post(&self, body: &Value) -> SyncOpResult<Value> {
        let response = self.client.post(self.url.clone()).json(body).send().await?;
        let status = response.status();
        debug!(url = %self.url, %status, "sync request answered");

        // A 409 with a body is the server's current representation
        if status.is_success() || status == StatusCode::CONFLICT {
            let text = response.text().await?;
            if status == StatusCode::CONFLICT && text.trim().is_empty() {
                return Err(SyncError::NetworkFailure(format!("server returned {}", status)));
            }
            return serde_json::from_str(&text)
                .map_err(|e| SyncError::InvalidResponse(format!("response is not JSON: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(SyncError::NetworkFailure(format!("server returned {}: {}", status, body)))
    }
}

#[async_trait]
impl RemoteEndpoint for HttpEndpoint {
    async fn push_item(&self, item: &Value) -> SyncOpResult<Value> {
        self.post(item).await
    }

    async fn push_batch(&self, items: &[Value]) -> SyncOpResult<BatchResponse> {
        let value = self.post(&json!({ "items": items })).await?;
        serde_json::from_value(value)
            .map_err(|e| SyncError::InvalidResponse(format!("malformed batch response: {}", e)))
    }
}
