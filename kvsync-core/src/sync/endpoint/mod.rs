//! Remote Endpoint Trait
//!
//! The single authoritative server. Single-item requests carry the item's
//! domain fields and get the server's representation back. Batch requests
//! carry `{"items": [...]}` and get `{"results": [{index, success, data?,
//! conflict?}]}` back.

pub mod http;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use super::errors::SyncOpResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use http::HttpEndpoint;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockEndpoint;

/// Per-item entry of a batch response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Position of the item in the request
    pub index: usize,
    pub success: bool,
    /// Server representation, if returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Server flagged a version conflict for this item
    #[serde(default)]
    pub conflict: bool,
}

impl BatchItemResult {
    pub fn ok(index: usize, data: Option<Value>) -> Self {
        Self { index, success: true, data, conflict: false }
    }

    pub fn failed(index: usize) -> Self {
        Self { index, success: false, data: None, conflict: false }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItemResult>,
}

impl BatchResponse {
    /// Result for request position `index`, if the server sent one
    pub fn result_for(&self, index: usize) -> Option<&BatchItemResult> {
        self.results.iter().find(|r| r.index == index)
    }
}

#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    /// Send one item, returning the server's representation of it
    async fn push_item(&self, item: &Value) -> SyncOpResult<Value>;

    /// Send several items in one request
    async fn push_batch(&self, items: &[Value]) -> SyncOpResult<BatchResponse>;
}
