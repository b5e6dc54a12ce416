//! Cross-tab change messages
//!
//! Wire shape: `{type: "update"|"remove"|"clear", items?, timestamp, tabId, storageKey}`

use super::context::ContextId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Update,
    Remove,
    Clear,
}

/// A change announced by one context to its siblings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMessage {
    #[serde(rename = "type")]
    pub kind: ChangeKind,

    /// New collection contents (updates only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Value>>,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,

    /// Publishing context
    #[serde(rename = "tabId")]
    pub origin_id: ContextId,

    /// Logical key the change applies to
    #[serde(rename = "storageKey")]
    pub channel_key: String,
}

impl ChangeMessage {
    fn new(kind: ChangeKind, items: Option<Vec<Value>>, origin_id: ContextId, key: &str) -> Self {
        Self {
            kind,
            items,
            timestamp: chrono::Utc::now().timestamp_millis(),
            origin_id,
            channel_key: key.to_string(),
        }
    }

    pub fn update(origin_id: ContextId, key: &str, items: Vec<Value>) -> Self {
        Self::new(ChangeKind::Update, Some(items), origin_id, key)
    }

    pub fn remove(origin_id: ContextId, key: &str) -> Self {
        Self::new(ChangeKind::Remove, None, origin_id, key)
    }

    pub fn clear(origin_id: ContextId, key: &str) -> Self {
        Self::new(ChangeKind::Clear, None, origin_id, key)
    }
}

/// Channel name for a logical storage key
pub fn channel_name(storage_key: &str) -> String {
    format!("kvsync:{}", storage_key)
}
