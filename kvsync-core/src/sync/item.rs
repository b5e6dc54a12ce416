//! Items with sync metadata
//!
//! A stored item is a JSON object. Four keys on it belong to the sync layer
//! (`needsSync`, `syncFailed`, `syncAttempts`, `lastSyncedAt`); everything
//! else is domain data and is what the remote sees.

use super::errors::{SyncError, SyncOpResult};
use serde_json::{Map, Value};

pub const NEEDS_SYNC: &str = "needsSync";
pub const SYNC_FAILED: &str = "syncFailed";
pub const SYNC_ATTEMPTS: &str = "syncAttempts";
pub const LAST_SYNCED_AT: &str = "lastSyncedAt";

const META_KEYS: [&str; 4] = [NEEDS_SYNC, SYNC_FAILED, SYNC_ATTEMPTS, LAST_SYNCED_AT];

/// Domain fields plus sync bookkeeping
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncableItem {
    pub fields: Map<String, Value>,
    pub needs_sync: bool,
    pub sync_failed: bool,
    pub sync_attempts: u32,
    pub last_synced_at: Option<i64>,
}

impl SyncableItem {
    /// New item that still has to reach the remote
    pub fn pending(fields: Map<String, Value>) -> Self {
        Self { fields, needs_sync: true, ..Default::default() }
    }

    /// Split a stored item into domain fields and metadata
    pub fn from_value(value: Value, index: usize) -> SyncOpResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(SyncError::InvalidItem { index });
        };

        let needs_sync = fields.remove(NEEDS_SYNC).and_then(|v| v.as_bool()).unwrap_or(false);
        let sync_failed = fields.remove(SYNC_FAILED).and_then(|v| v.as_bool()).unwrap_or(false);
        let sync_attempts = fields
            .remove(SYNC_ATTEMPTS)
            .and_then(|v| v.as_u64())
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0);
        let last_synced_at = fields.remove(LAST_SYNCED_AT).and_then(|v| v.as_i64());

        Ok(Self { fields, needs_sync, sync_failed, sync_attempts, last_synced_at })
    }

    /// Stored representation, metadata included
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert(NEEDS_SYNC.to_string(), Value::Bool(self.needs_sync));
        map.insert(SYNC_FAILED.to_string(), Value::Bool(self.sync_failed));
        map.insert(SYNC_ATTEMPTS.to_string(), Value::from(self.sync_attempts));
        if let Some(at) = self.last_synced_at {
            map.insert(LAST_SYNCED_AT.to_string(), Value::from(at));
        }
        Value::Object(map)
    }

    /// What the remote receives: domain fields only
    pub fn request_body(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Item identity, numbers rendered as strings
    pub fn id(&self) -> Option<String> {
        match self.fields.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Version marker, if the item carries one
    pub fn version(&self) -> Option<i64> {
        self.fields.get("version").and_then(Value::as_i64)
    }

    /// Retries are used up
    pub fn is_exhausted(&self, max_retries: u32) -> bool {
        self.sync_attempts >= max_retries
    }

    /// Confirmed by the remote; optionally adopt the server's fields
    pub fn mark_synced(&mut self, replacement: Option<Value>, now: i64) {
        if let Some(Value::Object(fields)) = replacement {
            self.fields = strip_meta(fields);
        }
        self.needs_sync = false;
        self.sync_failed = false;
        self.sync_attempts = 0;
        self.last_synced_at = Some(now);
    }

    /// One failed attempt
    pub fn mark_failed(&mut self) {
        self.sync_failed = true;
        self.sync_attempts = self.sync_attempts.saturating_add(1);
    }

    /// Manual reset of a failed item so it is retried again
    pub fn reset(&mut self) {
        self.sync_failed = false;
        self.sync_attempts = 0;
    }
}

/// Integer `version` field of a JSON item
pub fn version_of(value: &Value) -> Option<i64> {
    value.get("version").and_then(Value::as_i64)
}

fn strip_meta(mut fields: Map<String, Value>) -> Map<String, Value> {
    for key in META_KEYS {
        fields.remove(key);
    }
    fields
}

/// Decode a stored item array
pub fn items_from_values(values: &[Value]) -> SyncOpResult<Vec<SyncableItem>> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| SyncableItem::from_value(value.clone(), index))
        .collect()
}

/// Encode items for storage
pub fn items_to_values(items: &[SyncableItem]) -> Vec<Value> {
    items.iter().map(SyncableItem::to_value).collect()
}
