/*
    payload.rs - Stored collection payloads

    A stored value is either a versioned collection:

        {"schemaVersion": 2, "items": [...], "migratedAt": 1700000000000,
         "migrationHistory": [...]}

    or a legacy bare array of items written before versioning existed,
    which is treated as schema version 1. Classification is explicit:
    an object only counts as versioned when it carries an integer
    `schemaVersion` and an array `items`.
*/

use super::errors::{StorageError, StorageResult};
use crate::migration::MigrationRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version assumed for payloads without version metadata
pub const LEGACY_VERSION: u32 = 1;

/// Collection with schema metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedCollection {
    pub schema_version: u32,
    pub items: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_at: Option<i64>,
    #[serde(default)]
    pub migration_history: Vec<MigrationRecord>,
}

impl VersionedCollection {
    /// Fresh collection at `schema_version`
    pub fn new(schema_version: u32, items: Vec<Value>) -> Self {
        Self { schema_version, items, migrated_at: None, migration_history: Vec::new() }
    }
}

/// Shape of a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Versioned,
    Legacy,
    Unrecognised,
}

/// Classify a JSON value without converting it
pub fn classify(value: &Value) -> PayloadShape {
    match value {
        Value::Array(_) | Value::Null => PayloadShape::Legacy,
        Value::Object(map) => {
            let has_version = map
                .get("schemaVersion")
                .and_then(Value::as_u64)
                .is_some_and(|v| v >= 1 && v <= u64::from(u32::MAX));
            let has_items = map.get("items").is_some_and(Value::is_array);
            if has_version && has_items {
                PayloadShape::Versioned
            } else {
                PayloadShape::Unrecognised
            }
        }
        _ => PayloadShape::Unrecognised,
    }
}

/// A decoded stored value
#[derive(Debug, Clone, PartialEq)]
pub enum StoredPayload {
    Versioned(VersionedCollection),
    Legacy(Vec<Value>),
}

impl StoredPayload {
    /// Decode a JSON value
    pub fn from_value(value: Value) -> StorageResult<Self> {
        match classify(&value) {
            PayloadShape::Versioned => serde_json::from_value(value)
                .map(StoredPayload::Versioned)
                .map_err(|e| StorageError::Deserialization(e.to_string())),
            PayloadShape::Legacy => match value {
                Value::Array(items) => Ok(StoredPayload::Legacy(items)),
                _ => Ok(StoredPayload::Legacy(Vec::new())),
            },
            PayloadShape::Unrecognised => Err(StorageError::Deserialization(
                "expected an item array or a versioned collection".to_string(),
            )),
        }
    }

    /// Decode raw store bytes; a missing value is an empty legacy collection
    pub fn decode(bytes: Option<&[u8]>) -> StorageResult<Self> {
        match bytes {
            None => Ok(StoredPayload::Legacy(Vec::new())),
            Some(bytes) => {
                let value: Value = serde_json::from_slice(bytes)
                    .map_err(|e| StorageError::Deserialization(e.to_string()))?;
                Self::from_value(value)
            }
        }
    }

    /// Recorded schema version
    pub fn version(&self) -> u32 {
        match self {
            StoredPayload::Versioned(c) => c.schema_version,
            StoredPayload::Legacy(_) => LEGACY_VERSION,
        }
    }

    /// Items regardless of shape
    pub fn items(&self) -> &[Value] {
        match self {
            StoredPayload::Versioned(c) => &c.items,
            StoredPayload::Legacy(items) => items,
        }
    }

    pub fn is_versioned(&self) -> bool {
        matches!(self, StoredPayload::Versioned(_))
    }

    /// Promote to a versioned collection, keeping existing metadata
    pub fn into_versioned(self) -> VersionedCollection {
        match self {
            StoredPayload::Versioned(c) => c,
            StoredPayload::Legacy(items) => VersionedCollection::new(LEGACY_VERSION, items),
        }
    }

    /// Replace the items, keeping the payload shape and metadata
    pub fn with_items(self, items: Vec<Value>) -> Self {
        match self {
            StoredPayload::Versioned(mut c) => {
                c.items = items;
                StoredPayload::Versioned(c)
            }
            StoredPayload::Legacy(_) => StoredPayload::Legacy(items),
        }
    }

    /// Encode to store bytes
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let result = match self {
            StoredPayload::Versioned(c) => serde_json::to_vec(c),
            StoredPayload::Legacy(items) => serde_json::to_vec(items),
        };
        result.map_err(|e| StorageError::Serialization(e.to_string()))
    }
}
