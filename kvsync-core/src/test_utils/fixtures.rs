//! Test fixtures for stored collections

use crate::storage::{BackingStore, StorageError, StorageResult, StoredPayload};
use crate::sync::item::{items_from_values, SyncableItem};
use async_trait::async_trait;
use serde_json::{json, Value};

/// `count` items flagged for sync, ids `0..count`
pub fn pending_items(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| json!({"id": i, "title": format!("item {}", i), "needsSync": true}))
        .collect()
}

/// Legacy-encoded collection of [`pending_items`]
pub fn pending_collection(count: usize) -> Vec<u8> {
    serde_json::to_vec(&pending_items(count)).unwrap()
}

/// Decode the collection stored under `key`
pub async fn stored_items(store: &dyn BackingStore, key: &str) -> Vec<SyncableItem> {
    let bytes = store.retrieve(key).await.unwrap();
    let payload = StoredPayload::decode(bytes.as_deref()).unwrap();
    items_from_values(payload.items()).unwrap()
}

/// Store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl BackingStore for FailingStore {
    async fn save(&self, _key: &str, _value: &[u8]) -> StorageResult<()> {
        Err(StorageError::Io("store unavailable".to_string()))
    }

    async fn retrieve(&self, _key: &str) -> StorageResult<Option<Vec<u8>>> {
        Err(StorageError::Io("store unavailable".to_string()))
    }

    async fn remove(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::Io("store unavailable".to_string()))
    }

    async fn clear(&self) -> StorageResult<()> {
        Err(StorageError::Io("store unavailable".to_string()))
    }
}
