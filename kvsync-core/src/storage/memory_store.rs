//! In-Memory Backing Stores
//!
//! `MemoryStore` is a private per-context map. `SharedKvStore` is one map
//! shared by several contexts; every write made through a context handle is
//! published as a [`StorageEvent`] to the other handles, mirroring the
//! mutation events a browser raises for local storage.

use super::errors::StorageResult;
use super::traits::{BackendKind, BackingStore, StorageEvent};
use crate::tab_sync::ContextId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, RwLock};

/// In-memory store private to one context
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    kind: BackendKind,
}

impl MemoryStore {
    /// Create an empty key/value store
    pub fn new() -> Self {
        Self::with_kind(BackendKind::KeyValue)
    }

    /// Create an empty store reporting the given backend shape
    pub fn with_kind(kind: BackendKind) -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())), kind }
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no keys
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn save(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.entries.write().await.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }
}

/// Key/value map shared by every context of one origin
#[derive(Clone, Default)]
pub struct SharedKvStore {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<StorageEvent>>>>,
}

impl SharedKvStore {
    /// Create an empty shared store
    pub fn new() -> Self {
        Self::default()
    }

    /// View of the store as seen from one context
    pub fn handle(&self, context: ContextId) -> SharedKvHandle {
        SharedKvHandle { store: self.clone(), context }
    }

    /// Callers hold the entries write lock, so events follow write order
    fn publish(&self, key: Option<String>, new_value: Option<Vec<u8>>, source: ContextId) {
        let event = StorageEvent { key, new_value, source };
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<StorageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(tx);
        rx
    }
}

/// A context's handle onto a [`SharedKvStore`]
#[derive(Clone)]
pub struct SharedKvHandle {
    store: SharedKvStore,
    context: ContextId,
}

impl SharedKvHandle {
    /// Context that owns this handle
    pub fn context(&self) -> ContextId {
        self.context
    }
}

#[async_trait]
impl BackingStore for SharedKvHandle {
    async fn save(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut entries = self.store.entries.write().await;
        entries.insert(key.to_string(), value.to_vec());
        self.store.publish(Some(key.to_string()), Some(value.to_vec()), self.context);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.store.entries.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let mut entries = self.store.entries.write().await;
        if entries.remove(key).is_some() {
            self.store.publish(Some(key.to_string()), None, self.context);
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        let mut entries = self.store.entries.write().await;
        entries.clear();
        self.store.publish(None, None, self.context);
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    fn mutation_events(&self) -> Option<mpsc::UnboundedReceiver<StorageEvent>> {
        Some(self.store.subscribe())
    }
}
