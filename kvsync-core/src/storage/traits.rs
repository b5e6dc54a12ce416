//! Backing Store Trait
//!
//! Defines the boundary to the byte-oriented key/value store that holds
//! serialized collections. Serialization layout is owned by callers.

use super::errors::StorageResult;
use crate::tab_sync::ContextId;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Shape of the backend, used to decide which cross-context transports work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Plain string/bytes key/value store (local/session-storage style)
    KeyValue,
    /// Anything richer; mutation events are never available
    Structured,
}

/// A mutation observed on a shared key/value backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Affected key; `None` for a store-wide clear
    pub key: Option<String>,
    /// Value after the mutation; `None` when the key became absent
    pub new_value: Option<Vec<u8>>,
    /// Context that performed the write
    pub source: ContextId,
}

/// Backing store trait
///
/// Implementations must provide read-your-own-write consistency within one
/// context. Nothing else is assumed.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Store bytes under `key`, replacing any previous value
    async fn save(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Load bytes for `key`
    async fn retrieve(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Delete `key`; deleting a missing key is not an error
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Delete every key
    async fn clear(&self) -> StorageResult<()>;

    /// Backend shape
    fn kind(&self) -> BackendKind {
        BackendKind::Structured
    }

    /// Subscribe to mutations, if the backend emits them
    ///
    /// Events arrive in write order and are never dropped; a subscriber
    /// filters out its own writes by `source`.
    fn mutation_events(&self) -> Option<mpsc::UnboundedReceiver<StorageEvent>> {
        None
    }
}
