/*
    storage - Backing store boundary and stored payload model

    The sync, migration and cross-tab layers only see bytes through
    `BackingStore`; the payload module owns the JSON layout of a stored
    collection.
*/

pub mod errors;
pub mod file_store;
pub mod memory_store;
pub mod payload;
pub mod traits;

pub use errors::{StorageError, StorageResult};
pub use file_store::FileStore;
pub use memory_store::{MemoryStore, SharedKvHandle, SharedKvStore};
pub use payload::{classify, PayloadShape, StoredPayload, VersionedCollection, LEGACY_VERSION};
pub use traits::{BackendKind, BackingStore, StorageEvent};
