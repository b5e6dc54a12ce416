/*
    sync - Reconciles a local collection with one remote authority

    Best-effort and last-writer-biased. Items flagged `needsSync` are
    pushed by the configured strategy; version conflicts go to the
    conflict resolver, whose output replaces the local item.
*/

pub mod connectivity;
pub mod endpoint;
pub mod engine;
pub mod errors;
pub mod item;
pub mod status;
pub mod strategy;

pub use connectivity::Connectivity;
pub use endpoint::{BatchItemResult, BatchResponse, HttpEndpoint, RemoteEndpoint};
#[cfg(any(test, feature = "test-util"))]
pub use endpoint::MockEndpoint;
pub use engine::{reset_failed_items, SyncEngine, SyncObserver, SyncOptions, DEFAULT_BATCH_INTERVAL};
pub use errors::{SyncError, SyncOpResult};
pub use item::SyncableItem;
pub use status::{ErrorEntry, ErrorLog, SyncResult, SyncStatus, ERROR_LOG_CAPACITY};
pub use strategy::{build_strategy, StrategyKind, StrategySettings, SyncStrategy};
