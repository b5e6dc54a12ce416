//! kvsync-core
//!
//! Synchronisation layer for client-side key/value collections:
//! cross-context change propagation, remote sync with pluggable strategies
//! and conflict resolution, and ordered schema migration.

pub mod config;
pub mod conflict;
pub mod logging;
pub mod metrics;
pub mod migration;
pub mod storage;
pub mod sync;
pub mod tab_sync;
pub mod tracing;

#[cfg(test)]
pub mod test_utils;

pub use config::{Config, ConfigError};
pub use conflict::{ConflictContext, ConflictHandler, ConflictResolver, ConflictStrategy, ResolutionPolicy};
pub use logging::{init_logging, LogLevel};
pub use migration::{MigrationEngine, MigrationError, MigrationRecord, MigrationReport};
pub use storage::{BackingStore, StorageError, StoredPayload, VersionedCollection};
pub use sync::{
    Connectivity, StrategyKind, SyncEngine, SyncError, SyncOptions, SyncResult, SyncStatus,
    SyncableItem,
};
pub use tab_sync::{BroadcastHub, BrowsingContext, ChangeMessage, ContextId, TabCoordinator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Ensure the main exports are accessible
        let _ = LogLevel::Info;
        let _ = ConflictStrategy::LastWriteWins;
        let _ = StrategyKind::default();
    }
}
