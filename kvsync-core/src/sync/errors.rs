/*
    errors.rs - Error types for remote synchronisation

    NetworkFailure and InvalidResponse are usually absorbed by the
    strategies as one failed attempt per affected item. Everything that
    escapes a strategy is an uncaught pass failure and lands in the error log.
*/

use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Request failed or the server answered with an error status
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Server answered with a body we cannot use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Stored collection holds something that is not an item object
    #[error("Item at index {index} is not an object")]
    InvalidItem { index: usize },

    /// Custom conflict handler failed
    #[error("Conflict resolution failed: {0}")]
    Resolver(String),

    /// Sync was requested without the required configuration
    #[error("Sync not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for sync operations
pub type SyncOpResult<T> = Result<T, SyncError>;

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::InvalidResponse(err.to_string())
        } else {
            SyncError::NetworkFailure(err.to_string())
        }
    }
}
