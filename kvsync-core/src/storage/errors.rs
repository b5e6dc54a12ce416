/*
    errors.rs - Error types for the storage layer

    Covers the backing store boundary and the stored payload codec.
*/

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend I/O failed
    #[error("Storage error: {0}")]
    Io(String),

    /// Payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored bytes are not a recognised payload
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Key cannot be represented by this backend
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
