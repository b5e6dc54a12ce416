/*
    errors.rs - Error types for schema migration

    Every variant is fatal for the `migrate()` call that raised it. None of
    them leave stored data partially rewritten: persistence only happens
    after the whole chain succeeded.
*/

use crate::storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// No migration registered for a version inside the chain
    #[error("No migration registered for version {missing} (migrating {from} -> {to})")]
    MigrationGap { missing: u32, from: u32, to: u32 },

    /// Stored data is newer than this build understands
    #[error("Stored data is at version {recorded}, newer than target {target}")]
    DowngradeAttempted { recorded: u32, target: u32 },

    /// A migration returned something other than an item array
    #[error("Migration to version {version} returned {found}, expected an array")]
    MalformedMigrationResult { version: u32, found: &'static str },

    /// A migration function reported an error
    #[error("Migration to version {version} failed: {reason}")]
    StepFailed { version: u32, reason: String },

    /// The registered chain is structurally invalid
    #[error("Invalid migration configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type MigrationResult<T> = Result<T, MigrationError>;

/// JSON type name, for error messages
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
