//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("cannot write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("{} is not valid kvsync TOML: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("cannot serialize configuration: {0}")]
    Serialize(String),

    /// An environment override could not be parsed
    #[error("{var}={value:?} is invalid: {reason}")]
    InvalidEnv { var: &'static str, value: String, reason: String },

    /// Values parsed but break a constraint
    #[error("invalid [{section}] configuration: {reason}")]
    Invalid { section: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(section: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { section, reason: reason.into() }
    }
}
