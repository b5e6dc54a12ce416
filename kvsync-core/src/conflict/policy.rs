//! Named resolution policies and the strategy type built from them

use super::resolver::ConflictHandler;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Resolution policy that can be named in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionPolicy {
    #[default]
    LastWriteWins,
    FirstWriteWins,
    ServerWins,
}

impl ResolutionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionPolicy::LastWriteWins => "last-write-wins",
            ResolutionPolicy::FirstWriteWins => "first-write-wins",
            ResolutionPolicy::ServerWins => "server-wins",
        }
    }
}

impl fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "last-write-wins" => Ok(ResolutionPolicy::LastWriteWins),
            "first-write-wins" => Ok(ResolutionPolicy::FirstWriteWins),
            "server-wins" => Ok(ResolutionPolicy::ServerWins),
            _ => Err(format!("unknown conflict resolution policy: {}", s)),
        }
    }
}

/// How a conflict is settled: a named policy or user code
#[derive(Clone)]
pub enum ConflictStrategy {
    LastWriteWins,
    FirstWriteWins,
    ServerWins,
    Custom(Arc<dyn ConflictHandler>),
}

impl ConflictStrategy {
    /// Wrap a user handler
    pub fn custom(handler: impl ConflictHandler + 'static) -> Self {
        ConflictStrategy::Custom(Arc::new(handler))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConflictStrategy::LastWriteWins => ResolutionPolicy::LastWriteWins.as_str(),
            ConflictStrategy::FirstWriteWins => ResolutionPolicy::FirstWriteWins.as_str(),
            ConflictStrategy::ServerWins => ResolutionPolicy::ServerWins.as_str(),
            ConflictStrategy::Custom(_) => "custom",
        }
    }
}

impl Default for ConflictStrategy {
    fn default() -> Self {
        ConflictStrategy::LastWriteWins
    }
}

impl From<ResolutionPolicy> for ConflictStrategy {
    fn from(policy: ResolutionPolicy) -> Self {
        match policy {
            ResolutionPolicy::LastWriteWins => ConflictStrategy::LastWriteWins,
            ResolutionPolicy::FirstWriteWins => ConflictStrategy::FirstWriteWins,
            ResolutionPolicy::ServerWins => ConflictStrategy::ServerWins,
        }
    }
}

impl fmt::Debug for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
