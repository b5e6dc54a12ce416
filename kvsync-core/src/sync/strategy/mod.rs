/*
    strategy - Interchangeable ways of pushing pending items

    Immediate: one request per pending item, one attempt per pass, local
               fields replaced by the server representation.
    Queued:    items in fixed-size groups, one request per item, honours
               max_retries and waits retry_delay before a retried item.
    Batch:     one request per fixed-size group; a failed request fails the
               whole group.

    All three route version conflicts through the ConflictResolver and hand
    progress to the Checkpoint sink so the engine can persist it.
*/

mod batch;
mod immediate;
mod queued;

pub use batch::BatchStrategy;
pub use immediate::ImmediateStrategy;
pub use queued::QueuedStrategy;

use super::endpoint::RemoteEndpoint;
use super::errors::{SyncError, SyncOpResult};
use super::item::{version_of, SyncableItem};
use super::status::SyncResult;
use crate::config::SyncConfig;
use crate::conflict::{ConflictContext, ConflictResolver};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Immediate,
    Queued,
    Batch,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Immediate => "immediate",
            StrategyKind::Queued => "queued",
            StrategyKind::Batch => "batch",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "immediate" => Ok(StrategyKind::Immediate),
            "queued" => Ok(StrategyKind::Queued),
            "batch" => Ok(StrategyKind::Batch),
            _ => Err(format!("unknown sync strategy: {}", s)),
        }
    }
}

/// Tunables shared by the strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategySettings {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub batch_size: usize,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self { max_retries: 3, retry_delay: Duration::from_millis(1000), batch_size: 50 }
    }
}

impl From<&SyncConfig> for StrategySettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
            batch_size: config.batch_size.max(1),
        }
    }
}

/// Receives the collection whenever a strategy reaches a checkpoint
#[async_trait]
pub trait Checkpoint: Send + Sync {
    async fn persist(&self, items: &[SyncableItem]) -> SyncOpResult<()>;
}

/// Everything a strategy needs for one pass
pub struct SyncContext<'a> {
    pub collection_key: &'a str,
    pub endpoint: &'a dyn RemoteEndpoint,
    pub resolver: &'a ConflictResolver,
    pub settings: StrategySettings,
    pub checkpoint: &'a dyn Checkpoint,
}

#[async_trait]
pub trait SyncStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Items this strategy would account for in a pass
    fn pending_count(&self, items: &[SyncableItem]) -> usize {
        items.iter().filter(|item| item.needs_sync).count()
    }

    /// Push pending items; recoverable failures are counted, not returned
    async fn execute(&self, items: &mut [SyncableItem], ctx: &SyncContext<'_>) -> SyncOpResult<SyncResult>;
}

/// Strategy for a configured kind
pub fn build_strategy(kind: StrategyKind) -> Box<dyn SyncStrategy> {
    match kind {
        StrategyKind::Immediate => Box::new(ImmediateStrategy),
        StrategyKind::Queued => Box::new(QueuedStrategy),
        StrategyKind::Batch => Box::new(BatchStrategy),
    }
}

/// Indices of items waiting for the remote
pub(crate) fn pending_indices(items: &[SyncableItem]) -> Vec<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.needs_sync)
        .map(|(i, _)| i)
        .collect()
}

/// Both sides carry a version and they differ
pub fn is_conflict(local: Option<i64>, remote: Option<i64>) -> bool {
    matches!((local, remote), (Some(l), Some(r)) if l != r)
}

/// How an acknowledged item takes the server's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Adopt {
    /// Replace local fields with the server representation
    ServerFields,
    /// Keep local fields unless a conflict says otherwise
    LocalFields,
}

impl SyncContext<'_> {
    /// Mark an acknowledged item synced, resolving a conflict first if there
    /// is one. Returns whether a conflict was resolved.
    pub(crate) async fn settle(
        &self,
        item: &mut SyncableItem,
        server: Option<Value>,
        adopt: Adopt,
        flagged_conflict: bool,
    ) -> SyncOpResult<bool> {
        let now = chrono::Utc::now().timestamp_millis();
        let Some(remote) = server else {
            if flagged_conflict {
                return Err(SyncError::InvalidResponse(
                    "conflict flagged without server data".to_string(),
                ));
            }
            item.mark_synced(None, now);
            return Ok(false);
        };

        let local_version = item.version();
        let remote_version = version_of(&remote);
        if flagged_conflict || is_conflict(local_version, remote_version) {
            let context = ConflictContext {
                collection_key: self.collection_key.to_string(),
                item_id: item.id(),
                local_version,
                remote_version,
            };
            let winner = self
                .resolver
                .resolve(&item.request_body(), &remote, &context)
                .await
                .map_err(|e| SyncError::Resolver(format!("{:#}", e)))?;
            item.mark_synced(Some(winner), now);
            return Ok(true);
        }

        match adopt {
            Adopt::ServerFields => item.mark_synced(Some(remote), now),
            Adopt::LocalFields => item.mark_synced(None, now),
        }
        Ok(false)
    }
}

/// Running tally for one pass
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub result: SyncResult,
}

impl Tally {
    pub fn synced(&mut self, conflict: bool) {
        self.result.success += 1;
        if conflict {
            self.result.conflicts += 1;
        }
    }

    pub fn failed(&mut self, item: &mut SyncableItem) {
        item.mark_failed();
        self.result.failed += 1;
    }

    pub fn exhausted(&mut self) {
        self.result.failed += 1;
        self.result.exhausted += 1;
    }

    /// Account for a settle() outcome
    pub fn settled(&mut self, item: &mut SyncableItem, outcome: SyncOpResult<bool>) {
        match outcome {
            Ok(conflict) => self.synced(conflict),
            Err(e) => {
                tracing::warn!(item = ?item.id(), "could not settle item: {}", e);
                self.failed(item);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_parsing() {
        assert_eq!("Queued".parse::<StrategyKind>(), Ok(StrategyKind::Queued));
        assert!("eventually".parse::<StrategyKind>().is_err());
        assert_eq!(StrategyKind::Batch.to_string(), "batch");
    }

    #[test]
    fn test_build_strategy() {
        for kind in [StrategyKind::Immediate, StrategyKind::Queued, StrategyKind::Batch] {
            assert_eq!(build_strategy(kind).kind(), kind);
        }
    }

    #[test]
    fn test_conflict_needs_both_versions() {
        assert!(is_conflict(Some(1), Some(2)));
        assert!(!is_conflict(Some(2), Some(2)));
        assert!(!is_conflict(None, Some(2)));
        assert!(!is_conflict(Some(1), None));
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = SyncConfig::default();
        config.batch_size = 0;
        assert_eq!(StrategySettings::from(&config).batch_size, 1);
    }
}
