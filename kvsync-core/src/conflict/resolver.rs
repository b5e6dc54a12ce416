/*
    resolver.rs - Picks the winning snapshot of a conflicting item

    The named policies compare the `updatedAt` field of both snapshots.
    `updatedAt` may be epoch milliseconds or an RFC 3339 string; anything
    else counts as absent. Ties and absent timestamps always go to the
    remote snapshot, which is the authority.
*/

use super::policy::ConflictStrategy;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Facts about the conflict handed to the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictContext {
    /// Logical key of the collection the item lives in
    pub collection_key: String,
    /// Identity of the item, if it has one
    pub item_id: Option<String>,
    pub local_version: Option<i64>,
    pub remote_version: Option<i64>,
}

/// User-supplied resolution
#[async_trait]
pub trait ConflictHandler: Send + Sync {
    /// Produce the snapshot that replaces the local item
    async fn resolve(
        &self,
        local: &Value,
        remote: &Value,
        context: &ConflictContext,
    ) -> anyhow::Result<Value>;
}

/// Stateless selection of a resolution function
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    strategy: ConflictStrategy,
}

impl ConflictResolver {
    pub fn new(strategy: ConflictStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &ConflictStrategy {
        &self.strategy
    }

    /// Settle a conflict; the result fully replaces the local item
    ///
    /// Named policies never fail. A custom handler's error is returned as is.
    pub async fn resolve(
        &self,
        local: &Value,
        remote: &Value,
        context: &ConflictContext,
    ) -> anyhow::Result<Value> {
        let winner = match &self.strategy {
            ConflictStrategy::LastWriteWins => last_write_wins(local, remote).clone(),
            ConflictStrategy::FirstWriteWins => first_write_wins(local, remote).clone(),
            ConflictStrategy::ServerWins => remote.clone(),
            ConflictStrategy::Custom(handler) => handler.resolve(local, remote, context).await?,
        };

        debug!(
            collection = %context.collection_key,
            item = ?context.item_id,
            strategy = self.strategy.name(),
            "conflict resolved"
        );
        Ok(winner)
    }
}

/// Newer write wins; ties and missing timestamps go to remote
pub fn last_write_wins<'a>(local: &'a Value, remote: &'a Value) -> &'a Value {
    match (updated_at(local), updated_at(remote)) {
        (Some(l), Some(r)) if l > r => local,
        _ => remote,
    }
}

/// Older write wins; ties and missing timestamps go to remote
pub fn first_write_wins<'a>(local: &'a Value, remote: &'a Value) -> &'a Value {
    match (updated_at(local), updated_at(remote)) {
        (Some(l), Some(r)) if l < r => local,
        _ => remote,
    }
}

/// `updatedAt` in epoch milliseconds
pub fn updated_at(item: &Value) -> Option<i64> {
    match item.get("updatedAt")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}
