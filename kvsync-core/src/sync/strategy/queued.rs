use super::{pending_indices, Adopt, StrategyKind, SyncContext, SyncStrategy, Tally};
use crate::sync::errors::SyncOpResult;
use crate::sync::item::SyncableItem;
use crate::sync::status::SyncResult;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Sends items one by one in fixed-size groups, honouring max_retries
///
/// Exhausted items are counted failed and skipped until reset.
pub struct QueuedStrategy;

#[async_trait]
impl SyncStrategy for QueuedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Queued
    }

    async fn execute(&self, items: &mut [SyncableItem], ctx: &SyncContext<'_>) -> SyncOpResult<SyncResult> {
        let mut tally = Tally::default();
        let settings = ctx.settings;
        let pending = pending_indices(items);

        for group in pending.chunks(settings.batch_size.max(1)) {
            for &index in group {
                let item = &mut items[index];
                if item.is_exhausted(settings.max_retries) {
                    tally.exhausted();
                    continue;
                }

                if item.sync_attempts > 0 && !settings.retry_delay.is_zero() {
                    debug!(item = ?item.id(), attempt = item.sync_attempts + 1, "waiting before retry");
                    tokio::time::sleep(settings.retry_delay).await;
                }

                match ctx.endpoint.push_item(&item.request_body()).await {
                    Ok(server) => {
                        let outcome = ctx.settle(item, Some(server), Adopt::LocalFields, false).await;
                        tally.settled(item, outcome);
                    }
                    Err(e) => {
                        warn!(
                            collection = ctx.collection_key,
                            item = ?item.id(),
                            attempts = item.sync_attempts + 1,
                            "sync request failed: {}",
                            e
                        );
                        tally.failed(item);
                    }
                }
            }
            ctx.checkpoint.persist(items).await?;
        }

        Ok(tally.result)
    }
}
