use super::{pending_indices, Adopt, StrategyKind, SyncContext, SyncStrategy, Tally};
use crate::sync::errors::SyncOpResult;
use crate::sync::item::SyncableItem;
use crate::sync::status::SyncResult;
use async_trait::async_trait;
use tracing::warn;

/// Sends each pending item on its own, once per pass
pub struct ImmediateStrategy;

#[async_trait]
impl SyncStrategy for ImmediateStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Immediate
    }

    async fn execute(&self, items: &mut [SyncableItem], ctx: &SyncContext<'_>) -> SyncOpResult<SyncResult> {
        let mut tally = Tally::default();

        for index in pending_indices(items) {
            let item = &mut items[index];
            match ctx.endpoint.push_item(&item.request_body()).await {
                Ok(server) => {
                    let outcome = ctx.settle(item, Some(server), Adopt::ServerFields, false).await;
                    tally.settled(item, outcome);
                }
                Err(e) => {
                    warn!(collection = ctx.collection_key, item = ?item.id(), "sync request failed: {}", e);
                    tally.failed(item);
                }
            }
        }

        ctx.checkpoint.persist(items).await?;
        Ok(tally.result)
    }
}
