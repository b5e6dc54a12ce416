use super::{pending_indices, Adopt, StrategyKind, SyncContext, SyncStrategy, Tally};
use crate::sync::errors::SyncOpResult;
use crate::sync::item::SyncableItem;
use crate::sync::status::SyncResult;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

/// One request per fixed-size group of pending items
pub struct BatchStrategy;

#[async_trait]
impl SyncStrategy for BatchStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Batch
    }

    async fn execute(&self, items: &mut [SyncableItem], ctx: &SyncContext<'_>) -> SyncOpResult<SyncResult> {
        let mut tally = Tally::default();
        let pending = pending_indices(items);

        for (batch_no, group) in pending.chunks(ctx.settings.batch_size.max(1)).enumerate() {
            let bodies: Vec<Value> = group.iter().map(|&i| items[i].request_body()).collect();

            match ctx.endpoint.push_batch(&bodies).await {
                Ok(response) => {
                    for (position, &index) in group.iter().enumerate() {
                        let item = &mut items[index];
                        match response.result_for(position) {
                            Some(entry) if entry.success => {
                                let outcome = ctx
                                    .settle(item, entry.data.clone(), Adopt::LocalFields, entry.conflict)
                                    .await;
                                tally.settled(item, outcome);
                            }
                            Some(_) => tally.failed(item),
                            None => {
                                debug!(item = ?item.id(), "no result for item in batch response");
                                tally.failed(item);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        collection = ctx.collection_key,
                        batch = batch_no,
                        size = group.len(),
                        "batch request failed: {}",
                        e
                    );
                    for &index in group {
                        tally.failed(&mut items[index]);
                    }
                }
            }

            ctx.checkpoint.persist(items).await?;
        }

        Ok(tally.result)
    }
}
