use crate::error::Result;
use crate::inventory::{self, Inventory, WorkItem};
use crate::reaper::{Outcome, Reaper};
use async_trait::async_trait;

/// What a polling scheduler drives.
///
/// The scheduler owns cadence, retries and the memory of what it has already
/// seen; it diffs successive inventories and hands new or changed series to
/// [`reap`](ReapTarget::reap).
#[async_trait]
pub trait ReapTarget: Send + Sync {
    async fn query_inventory(&self) -> Result<Inventory>;

    async fn reap(&self, item: &WorkItem) -> Outcome;
}

#[async_trait]
impl ReapTarget for Reaper {
    async fn query_inventory(&self) -> Result<Inventory> {
        inventory::query(self.remote.as_ref()).await
    }

    async fn reap(&self, item: &WorkItem) -> Outcome {
        self.reap_item(item).await
    }
}
