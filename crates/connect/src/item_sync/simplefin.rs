//! SimpleFin items: date-windowed fetches with a lookback.

use async_trait::async_trait;

use super::{
    DateWindowFetchPlan, ItemSyncOutcome, ItemSyncPipeline, ProviderItemSyncOrchestrator,
};
use crate::SyncConfig;
use ledgersync_core::errors::{Error, Result};
use ledgersync_core::providers::{ProviderItem, ProviderKind};
use ledgersync_core::sync::{CancellationToken, SyncContext, SyncRun};

/// SimpleFin has no cursor: each sync asks for `[last synced - lookback,
/// today]`, or for the initial history on the first sync, and remembers
/// `today` as the new last synced date.
pub struct SimpleFinItemSyncer {
    pipeline: ItemSyncPipeline,
    plan: DateWindowFetchPlan,
}

impl SimpleFinItemSyncer {
    pub fn new(pipeline: ItemSyncPipeline, config: &SyncConfig) -> Self {
        Self {
            pipeline: pipeline.with_gateway_timeout(config.gateway_timeout),
            plan: DateWindowFetchPlan::new(
                config.simplefin_lookback_days,
                config.initial_history_days,
            ),
        }
    }
}

#[async_trait]
impl ProviderItemSyncOrchestrator for SimpleFinItemSyncer {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SimpleFin
    }

    async fn perform_sync(
        &self,
        context: &SyncContext,
        item: &ProviderItem,
        sync_run: &SyncRun,
        cancellation: &CancellationToken,
    ) -> Result<ItemSyncOutcome> {
        if item.kind != ProviderKind::SimpleFin {
            return Err(Error::SyncState(format!(
                "Provider item {} is a {} item, not simplefin",
                item.id, item.kind
            )));
        }
        self.pipeline
            .run(&self.plan, context, item, sync_run, cancellation)
            .await
    }
}
