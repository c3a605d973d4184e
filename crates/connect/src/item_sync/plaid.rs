//! Plaid items: cursor-paged transaction sync.

use async_trait::async_trait;

use super::{CursorFetchPlan, ItemSyncOutcome, ItemSyncPipeline, ProviderItemSyncOrchestrator};
use crate::SyncConfig;
use ledgersync_core::errors::{Error, Result};
use ledgersync_core::providers::{ProviderItem, ProviderKind};
use ledgersync_core::sync::{CancellationToken, SyncContext, SyncRun};

pub struct PlaidItemSyncer {
    pipeline: ItemSyncPipeline,
    plan: CursorFetchPlan,
}

impl PlaidItemSyncer {
    pub fn new(pipeline: ItemSyncPipeline, config: &SyncConfig) -> Self {
        Self {
            pipeline: pipeline.with_gateway_timeout(config.gateway_timeout),
            plan: CursorFetchPlan,
        }
    }
}

#[async_trait]
impl ProviderItemSyncOrchestrator for PlaidItemSyncer {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Plaid
    }

    async fn perform_sync(
        &self,
        context: &SyncContext,
        item: &ProviderItem,
        sync_run: &SyncRun,
        cancellation: &CancellationToken,
    ) -> Result<ItemSyncOutcome> {
        if item.kind != ProviderKind::Plaid {
            return Err(Error::SyncState(format!(
                "Provider item {} is a {} item, not plaid",
                item.id, item.kind
            )));
        }
        self.pipeline
            .run(&self.plan, context, item, sync_run, cancellation)
            .await
    }
}
