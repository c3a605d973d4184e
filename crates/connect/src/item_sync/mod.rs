//! Provider item syncs: import, configuration check, processing, balance
//! recompute scheduling and stats, one implementation per provider kind.

mod fetch_plan;
mod pipeline;
mod plaid;
mod simplefin;

pub use fetch_plan::*;
pub use pipeline::*;
pub use plaid::*;
pub use simplefin::*;

#[cfg(test)]
mod pipeline_tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ledgersync_core::ledger::UpsertSummary;
use ledgersync_core::providers::{ProviderItem, ProviderKind};
use ledgersync_core::sync::{CancellationToken, SyncContext, SyncRun};
use ledgersync_core::Result;

/// What one item sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSyncOutcome {
    /// Processing was skipped (requested, or nothing is linked)
    pub balances_only: bool,
    pub provider_accounts: usize,
    pub linked_accounts: usize,
    /// Links established by identifier matching during import
    pub repaired_links: usize,
    pub upserted: UpsertSummary,
    pub skipped_transactions: usize,
    pub holdings_processed: usize,
    /// Accounts handed to balance recompute, in processing order
    pub scheduled_accounts: Vec<String>,
}

/// Syncs one provider item within a caller-owned run.
///
/// Implementations update the run's status text and stats as they go but
/// never its status; the caller makes the terminal transition from the
/// returned result.
#[async_trait]
pub trait ProviderItemSyncOrchestrator: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn perform_sync(
        &self,
        context: &SyncContext,
        item: &ProviderItem,
        sync_run: &SyncRun,
        cancellation: &CancellationToken,
    ) -> Result<ItemSyncOutcome>;

    /// Nothing runs after an item sync; follow-up work belongs to the
    /// account syncs it schedules.
    async fn perform_post_sync(&self, _context: &SyncContext) {}
}
