//! Per-account sync: market data, then balance materialization.

use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{CancellationToken, SyncContext, SyncRun, SyncStatsCollector};
use crate::accounts::Account;
use crate::balances::{BalanceMaterializer, MaterializationResult};
use crate::errors::Result;
use crate::market_data::{MarketDataImport, MarketDataImporter};
use crate::telemetry::ErrorReporter;
use crate::transfers::TransferMatcher;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSyncOutcome {
    /// `None` when the market data import failed and was skipped
    pub market_data: Option<MarketDataImport>,
    pub materialization: MaterializationResult,
}

/// Brings one account's derived data up to date.
///
/// Market data is supplementary: its failures are reported and swallowed.
/// Materialization is not: its failures are recorded on the run and returned.
/// Callers hold the account's lock for the duration of `perform_sync`.
pub struct AccountSyncOrchestrator {
    market_data_importer: Arc<dyn MarketDataImporter>,
    materializer: Arc<BalanceMaterializer>,
    transfer_matcher: Arc<dyn TransferMatcher>,
    error_reporter: Arc<dyn ErrorReporter>,
    stats: SyncStatsCollector,
}

impl AccountSyncOrchestrator {
    pub fn new(
        market_data_importer: Arc<dyn MarketDataImporter>,
        materializer: Arc<BalanceMaterializer>,
        transfer_matcher: Arc<dyn TransferMatcher>,
        error_reporter: Arc<dyn ErrorReporter>,
        stats: SyncStatsCollector,
    ) -> Self {
        Self {
            market_data_importer,
            materializer,
            transfer_matcher,
            error_reporter,
            stats,
        }
    }

    pub async fn perform_sync(
        &self,
        context: &SyncContext,
        account: &Account,
        sync_run: &SyncRun,
        cancellation: &CancellationToken,
    ) -> Result<AccountSyncOutcome> {
        cancellation.checkpoint("market data import")?;
        self.stats
            .set_status_text(&sync_run.id, "Importing market data...")
            .await?;
        let market_data = self.import_market_data(context, account).await;

        cancellation.checkpoint("balance materialization")?;
        self.stats
            .set_status_text(&sync_run.id, "Materializing balances...")
            .await?;

        let strategy = account.balance_strategy();
        match self
            .materializer
            .materialize(account, strategy, sync_run.window())
            .await
        {
            Ok(materialization) => {
                self.stats.collect_health_stats(&sync_run.id, &[]).await?;
                info!(
                    "Account {} synced ({} snapshots, balance {})",
                    account.id, materialization.snapshots_written, materialization.current_balance
                );
                Ok(AccountSyncOutcome {
                    market_data,
                    materialization,
                })
            }
            Err(e) => {
                if let Err(stats_err) = self.stats.record_failure(&sync_run.id, &e).await {
                    warn!(
                        "Could not record materialization failure on run {}: {}",
                        sync_run.id, stats_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Family-wide work that runs once after a batch of account syncs.
    ///
    /// Best effort: failures are reported and never returned.
    pub async fn perform_post_sync(&self, context: &SyncContext) {
        match self
            .transfer_matcher
            .auto_match_transfers(&context.family_id)
            .await
        {
            Ok(matched) if matched > 0 => {
                info!(
                    "Matched {} transfers for family {}",
                    matched, context.family_id
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "Transfer matching failed for family {}: {}",
                    context.family_id, e
                );
                self.error_reporter.report("transfer auto-matching", &e);
            }
        }
    }

    async fn import_market_data(
        &self,
        context: &SyncContext,
        account: &Account,
    ) -> Option<MarketDataImport> {
        match self.market_data_importer.import_all(account).await {
            Ok(import) => Some(import),
            Err(e) => {
                warn!(
                    "Market data import failed for account {} (family {}), continuing: {}",
                    account.id, context.family_id, e
                );
                self.error_reporter.report("market data import", &e);
                None
            }
        }
    }
}
