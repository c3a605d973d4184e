//! Structured progress and health counters for sync runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;

use super::{
    HealthStats, HoldingsStats, SetupStats, StatsSink, SyncErrorRecord, SyncStats,
    TransactionStats,
};
use crate::errors::{Error, Result};
use crate::ledger::{LedgerRepositoryTrait, UpsertSummary};
use crate::providers::ProviderAccount;

/// Builds stats deltas and merges them into a run through a [`StatsSink`].
///
/// Each method records one delta; nothing here reads or overwrites what other
/// phases recorded.
#[derive(Clone)]
pub struct SyncStatsCollector {
    sink: Arc<dyn StatsSink>,
    ledger_repository: Arc<dyn LedgerRepositoryTrait>,
}

impl SyncStatsCollector {
    pub fn new(sink: Arc<dyn StatsSink>, ledger_repository: Arc<dyn LedgerRepositoryTrait>) -> Self {
        Self {
            sink,
            ledger_repository,
        }
    }

    pub async fn set_status_text(&self, sync_run_id: &str, status_text: &str) -> Result<()> {
        debug!("Sync run {}: {}", sync_run_id, status_text);
        self.sink.update_status_text(sync_run_id, status_text).await
    }

    /// Records linked vs unlinked provider accounts.
    pub async fn collect_setup_stats(
        &self,
        sync_run_id: &str,
        provider_accounts: &[ProviderAccount],
    ) -> Result<SetupStats> {
        let linked = provider_accounts.iter().filter(|pa| pa.is_linked()).count();
        let setup = SetupStats {
            total: provider_accounts.len(),
            linked,
            unlinked: provider_accounts.len() - linked,
        };
        self.merge(
            sync_run_id,
            SyncStats {
                setup: Some(setup),
                ..SyncStats::default()
            },
        )
        .await?;
        Ok(setup)
    }

    /// Stamps the import start; later transaction counts are relative to it.
    pub async fn mark_import_started(&self, sync_run_id: &str) -> Result<DateTime<Utc>> {
        let started_at = Utc::now();
        self.merge(
            sync_run_id,
            SyncStats {
                import_started_at: Some(started_at),
                ..SyncStats::default()
            },
        )
        .await?;
        Ok(started_at)
    }

    /// Records transaction counts for one source tag.
    ///
    /// `created` comes from the ledger itself: entries with this source on
    /// these accounts created at or after `import_started_at`.
    pub async fn collect_transaction_stats(
        &self,
        sync_run_id: &str,
        source: &str,
        account_ids: &[String],
        import_started_at: DateTime<Utc>,
        upserted: UpsertSummary,
        skipped: usize,
    ) -> Result<TransactionStats> {
        let created =
            self.ledger_repository
                .count_created_since(account_ids, source, import_started_at)?;
        let stats = TransactionStats {
            seen: upserted.total() + skipped,
            created,
            updated: upserted.updated,
            skipped,
        };
        self.merge(
            sync_run_id,
            SyncStats {
                transactions: BTreeMap::from([(source.to_string(), stats)]),
                ..SyncStats::default()
            },
        )
        .await?;
        Ok(stats)
    }

    pub async fn collect_holdings_stats(
        &self,
        sync_run_id: &str,
        label: &str,
        processed: usize,
    ) -> Result<()> {
        self.merge(
            sync_run_id,
            SyncStats {
                holdings: BTreeMap::from([(label.to_string(), HoldingsStats { processed })]),
                ..SyncStats::default()
            },
        )
        .await
        .map(|_| ())
    }

    /// Records the run's health. An empty slice means a clean run.
    pub async fn collect_health_stats(
        &self,
        sync_run_id: &str,
        errors: &[SyncErrorRecord],
    ) -> Result<()> {
        self.merge(
            sync_run_id,
            SyncStats {
                health: Some(HealthStats {
                    error_count: errors.len(),
                }),
                errors: errors.to_vec(),
                ..SyncStats::default()
            },
        )
        .await
        .map(|_| ())
    }

    /// Records a phase-fatal failure unless the run already carries one.
    ///
    /// Returns whether the failure was recorded. The first error wins: later
    /// failures of the same run are usually consequences of it.
    pub async fn record_failure(&self, sync_run_id: &str, error: &Error) -> Result<bool> {
        let stored = self.sink.load_stats(sync_run_id)?;
        if let Some(first) = stored.first_error() {
            debug!(
                "Sync run {} already failed with \"{}\"; not recording: {}",
                sync_run_id, first.message, error
            );
            return Ok(false);
        }
        self.collect_health_stats(sync_run_id, &[SyncErrorRecord::from_error(error)])
            .await?;
        Ok(true)
    }

    async fn merge(&self, sync_run_id: &str, delta: SyncStats) -> Result<SyncStats> {
        self.sink.merge_stats(sync_run_id, delta).await
    }
}
