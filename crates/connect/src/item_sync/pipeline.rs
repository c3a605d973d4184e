//! The phase sequence shared by every provider.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};

use super::{FetchPlan, ItemSyncOutcome};
use ledgersync_core::accounts::AccountRepositoryTrait;
use ledgersync_core::constants::DEFAULT_HOLDINGS_LABEL;
use ledgersync_core::errors::{Error, ProviderError, Result};
use ledgersync_core::events::{DomainEvent, DomainEventSink, NoOpDomainEventSink};
use ledgersync_core::ledger::{dedupe_by_external_id, LedgerRepositoryTrait, UpsertSummary};
use ledgersync_core::providers::{
    match_unlinked_accounts, partition_raw_transactions, FetchRequest, ProviderAccount,
    ProviderCheckpoint, ProviderGateway, ProviderItem, ProviderItemRepositoryTrait,
    ProviderItemStatus, ProviderPayload, TransactionNormalizer,
};
use ledgersync_core::sync::{
    AccountSyncScheduler, CancellationToken, SyncContext, SyncRun, SyncStatsCollector,
};
use ledgersync_core::utils::clock::{Clock, SystemClock};

/// Per-account result of the processing phase.
#[derive(Debug, Default)]
struct ProcessedAccount {
    account_id: String,
    upserted: UpsertSummary,
    skipped: usize,
    holdings: usize,
}

/// What the import phase hands to the later phases.
struct Imported {
    repaired_links: usize,
    /// Where the next fetch resumes; saved once the payload is in the ledger
    next_checkpoint: Option<ProviderCheckpoint>,
}

/// Runs one provider item through import, configuration check, processing,
/// recompute scheduling and stats.
///
/// The gateway and normalizer are provider specific; the [`FetchPlan`]
/// passed to [`run`](Self::run) decides how requests are paged. The
/// normalizer must tag entries with the item kind's source tag, since
/// transaction stats count entries by that tag.
pub struct ItemSyncPipeline {
    gateway: Arc<dyn ProviderGateway>,
    normalizer: Arc<dyn TransactionNormalizer>,
    provider_items: Arc<dyn ProviderItemRepositoryTrait>,
    accounts: Arc<dyn AccountRepositoryTrait>,
    ledger: Arc<dyn LedgerRepositoryTrait>,
    scheduler: Arc<dyn AccountSyncScheduler>,
    stats: SyncStatsCollector,
    event_sink: Arc<dyn DomainEventSink>,
    clock: Arc<dyn Clock>,
    gateway_timeout: Duration,
}

impl ItemSyncPipeline {
    pub fn new(
        gateway: Arc<dyn ProviderGateway>,
        normalizer: Arc<dyn TransactionNormalizer>,
        provider_items: Arc<dyn ProviderItemRepositoryTrait>,
        accounts: Arc<dyn AccountRepositoryTrait>,
        ledger: Arc<dyn LedgerRepositoryTrait>,
        scheduler: Arc<dyn AccountSyncScheduler>,
        stats: SyncStatsCollector,
    ) -> Self {
        Self {
            gateway,
            normalizer,
            provider_items,
            accounts,
            ledger,
            scheduler,
            stats,
            event_sink: Arc::new(NoOpDomainEventSink),
            clock: Arc::new(SystemClock),
            gateway_timeout: crate::SyncConfig::default().gateway_timeout,
        }
    }

    pub fn with_event_sink(mut self, event_sink: Arc<dyn DomainEventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    /// Runs every phase, recording the first failure on the run.
    ///
    /// Cancellation is returned as is and never recorded as a run error.
    pub async fn run(
        &self,
        plan: &dyn FetchPlan,
        context: &SyncContext,
        item: &ProviderItem,
        sync_run: &SyncRun,
        cancellation: &CancellationToken,
    ) -> Result<ItemSyncOutcome> {
        match self
            .run_phases(plan, context, item, sync_run, cancellation)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_cancelled() => {
                info!("Sync of provider item {} stopped: {}", item.id, e);
                Err(e)
            }
            Err(e) => {
                error!("Sync of provider item {} failed: {}", item.id, e);
                if let Err(stats_err) = self.stats.record_failure(&sync_run.id, &e).await {
                    warn!(
                        "Could not record failure on sync run {}: {}",
                        sync_run.id, stats_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        plan: &dyn FetchPlan,
        context: &SyncContext,
        item: &ProviderItem,
        sync_run: &SyncRun,
        cancellation: &CancellationToken,
    ) -> Result<ItemSyncOutcome> {
        let balances_only_requested = sync_run.sync_stats.balances_only;

        // Phase 1: import
        cancellation.checkpoint("import")?;
        self.stats
            .set_status_text(
                &sync_run.id,
                &format!("Importing accounts from {}...", item.kind),
            )
            .await?;
        let import_started_at = self.stats.mark_import_started(&sync_run.id).await?;
        let imported = self
            .import(plan, context, item, sync_run, balances_only_requested)
            .await?;

        // Phase 2: configuration check
        cancellation.checkpoint("configuration check")?;
        self.stats
            .set_status_text(&sync_run.id, "Checking account setup...")
            .await?;
        let provider_accounts = self.provider_items.list_provider_accounts(&item.id)?;
        let setup = self
            .stats
            .collect_setup_stats(&sync_run.id, &provider_accounts)
            .await?;
        self.provider_items
            .set_pending_account_setup(&item.id, setup.unlinked > 0)
            .await?;
        if setup.unlinked > 0 {
            info!(
                "Provider item {} has {} unlinked accounts",
                item.id, setup.unlinked
            );
            self.event_sink
                .emit(DomainEvent::provider_accounts_pending_setup(
                    item.id.clone(),
                    setup.unlinked,
                ));
        }

        let mut outcome = ItemSyncOutcome {
            provider_accounts: setup.total,
            linked_accounts: setup.linked,
            repaired_links: imported.repaired_links,
            ..ItemSyncOutcome::default()
        };

        // The checkpoint stays put on this path: nothing was turned into
        // ledger entries, so the next fetch must cover the same history.
        if balances_only_requested || setup.linked == 0 {
            info!(
                "Provider item {}: balances only (requested: {}, linked accounts: {})",
                item.id, balances_only_requested, setup.linked
            );
            self.stats.collect_health_stats(&sync_run.id, &[]).await?;
            outcome.balances_only = true;
            return Ok(outcome);
        }

        // Phase 3: process linked accounts, one at a time
        cancellation.checkpoint("transaction processing")?;
        self.stats
            .set_status_text(&sync_run.id, "Processing transactions...")
            .await?;
        let mut processed_ids: Vec<String> = Vec::new();
        let mut changed_ids: Vec<String> = Vec::new();
        for provider_account in provider_accounts.iter().filter(|pa| pa.is_linked()) {
            let Some(processed) = self.process_account(context, provider_account).await? else {
                continue;
            };
            if processed.upserted.inserted + processed.upserted.updated > 0 {
                changed_ids.push(processed.account_id.clone());
            }
            outcome.upserted.merge(processed.upserted);
            outcome.skipped_transactions += processed.skipped;
            outcome.holdings_processed += processed.holdings;
            processed_ids.push(processed.account_id);
        }
        if !changed_ids.is_empty() {
            self.event_sink.emit(DomainEvent::ledger_entries_changed(
                changed_ids,
                outcome.upserted.inserted,
                outcome.upserted.updated,
            ));
        }
        if let Some(checkpoint) = imported.next_checkpoint {
            debug!("Provider item {}: advancing to {:?}", item.id, checkpoint);
            self.provider_items
                .save_checkpoint(&item.id, checkpoint)
                .await?;
        }

        // Phase 4: hand affected accounts to balance recompute
        cancellation.checkpoint("balance recompute scheduling")?;
        self.stats
            .set_status_text(&sync_run.id, "Scheduling balance recompute...")
            .await?;
        let window = sync_run.window();
        for account_id in &processed_ids {
            self.scheduler.schedule(&sync_run.id, account_id, window);
        }
        outcome.scheduled_accounts = processed_ids;

        // Phase 5: stats
        cancellation.checkpoint("stats collection")?;
        self.stats
            .set_status_text(&sync_run.id, "Recording sync stats...")
            .await?;
        self.stats
            .collect_transaction_stats(
                &sync_run.id,
                item.kind.source_tag(),
                &outcome.scheduled_accounts,
                import_started_at,
                outcome.upserted,
                outcome.skipped_transactions,
            )
            .await?;
        self.stats
            .collect_holdings_stats(&sync_run.id, DEFAULT_HOLDINGS_LABEL, outcome.holdings_processed)
            .await?;
        self.stats.collect_health_stats(&sync_run.id, &[]).await?;
        self.provider_items.mark_synced(&item.id, Utc::now()).await?;

        info!(
            "Provider item {} synced: {} accounts, {} inserted, {} updated, {} skipped",
            item.id,
            outcome.scheduled_accounts.len(),
            outcome.upserted.inserted,
            outcome.upserted.updated,
            outcome.skipped_transactions
        );
        Ok(outcome)
    }

    /// Fetches and stores provider accounts, then repairs links. The next
    /// checkpoint is computed here but not saved.
    async fn import(
        &self,
        plan: &dyn FetchPlan,
        context: &SyncContext,
        item: &ProviderItem,
        sync_run: &SyncRun,
        balances_only: bool,
    ) -> Result<Imported> {
        let request = plan.fetch_request(item, sync_run.window(), self.clock.today(), balances_only);
        debug!("Fetching provider item {} with {:?}", item.id, request);

        let payload = match self.fetch(item, &request).await {
            Ok(payload) => payload,
            Err(e) => {
                if matches!(e, Error::Provider(ProviderError::AuthenticationRequired(_))) {
                    warn!("Provider item {} needs to be reconnected", item.id);
                    if let Err(status_err) = self
                        .provider_items
                        .update_status(&item.id, ProviderItemStatus::RequiresUpdate)
                        .await
                    {
                        warn!(
                            "Could not flag provider item {} for reconnection: {}",
                            item.id, status_err
                        );
                    }
                }
                return Err(e);
            }
        };

        if item.status == ProviderItemStatus::RequiresUpdate {
            self.provider_items
                .update_status(&item.id, ProviderItemStatus::Good)
                .await?;
        }

        for remote in &payload.accounts {
            self.provider_items
                .upsert_provider_account(&item.id, remote)
                .await?;
        }
        debug!(
            "Provider item {}: {} remote accounts imported",
            item.id,
            payload.accounts.len()
        );

        // A balances-only fetch does not cover transactions, so resuming
        // from it would skip them.
        let next_checkpoint = if balances_only {
            None
        } else {
            plan.next_checkpoint(&request, &payload)
        };

        Ok(Imported {
            repaired_links: self.repair_links(context, item).await?,
            next_checkpoint,
        })
    }

    async fn fetch(
        &self,
        item: &ProviderItem,
        request: &FetchRequest,
    ) -> Result<ProviderPayload> {
        match tokio::time::timeout(self.gateway_timeout, self.gateway.fetch(item, request)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: item.kind.to_string(),
                seconds: self.gateway_timeout.as_secs(),
            }
            .into()),
        }
    }

    async fn repair_links(&self, context: &SyncContext, item: &ProviderItem) -> Result<usize> {
        let provider_accounts = self.provider_items.list_provider_accounts(&item.id)?;
        if provider_accounts.iter().all(ProviderAccount::is_linked) {
            return Ok(0);
        }
        let accounts = self.accounts.list_by_family(&context.family_id, None)?;
        let links = match_unlinked_accounts(&provider_accounts, &accounts);
        for link in &links {
            let provider_account = self
                .provider_items
                .link_provider_account(&link.provider_account_id, Some(link.account_id.clone()))
                .await?;
            self.accounts
                .set_provider_link(
                    &link.account_id,
                    Some(provider_account.external_account_id.clone()),
                )
                .await?;
            info!(
                "Linked provider account {} to account {} by identifier",
                link.provider_account_id, link.account_id
            );
        }
        Ok(links.len())
    }

    async fn process_account(
        &self,
        context: &SyncContext,
        provider_account: &ProviderAccount,
    ) -> Result<Option<ProcessedAccount>> {
        let Some(account_id) = provider_account.account_id.as_deref() else {
            return Ok(None);
        };
        let account = self.accounts.get_by_id(account_id)?;
        if account.family_id != context.family_id || !account.is_active {
            warn!(
                "Skipping account {} fed by provider account {}: inactive or outside family {}",
                account.id, provider_account.id, context.family_id
            );
            return Ok(None);
        }

        let mut processed = ProcessedAccount {
            account_id: account.id.clone(),
            ..ProcessedAccount::default()
        };

        if let Some(raw) = &provider_account.raw_transactions_payload {
            let (valid, skipped) = partition_raw_transactions(raw);
            let entries = dedupe_by_external_id(self.normalizer.normalize(
                &valid,
                provider_account,
                &account,
            )?);
            if !entries.is_empty() {
                processed.upserted = self.ledger.upsert_entries(entries).await?;
            }
            processed.skipped = skipped;
        }

        if let Some(raw) = &provider_account.raw_holdings_payload {
            processed.holdings = self.normalizer.count_holdings(raw);
        }

        if let Some(anchor) = provider_account.reported_anchor() {
            self.accounts
                .update_reported_balance(&account.id, anchor)
                .await?;
        }

        debug!(
            "Account {}: {} inserted, {} updated, {} unchanged, {} skipped",
            account.id,
            processed.upserted.inserted,
            processed.upserted.updated,
            processed.upserted.unchanged,
            processed.skipped
        );
        Ok(Some(processed))
    }
}
