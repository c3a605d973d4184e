//! Sync job runner.
//!
//! Owns the run lifecycle: creates each [`SyncRun`], hands it to the right
//! orchestrator, makes the terminal transition, then fans out the account
//! syncs an item sync scheduled.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::item_sync::{ItemSyncOutcome, ProviderItemSyncOrchestrator};
use crate::progress::{NoOpProgressReporter, SyncProgressPayload, SyncProgressReporter};
use ledgersync_core::accounts::AccountRepositoryTrait;
use ledgersync_core::balances::MaterializationWindow;
use ledgersync_core::errors::Result;
use ledgersync_core::events::{DomainEvent, DomainEventSink, NoOpDomainEventSink};
use ledgersync_core::providers::{
    ProviderItem, ProviderItemRepositoryTrait, ProviderItemStatus, ProviderKind,
};
use ledgersync_core::sync::{
    AccountLockRegistry, AccountSyncOrchestrator, AccountSyncQueue, CancellationToken,
    SyncContext, SyncRun, SyncRunRepositoryTrait, SyncRunStatus, SyncStats, Syncable,
};

/// Options for one provider item sync.
#[derive(Debug, Clone, Default)]
pub struct ItemSyncRequest {
    /// Bounds the balance recompute of affected accounts
    pub window: MaterializationWindow,
    /// Refresh balances and account metadata only
    pub balances_only: bool,
    pub cancellation: CancellationToken,
}

impl ItemSyncRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, window: MaterializationWindow) -> Self {
        self.window = window;
        self
    }

    pub fn balances_only(mut self) -> Self {
        self.balances_only = true;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// Final state of an item sync and the account syncs it spawned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSyncReport {
    pub sync_run: SyncRun,
    /// `None` when the item was skipped or its sync failed
    pub outcome: Option<ItemSyncOutcome>,
    pub account_runs: Vec<SyncRun>,
}

/// Why a sync had nothing to do.
type Skip = String;

/// Drives sync runs end to end.
///
/// Failures of the synced work end up on the run (status `Failed` and the
/// error text); `Err` is only returned when the run record itself cannot be
/// read or written.
pub struct SyncJobRunner {
    orchestrators: HashMap<ProviderKind, Arc<dyn ProviderItemSyncOrchestrator>>,
    account_sync: Arc<AccountSyncOrchestrator>,
    provider_items: Arc<dyn ProviderItemRepositoryTrait>,
    accounts: Arc<dyn AccountRepositoryTrait>,
    sync_runs: Arc<dyn SyncRunRepositoryTrait>,
    queue: Arc<AccountSyncQueue>,
    locks: AccountLockRegistry,
    event_sink: Arc<dyn DomainEventSink>,
    progress: Arc<dyn SyncProgressReporter>,
}

impl SyncJobRunner {
    /// `queue` must be the scheduler the registered item orchestrators
    /// write to.
    pub fn new(
        account_sync: Arc<AccountSyncOrchestrator>,
        provider_items: Arc<dyn ProviderItemRepositoryTrait>,
        accounts: Arc<dyn AccountRepositoryTrait>,
        sync_runs: Arc<dyn SyncRunRepositoryTrait>,
        queue: Arc<AccountSyncQueue>,
    ) -> Self {
        Self {
            orchestrators: HashMap::new(),
            account_sync,
            provider_items,
            accounts,
            sync_runs,
            queue,
            locks: AccountLockRegistry::new(),
            event_sink: Arc::new(NoOpDomainEventSink),
            progress: Arc::new(NoOpProgressReporter),
        }
    }

    /// Registers the orchestrator for its provider kind, replacing any
    /// earlier one.
    pub fn register(mut self, orchestrator: Arc<dyn ProviderItemSyncOrchestrator>) -> Self {
        self.orchestrators.insert(orchestrator.kind(), orchestrator);
        self
    }

    pub fn with_event_sink(mut self, event_sink: Arc<dyn DomainEventSink>) -> Self {
        self.event_sink = event_sink;
        self
    }

    pub fn with_progress_reporter(mut self, progress: Arc<dyn SyncProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn lock_registry(&self) -> &AccountLockRegistry {
        &self.locks
    }

    /// Syncs one provider item, then recomputes balances of every account it
    /// scheduled, each in a child run.
    pub async fn sync_provider_item(
        &self,
        context: &SyncContext,
        item_id: &str,
        request: ItemSyncRequest,
    ) -> Result<ItemSyncReport> {
        let stats = if request.balances_only {
            SyncStats::balances_only()
        } else {
            SyncStats::default()
        };
        let run = SyncRun::new(
            context.family_id.clone(),
            Syncable::ProviderItem(item_id.to_string()),
            request.window,
        )
        .with_stats(stats);
        let run = self.begin(run).await?;

        let (item, orchestrator) = match self.resolve_item(context, item_id) {
            Ok(Ok(found)) => found,
            Ok(Err(reason)) => {
                let sync_run = self.finish_nothing_to_do(&run.id, &reason).await?;
                return Ok(ItemSyncReport {
                    sync_run,
                    outcome: None,
                    account_runs: Vec::new(),
                });
            }
            Err(e) => {
                let sync_run = self.finish(&run.id, Err(e)).await?;
                return Ok(ItemSyncReport {
                    sync_run,
                    outcome: None,
                    account_runs: Vec::new(),
                });
            }
        };

        info!(
            "Syncing provider item {} ({}) in run {}",
            item.id, item.kind, run.id
        );
        let (outcome, result) = match orchestrator
            .perform_sync(context, &item, &run, &request.cancellation)
            .await
        {
            Ok(outcome) => (Some(outcome), Ok(())),
            Err(e) => (None, Err(e)),
        };
        let sync_run = match self.finish(&run.id, result).await {
            Ok(sync_run) => sync_run,
            Err(e) => {
                let dropped = self.queue.drain_for_parent(&run.id);
                if !dropped.is_empty() {
                    warn!(
                        "Dropping {} scheduled account syncs of run {}: {}",
                        dropped.len(),
                        run.id,
                        e
                    );
                }
                return Err(e);
            }
        };
        orchestrator.perform_post_sync(context).await;

        let account_runs = self
            .run_scheduled_account_syncs(context, &sync_run, &request.cancellation)
            .await;
        if !account_runs.is_empty() {
            self.account_sync.perform_post_sync(context).await;
        }

        Ok(ItemSyncReport {
            sync_run,
            outcome,
            account_runs,
        })
    }

    /// Recomputes one account's balances outside any item sync.
    pub async fn sync_account(
        &self,
        context: &SyncContext,
        account_id: &str,
        window: MaterializationWindow,
    ) -> Result<SyncRun> {
        self.sync_account_with_cancellation(context, account_id, window, &CancellationToken::new())
            .await
    }

    pub async fn sync_account_with_cancellation(
        &self,
        context: &SyncContext,
        account_id: &str,
        window: MaterializationWindow,
        cancellation: &CancellationToken,
    ) -> Result<SyncRun> {
        let run = SyncRun::new(
            context.family_id.clone(),
            Syncable::Account(account_id.to_string()),
            window,
        );
        let run = self.run_account_sync(context, run, cancellation).await?;
        if run.status == SyncRunStatus::Completed {
            self.account_sync.perform_post_sync(context).await;
        }
        Ok(run)
    }

    /// Finds the item and its orchestrator. The inner `Err` is a reason to
    /// skip, not a failure.
    #[allow(clippy::type_complexity)]
    fn resolve_item(
        &self,
        context: &SyncContext,
        item_id: &str,
    ) -> Result<std::result::Result<(ProviderItem, Arc<dyn ProviderItemSyncOrchestrator>), Skip>>
    {
        let item = match self.provider_items.get_item(item_id) {
            Ok(item) => item,
            Err(e) if e.is_not_found() => {
                return Ok(Err(format!("provider item {} not found", item_id)))
            }
            Err(e) => return Err(e),
        };
        if item.family_id != context.family_id {
            return Ok(Err(format!(
                "provider item {} belongs to another family",
                item_id
            )));
        }
        if item.status == ProviderItemStatus::Disconnected {
            return Ok(Err(format!("provider item {} is disconnected", item_id)));
        }
        match self.orchestrators.get(&item.kind) {
            Some(orchestrator) => Ok(Ok((item, Arc::clone(orchestrator)))),
            None => Ok(Err(format!("no sync registered for {} items", item.kind))),
        }
    }

    async fn run_scheduled_account_syncs(
        &self,
        context: &SyncContext,
        parent: &SyncRun,
        cancellation: &CancellationToken,
    ) -> Vec<SyncRun> {
        let scheduled = self.queue.drain_for_parent(&parent.id);
        if scheduled.is_empty() {
            return Vec::new();
        }
        self.progress.report_progress(
            SyncProgressPayload::new(parent)
                .with_accounts_scheduled(scheduled.len())
                .with_message("Recomputing account balances..."),
        );

        let mut runs = Vec::with_capacity(scheduled.len());
        for scheduled_sync in scheduled {
            let child = SyncRun::child_of(
                parent,
                scheduled_sync.account_id.clone(),
                scheduled_sync.window,
            );
            match self.run_account_sync(context, child, cancellation).await {
                Ok(run) => runs.push(run),
                Err(e) => error!(
                    "Could not record account sync for {} (parent run {}): {}",
                    scheduled_sync.account_id, parent.id, e
                ),
            }
        }
        runs
    }

    async fn run_account_sync(
        &self,
        context: &SyncContext,
        run: SyncRun,
        cancellation: &CancellationToken,
    ) -> Result<SyncRun> {
        let run = self.begin(run).await?;
        let account_id = run.syncable.id().to_string();

        let _guard = self.locks.lock(&account_id).await;
        debug!("Holding lock for account {} (run {})", account_id, run.id);

        // Loaded under the lock so the materializer sees the latest anchors.
        let account = match self.accounts.get_by_id(&account_id) {
            Ok(account) if account.family_id == context.family_id => account,
            Ok(_) => {
                return self
                    .finish_nothing_to_do(
                        &run.id,
                        &format!("account {} belongs to another family", account_id),
                    )
                    .await
            }
            Err(e) if e.is_not_found() => {
                return self
                    .finish_nothing_to_do(&run.id, &format!("account {} not found", account_id))
                    .await
            }
            Err(e) => return self.finish(&run.id, Err(e)).await,
        };

        let result = self
            .account_sync
            .perform_sync(context, &account, &run, cancellation)
            .await;
        self.finish(&run.id, result.map(|_| ())).await
    }

    async fn begin(&self, run: SyncRun) -> Result<SyncRun> {
        let mut run = self.sync_runs.create(run).await?;
        run.start()?;
        let run = self.sync_runs.update(run).await?;
        self.progress.report_sync_start(&run);
        Ok(run)
    }

    async fn finish_nothing_to_do(&self, sync_run_id: &str, reason: &str) -> Result<SyncRun> {
        info!("Sync run {}: nothing to do ({})", sync_run_id, reason);
        self.sync_runs
            .update_status_text(sync_run_id, &format!("Nothing to do: {}", reason))
            .await?;
        self.finish(sync_run_id, Ok(())).await
    }

    /// Makes the terminal transition. Reloads first so status text and stats
    /// written during the run are kept.
    async fn finish(&self, sync_run_id: &str, result: Result<()>) -> Result<SyncRun> {
        let mut run = self.sync_runs.get_by_id(sync_run_id)?;
        match result {
            Ok(()) => run.complete()?,
            Err(e) if e.is_cancelled() => {
                warn!("Sync run {} cancelled: {}", run.id, e);
                run.cancel()?;
            }
            Err(e) => {
                error!("Sync run {} failed: {}", run.id, e);
                run.fail(e.to_string())?;
            }
        }
        let run = self.sync_runs.update(run).await?;
        info!(
            "Sync run {} ({} {}) finished: {}",
            run.id,
            run.syncable.kind(),
            run.syncable.id(),
            run.status.as_str()
        );
        self.event_sink
            .emit(DomainEvent::sync_run_finished(run.id.clone(), run.status));
        self.progress.report_sync_complete(&run);
        Ok(run)
    }
}
