//! Background scheduler for periodic provider item sync.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::main_lib::WorkerState;
use ledgersync_connect::ItemSyncRequest;
use ledgersync_core::providers::ProviderItemStatus;
use ledgersync_core::sync::{CancellationToken, SyncContext, SyncRunStatus};

pub struct SchedulerSettings {
    pub initial_delay: Duration,
    pub sync_interval: Duration,
    pub run_deadline: Duration,
}

pub fn start_item_sync_scheduler(
    state: Arc<WorkerState>,
    settings: SchedulerSettings,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Item sync scheduler started ({}s interval)",
            settings.sync_interval.as_secs()
        );

        tokio::time::sleep(settings.initial_delay).await;

        // First tick is immediate
        let mut sync_interval = interval(settings.sync_interval);

        loop {
            sync_interval.tick().await;
            run_scheduled_sync(&state, settings.run_deadline).await;
        }
    })
}

/// Syncs every connected item that has a payload waiting.
async fn run_scheduled_sync(state: &WorkerState, run_deadline: Duration) {
    info!("Running scheduled item sync...");

    let items = match state.provider_items.list_items(None) {
        Ok(items) => items,
        Err(e) => {
            warn!("Scheduled sync skipped: cannot list provider items: {}", e);
            return;
        }
    };

    let mut synced = 0;
    for item in items {
        if item.status == ProviderItemStatus::Disconnected {
            continue;
        }
        if !state.gateway.has_payload(&item.id) {
            debug!("Nothing to do for item {}: no payload dropped", item.id);
            continue;
        }

        let context = SyncContext::new(item.family_id.clone());
        let request = ItemSyncRequest::new()
            .with_cancellation(CancellationToken::with_deadline_from_now(run_deadline));

        match state
            .runner
            .sync_provider_item(&context, &item.id, request)
            .await
        {
            Ok(report) if report.sync_run.status == SyncRunStatus::Completed => {
                synced += 1;
                let failed_accounts = report
                    .account_runs
                    .iter()
                    .filter(|run| run.status != SyncRunStatus::Completed)
                    .count();
                info!(
                    "Item {} synced: {} account recomputes, {} not completed",
                    item.id,
                    report.account_runs.len(),
                    failed_accounts
                );
            }
            Ok(report) => {
                warn!(
                    "Item {} sync ended {:?}: {}",
                    item.id,
                    report.sync_run.status,
                    report.sync_run.error.as_deref().unwrap_or("no error recorded")
                );
            }
            Err(e) => {
                warn!("Item {} sync could not be recorded: {}", item.id, e);
            }
        }
    }

    info!("Scheduled item sync finished: {} items synced", synced);
}
