//! Progress reporting for sync jobs.
//!
//! The runner reports run starts, phase changes and terminal states here so
//! a host process can surface them (logs, a UI channel, SSE).

use serde::{Deserialize, Serialize};

use ledgersync_core::sync::{SyncRun, SyncRunStatus};

/// Payload for sync progress events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncProgressPayload {
    pub sync_run_id: String,
    /// Kind of the synced thing (`PROVIDER_ITEM`, `ACCOUNT`)
    pub syncable_type: String,
    pub syncable_id: String,
    pub status: SyncRunStatus,
    /// Accounts handed to balance recompute so far
    pub accounts_scheduled: usize,
    pub message: Option<String>,
}

impl SyncProgressPayload {
    pub fn new(sync_run: &SyncRun) -> Self {
        Self {
            sync_run_id: sync_run.id.clone(),
            syncable_type: sync_run.syncable.kind().to_string(),
            syncable_id: sync_run.syncable.id().to_string(),
            status: sync_run.status,
            accounts_scheduled: 0,
            message: sync_run.error.clone(),
        }
    }

    pub fn with_accounts_scheduled(mut self, count: usize) -> Self {
        self.accounts_scheduled = count;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Receives sync progress.
///
/// Calls happen inline on the sync task, so implementations must not block.
pub trait SyncProgressReporter: Send + Sync {
    fn report_progress(&self, payload: SyncProgressPayload);

    fn report_sync_start(&self, sync_run: &SyncRun);

    /// Called once per run, whatever its terminal status.
    fn report_sync_complete(&self, sync_run: &SyncRun);
}

/// A no-op progress reporter for contexts where progress reporting is not needed.
#[derive(Debug, Clone, Default)]
pub struct NoOpProgressReporter;

impl SyncProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _payload: SyncProgressPayload) {}

    fn report_sync_start(&self, _sync_run: &SyncRun) {}

    fn report_sync_complete(&self, _sync_run: &SyncRun) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_core::balances::MaterializationWindow;
    use ledgersync_core::sync::Syncable;

    #[test]
    fn test_payload_from_run() {
        let mut run = SyncRun::new(
            "family-1".to_string(),
            Syncable::ProviderItem("item-1".to_string()),
            MaterializationWindow::full(),
        );
        run.start().unwrap();

        let payload = SyncProgressPayload::new(&run)
            .with_accounts_scheduled(3)
            .with_message("Processing transactions...");

        assert_eq!(payload.syncable_type, "PROVIDER_ITEM");
        assert_eq!(payload.syncable_id, "item-1");
        assert_eq!(payload.status, SyncRunStatus::Syncing);
        assert_eq!(payload.accounts_scheduled, 3);
        assert_eq!(payload.message.as_deref(), Some("Processing transactions..."));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["syncRunId"], run.id.as_str());
        assert_eq!(json["status"], "SYNCING");
    }
}
