//! Persistence contracts for sync runs.

use async_trait::async_trait;

use super::{SyncRun, SyncStats};
use crate::errors::Result;

/// Write capability for a run's progress fields.
///
/// Kept apart from [`SyncRunRepositoryTrait`] so stats producers only see the
/// operations they need.
#[async_trait]
pub trait StatsSink: Send + Sync {
    /// Adds `delta` to the run's stored stats (see `SyncStats::merge`) and
    /// returns the merged value. The read-merge-write happens in one
    /// transaction.
    async fn merge_stats(&self, sync_run_id: &str, delta: SyncStats) -> Result<SyncStats>;

    async fn update_status_text(&self, sync_run_id: &str, status_text: &str) -> Result<()>;

    /// The run's stats as currently stored.
    fn load_stats(&self, sync_run_id: &str) -> Result<SyncStats>;
}

#[async_trait]
pub trait SyncRunRepositoryTrait: StatsSink {
    async fn create(&self, sync_run: SyncRun) -> Result<SyncRun>;

    /// Persists status, error and timestamps. Stats are left untouched; they
    /// only change through `merge_stats`.
    async fn update(&self, sync_run: SyncRun) -> Result<SyncRun>;

    fn get_by_id(&self, sync_run_id: &str) -> Result<SyncRun>;

    fn list_children(&self, parent_run_id: &str) -> Result<Vec<SyncRun>>;

    /// Most recent runs of a family, newest first.
    fn list_recent(&self, family_id: &str, limit: i64) -> Result<Vec<SyncRun>>;
}
