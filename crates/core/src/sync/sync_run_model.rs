//! Sync run domain models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::SyncStats;
use crate::balances::MaterializationWindow;
use crate::errors::{Error, Result};

/// Lifecycle status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncRunStatus {
    /// Created, not started
    #[default]
    Pending,
    Syncing,
    Completed,
    Failed,
    /// Stopped by its cancellation token
    Cancelled,
}

impl SyncRunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SyncRunStatus::Completed | SyncRunStatus::Failed | SyncRunStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncRunStatus::Pending => "PENDING",
            SyncRunStatus::Syncing => "SYNCING",
            SyncRunStatus::Completed => "COMPLETED",
            SyncRunStatus::Failed => "FAILED",
            SyncRunStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(SyncRunStatus::Pending),
            "SYNCING" => Some(SyncRunStatus::Syncing),
            "COMPLETED" => Some(SyncRunStatus::Completed),
            "FAILED" => Some(SyncRunStatus::Failed),
            "CANCELLED" => Some(SyncRunStatus::Cancelled),
            _ => None,
        }
    }
}

/// What a sync run is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Syncable {
    Account(String),
    ProviderItem(String),
    Family(String),
}

impl Syncable {
    pub fn kind(&self) -> &'static str {
        match self {
            Syncable::Account(_) => "ACCOUNT",
            Syncable::ProviderItem(_) => "PROVIDER_ITEM",
            Syncable::Family(_) => "FAMILY",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Syncable::Account(id) | Syncable::ProviderItem(id) | Syncable::Family(id) => id,
        }
    }

    pub fn from_parts(kind: &str, id: String) -> Option<Self> {
        match kind {
            "ACCOUNT" => Some(Syncable::Account(id)),
            "PROVIDER_ITEM" => Some(Syncable::ProviderItem(id)),
            "FAMILY" => Some(Syncable::Family(id)),
            _ => None,
        }
    }
}

/// One unit of sync work. Created per request, mutated while it runs, marked
/// terminal exactly once and never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub id: String,
    pub family_id: String,
    pub syncable: Syncable,
    /// Run that scheduled this one (account runs spawned by an item run)
    pub parent_run_id: Option<String>,
    pub status: SyncRunStatus,
    /// Human-readable progress line
    pub status_text: Option<String>,
    pub sync_stats: SyncStats,
    pub window_start_date: Option<NaiveDate>,
    pub window_end_date: Option<NaiveDate>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SyncRun {
    pub fn new(family_id: String, syncable: Syncable, window: MaterializationWindow) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            family_id,
            syncable,
            parent_run_id: None,
            status: SyncRunStatus::Pending,
            status_text: None,
            sync_stats: SyncStats::default(),
            window_start_date: window.start,
            window_end_date: window.end,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    /// An account run scheduled by `parent`, inheriting its family.
    pub fn child_of(parent: &SyncRun, account_id: String, window: MaterializationWindow) -> Self {
        let mut run = Self::new(parent.family_id.clone(), Syncable::Account(account_id), window);
        run.parent_run_id = Some(parent.id.clone());
        run
    }

    pub fn with_stats(mut self, sync_stats: SyncStats) -> Self {
        self.sync_stats = sync_stats;
        self
    }

    pub fn window(&self) -> MaterializationWindow {
        MaterializationWindow::new(self.window_start_date, self.window_end_date)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.status != SyncRunStatus::Pending {
            return Err(Error::SyncState(format!(
                "Sync run {} cannot start from {}",
                self.id,
                self.status.as_str()
            )));
        }
        let now = Utc::now();
        self.status = SyncRunStatus::Syncing;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.finish(SyncRunStatus::Completed, None)
    }

    pub fn fail(&mut self, error: String) -> Result<()> {
        self.finish(SyncRunStatus::Failed, Some(error))
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.finish(SyncRunStatus::Cancelled, None)
    }

    fn finish(&mut self, status: SyncRunStatus, error: Option<String>) -> Result<()> {
        if self.is_terminal() {
            return Err(Error::SyncState(format!(
                "Sync run {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        let now = Utc::now();
        self.status = status;
        self.error = error;
        self.finished_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
