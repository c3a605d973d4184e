//! Database model for sync runs.

use diesel::prelude::*;

use ledgersync_core::errors::{Error, Result, ValidationError};
use ledgersync_core::sync::{SyncRun, SyncRunStatus, SyncStats, Syncable};

use crate::utils::{
    format_date, format_timestamp, parse_optional_date, parse_optional_timestamp, parse_timestamp,
};

/// Stats live in one JSON column and are only written through
/// `merge_stats`, never through the changeset.
#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_runs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncRunDB {
    pub id: String,
    pub family_id: String,
    pub syncable_type: String,
    pub syncable_id: String,
    pub parent_run_id: Option<String>,
    pub status: String,
    pub status_text: Option<String>,
    pub sync_stats: String,
    pub window_start_date: Option<String>,
    pub window_end_date: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub updated_at: String,
}

/// Columns `SyncRunRepository::update` may touch.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_runs)]
#[diesel(treat_none_as_null = true)]
pub struct SyncRunChangeset {
    pub status: String,
    pub status_text: Option<String>,
    pub window_start_date: Option<String>,
    pub window_end_date: Option<String>,
    pub error: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub updated_at: String,
}

impl TryFrom<&SyncRun> for SyncRunDB {
    type Error = Error;

    fn try_from(run: &SyncRun) -> Result<Self> {
        Ok(Self {
            id: run.id.clone(),
            family_id: run.family_id.clone(),
            syncable_type: run.syncable.kind().to_string(),
            syncable_id: run.syncable.id().to_string(),
            parent_run_id: run.parent_run_id.clone(),
            status: run.status.as_str().to_string(),
            status_text: run.status_text.clone(),
            sync_stats: serde_json::to_string(&run.sync_stats)?,
            window_start_date: run.window_start_date.map(format_date),
            window_end_date: run.window_end_date.map(format_date),
            error: run.error.clone(),
            created_at: format_timestamp(run.created_at),
            started_at: run.started_at.map(format_timestamp),
            finished_at: run.finished_at.map(format_timestamp),
            updated_at: format_timestamp(run.updated_at),
        })
    }
}

impl From<&SyncRun> for SyncRunChangeset {
    fn from(run: &SyncRun) -> Self {
        Self {
            status: run.status.as_str().to_string(),
            status_text: run.status_text.clone(),
            window_start_date: run.window_start_date.map(format_date),
            window_end_date: run.window_end_date.map(format_date),
            error: run.error.clone(),
            started_at: run.started_at.map(format_timestamp),
            finished_at: run.finished_at.map(format_timestamp),
            updated_at: format_timestamp(run.updated_at),
        }
    }
}

pub(crate) fn parse_stats(value: &str) -> Result<SyncStats> {
    Ok(serde_json::from_str(value)?)
}

impl TryFrom<SyncRunDB> for SyncRun {
    type Error = Error;

    fn try_from(db: SyncRunDB) -> Result<Self> {
        let status = SyncRunStatus::parse(&db.status).ok_or_else(|| {
            Error::Validation(ValidationError::InvalidInput(format!(
                "Unknown sync run status '{}'",
                db.status
            )))
        })?;
        let syncable =
            Syncable::from_parts(&db.syncable_type, db.syncable_id.clone()).ok_or_else(|| {
                Error::Validation(ValidationError::InvalidInput(format!(
                    "Unknown syncable type '{}'",
                    db.syncable_type
                )))
            })?;

        Ok(Self {
            syncable,
            status,
            sync_stats: parse_stats(&db.sync_stats)?,
            window_start_date: parse_optional_date(db.window_start_date.as_deref())?,
            window_end_date: parse_optional_date(db.window_end_date.as_deref())?,
            created_at: parse_timestamp(&db.created_at)?,
            started_at: parse_optional_timestamp(db.started_at.as_deref())?,
            finished_at: parse_optional_timestamp(db.finished_at.as_deref())?,
            updated_at: parse_timestamp(&db.updated_at)?,
            id: db.id,
            family_id: db.family_id,
            parent_run_id: db.parent_run_id,
            status_text: db.status_text,
            error: db.error,
        })
    }
}
