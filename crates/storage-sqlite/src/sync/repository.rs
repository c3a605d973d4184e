use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use ledgersync_core::errors::Result;
use ledgersync_core::sync::{StatsSink, SyncRun, SyncRunRepositoryTrait, SyncStats};

use super::model::{parse_stats, SyncRunChangeset, SyncRunDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::{not_found_as, IntoCore, StorageError};
use crate::schema::sync_runs;
use crate::utils::format_timestamp;

pub struct SyncRunRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncRunRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

fn load_run(conn: &mut SqliteConnection, sync_run_id: &str) -> Result<SyncRun> {
    sync_runs::table
        .find(sync_run_id)
        .select(SyncRunDB::as_select())
        .first::<SyncRunDB>(conn)
        .map_err(not_found_as("sync run", sync_run_id))?
        .try_into()
}

#[async_trait]
impl StatsSink for SyncRunRepository {
    async fn merge_stats(&self, sync_run_id: &str, delta: SyncStats) -> Result<SyncStats> {
        let sync_run_id = sync_run_id.to_string();
        // Read, merge and write inside one writer transaction so concurrent
        // deltas never overwrite each other.
        self.writer
            .exec(move |conn| {
                let stored: String = sync_runs::table
                    .find(&sync_run_id)
                    .select(sync_runs::sync_stats)
                    .first(conn)
                    .map_err(not_found_as("sync run", &sync_run_id))?;

                let merged = parse_stats(&stored)?.merged(&delta);
                diesel::update(sync_runs::table.find(&sync_run_id))
                    .set((
                        sync_runs::sync_stats.eq(serde_json::to_string(&merged)?),
                        sync_runs::updated_at.eq(format_timestamp(Utc::now())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(merged)
            })
            .await
    }

    async fn update_status_text(&self, sync_run_id: &str, status_text: &str) -> Result<()> {
        let sync_run_id = sync_run_id.to_string();
        let status_text = status_text.to_string();
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(sync_runs::table.find(&sync_run_id))
                    .set((
                        sync_runs::status_text.eq(Some(status_text)),
                        sync_runs::updated_at.eq(format_timestamp(Utc::now())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if affected == 0 {
                    return Err(not_found_as("sync run", &sync_run_id)(
                        diesel::result::Error::NotFound,
                    ));
                }
                Ok(())
            })
            .await
    }

    fn load_stats(&self, sync_run_id: &str) -> Result<SyncStats> {
        let mut conn = get_connection(&self.pool)?;
        load_run(&mut conn, sync_run_id).map(|run| run.sync_stats)
    }
}

#[async_trait]
impl SyncRunRepositoryTrait for SyncRunRepository {
    async fn create(&self, sync_run: SyncRun) -> Result<SyncRun> {
        let row = SyncRunDB::try_from(&sync_run)?;
        self.writer
            .exec(move |conn| {
                diesel::insert_into(sync_runs::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await?;
        Ok(sync_run)
    }

    async fn update(&self, sync_run: SyncRun) -> Result<SyncRun> {
        let changes = SyncRunChangeset::from(&sync_run);
        let sync_run_id = sync_run.id;
        self.writer
            .exec(move |conn| {
                diesel::update(sync_runs::table.find(&sync_run_id))
                    .set(&changes)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                load_run(conn, &sync_run_id)
            })
            .await
    }

    fn get_by_id(&self, sync_run_id: &str) -> Result<SyncRun> {
        let mut conn = get_connection(&self.pool)?;
        load_run(&mut conn, sync_run_id)
    }

    fn list_children(&self, parent_run_id: &str) -> Result<Vec<SyncRun>> {
        let mut conn = get_connection(&self.pool)?;
        sync_runs::table
            .filter(sync_runs::parent_run_id.eq(parent_run_id))
            .select(SyncRunDB::as_select())
            .order((sync_runs::created_at.asc(), sync_runs::id.asc()))
            .load::<SyncRunDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(SyncRun::try_from)
            .collect()
    }

    fn list_recent(&self, family_id: &str, limit: i64) -> Result<Vec<SyncRun>> {
        let mut conn = get_connection(&self.pool)?;
        sync_runs::table
            .filter(sync_runs::family_id.eq(family_id))
            .select(SyncRunDB::as_select())
            .order(sync_runs::created_at.desc())
            .limit(limit)
            .load::<SyncRunDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(SyncRun::try_from)
            .collect()
    }
}
