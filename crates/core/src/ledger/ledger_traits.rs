//! Ledger repository trait.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::ledger_model::{LedgerEntry, NewLedgerEntry, UpsertSummary};
use crate::errors::Result;

#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    /// Inserts or updates entries.
    ///
    /// Entries carrying an `external_id` are matched on
    /// `(account_id, external_id)`; re-running with identical input leaves the
    /// ledger unchanged and reports every entry as `unchanged`. Entries without
    /// an external id are always inserted.
    async fn upsert_entries(&self, entries: Vec<NewLedgerEntry>) -> Result<UpsertSummary>;

    /// Entries of one account, ordered by date, optionally bounded (inclusive).
    fn list_for_account(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<LedgerEntry>>;

    /// Earliest entry date of an account, if it has any entries.
    fn earliest_entry_date(&self, account_id: &str) -> Result<Option<NaiveDate>>;

    /// Number of entries with the given source tag created at or after `since`.
    fn count_created_since(
        &self,
        account_ids: &[String],
        source: &str,
        since: DateTime<Utc>,
    ) -> Result<usize>;

    /// Number of entries with the given source tag across the accounts.
    fn count_by_source(&self, account_ids: &[String], source: &str) -> Result<usize>;
}
