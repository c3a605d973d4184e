//! Repository trait for balance snapshots.

use async_trait::async_trait;
use chrono::NaiveDate;

use super::BalanceSnapshot;
use crate::errors::Result;

#[async_trait]
pub trait BalanceRepositoryTrait: Send + Sync {
    /// Snapshots of one account ordered by date, optionally bounded (inclusive).
    fn get_snapshots(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<BalanceSnapshot>>;

    fn get_snapshot(&self, account_id: &str, date: NaiveDate) -> Result<Option<BalanceSnapshot>>;

    fn latest_snapshot_date(&self, account_id: &str) -> Result<Option<NaiveDate>>;

    /// Replaces every snapshot of the account in `start..=end` with
    /// `snapshots`, atomically.
    async fn overwrite_range(
        &self,
        account_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        snapshots: &[BalanceSnapshot],
    ) -> Result<()>;

    /// Deletes the account's snapshots outside `start..=end`.
    ///
    /// Returns the number of deleted rows.
    async fn delete_outside_range(
        &self,
        account_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<usize>;
}
