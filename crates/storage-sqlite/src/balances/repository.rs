use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use log::{debug, warn};
use std::sync::Arc;

use ledgersync_core::balances::{BalanceRepositoryTrait, BalanceSnapshot};
use ledgersync_core::errors::{Error, Result, ValidationError};

use super::model::BalanceSnapshotDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::{IntoCore, StorageError};
use crate::schema::balance_snapshots;
use crate::utils::{format_date, parse_optional_date, SQLITE_MAX_PARAMS_CHUNK};

pub struct BalanceRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl BalanceRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

// Four bound parameters per row.
const ROWS_PER_INSERT: usize = SQLITE_MAX_PARAMS_CHUNK / 4;

#[async_trait]
impl BalanceRepositoryTrait for BalanceRepository {
    fn get_snapshots(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<BalanceSnapshot>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = balance_snapshots::table
            .filter(balance_snapshots::account_id.eq(account_id))
            .into_boxed();
        if let Some(start) = start_date {
            query = query.filter(balance_snapshots::snapshot_date.ge(format_date(start)));
        }
        if let Some(end) = end_date {
            query = query.filter(balance_snapshots::snapshot_date.le(format_date(end)));
        }
        query
            .select(BalanceSnapshotDB::as_select())
            .order(balance_snapshots::snapshot_date.asc())
            .load::<BalanceSnapshotDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(BalanceSnapshot::try_from)
            .collect()
    }

    fn get_snapshot(&self, account_id: &str, date: NaiveDate) -> Result<Option<BalanceSnapshot>> {
        let mut conn = get_connection(&self.pool)?;
        balance_snapshots::table
            .find((account_id, format_date(date)))
            .select(BalanceSnapshotDB::as_select())
            .first::<BalanceSnapshotDB>(&mut conn)
            .optional()
            .into_core()?
            .map(BalanceSnapshot::try_from)
            .transpose()
    }

    fn latest_snapshot_date(&self, account_id: &str) -> Result<Option<NaiveDate>> {
        let mut conn = get_connection(&self.pool)?;
        let latest: Option<String> = balance_snapshots::table
            .filter(balance_snapshots::account_id.eq(account_id))
            .select(max(balance_snapshots::snapshot_date))
            .first(&mut conn)
            .into_core()?;
        parse_optional_date(latest.as_deref())
    }

    async fn overwrite_range(
        &self,
        account_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        snapshots: &[BalanceSnapshot],
    ) -> Result<()> {
        let stray = snapshots
            .iter()
            .find(|s| s.account_id != account_id || s.date < start_date || s.date > end_date);
        if let Some(stray) = stray {
            warn!(
                "Refusing snapshot for {} on {} outside {}..={} of account {}",
                stray.account_id, stray.date, start_date, end_date, account_id
            );
            return Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Snapshot for {} on {} lies outside the overwritten range",
                stray.account_id, stray.date
            ))));
        }

        let account_id = account_id.to_string();
        let rows: Vec<BalanceSnapshotDB> = snapshots.iter().map(BalanceSnapshotDB::from).collect();
        let start = format_date(start_date);
        let end = format_date(end_date);

        self.writer
            .exec(move |conn| {
                let deleted = diesel::delete(
                    balance_snapshots::table
                        .filter(balance_snapshots::account_id.eq(&account_id))
                        .filter(balance_snapshots::snapshot_date.ge(&start))
                        .filter(balance_snapshots::snapshot_date.le(&end)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;

                for chunk in rows.chunks(ROWS_PER_INSERT) {
                    diesel::insert_into(balance_snapshots::table)
                        .values(chunk)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }

                debug!(
                    "Replaced {} snapshots with {} for account {} ({}..={})",
                    deleted,
                    rows.len(),
                    account_id,
                    start,
                    end
                );
                Ok(())
            })
            .await
    }

    async fn delete_outside_range(
        &self,
        account_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<usize> {
        let account_id = account_id.to_string();
        let start = format_date(start_date);
        let end = format_date(end_date);
        self.writer
            .exec(move |conn| {
                let deleted = diesel::delete(
                    balance_snapshots::table
                        .filter(balance_snapshots::account_id.eq(&account_id))
                        .filter(
                            balance_snapshots::snapshot_date
                                .lt(&start)
                                .or(balance_snapshots::snapshot_date.gt(&end)),
                        ),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(deleted)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountRepository;
    use crate::db::test_support::setup_db;
    use ledgersync_core::accounts::{AccountClassification, AccountRepositoryTrait, NewAccount};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn snapshot(d: u32, balance: Decimal) -> BalanceSnapshot {
        BalanceSnapshot {
            account_id: "acc-1".to_string(),
            date: day(d),
            balance,
            currency: "USD".to_string(),
        }
    }

    async fn setup() -> (BalanceRepository, tempfile::TempDir) {
        let (pool, writer, dir) = setup_db();
        AccountRepository::new(pool.clone(), writer.clone())
            .create(NewAccount {
                id: Some("acc-1".to_string()),
                family_id: "fam-1".to_string(),
                name: "Checking".to_string(),
                currency: "USD".to_string(),
                classification: AccountClassification::Asset,
                linked: true,
                opening_anchor: None,
                provider_account_ref: None,
            })
            .await
            .unwrap();
        (BalanceRepository::new(pool, writer), dir)
    }

    #[tokio::test]
    async fn test_overwrite_replaces_only_the_range() {
        let (repo, _dir) = setup().await;
        let initial: Vec<_> = (1..=5).map(|d| snapshot(d, dec!(10))).collect();
        repo.overwrite_range("acc-1", day(1), day(5), &initial)
            .await
            .unwrap();

        let replacement = vec![snapshot(2, dec!(20)), snapshot(3, dec!(30))];
        repo.overwrite_range("acc-1", day(2), day(4), &replacement)
            .await
            .unwrap();

        let stored = repo.get_snapshots("acc-1", None, None).unwrap();
        assert_eq!(
            stored
                .iter()
                .map(|s| (s.date, s.balance))
                .collect::<Vec<_>>(),
            vec![
                (day(1), dec!(10)),
                (day(2), dec!(20)),
                (day(3), dec!(30)),
                (day(5), dec!(10)),
            ]
        );
        assert_eq!(repo.latest_snapshot_date("acc-1").unwrap(), Some(day(5)));
        assert_eq!(
            repo.get_snapshot("acc-1", day(3)).unwrap().unwrap().balance,
            dec!(30)
        );
        assert!(repo.get_snapshot("acc-1", day(4)).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_rejects_rows_outside_range() {
        let (repo, _dir) = setup().await;
        let err = repo
            .overwrite_range("acc-1", day(2), day(3), &[snapshot(4, dec!(1))])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside"));
        assert!(repo.get_snapshots("acc-1", None, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_large_series_in_one_call() {
        let (repo, _dir) = setup().await;
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let series: Vec<BalanceSnapshot> = (0..800)
            .map(|offset| BalanceSnapshot {
                account_id: "acc-1".to_string(),
                date: start + chrono::Duration::days(offset),
                balance: Decimal::from(offset),
                currency: "USD".to_string(),
            })
            .collect();
        let end = series[series.len() - 1].date;
        repo.overwrite_range("acc-1", start, end, &series)
            .await
            .unwrap();

        assert_eq!(repo.get_snapshots("acc-1", None, None).unwrap().len(), 800);
    }

    #[tokio::test]
    async fn test_delete_outside_range() {
        let (repo, _dir) = setup().await;
        let initial: Vec<_> = (1..=6).map(|d| snapshot(d, dec!(1))).collect();
        repo.overwrite_range("acc-1", day(1), day(6), &initial)
            .await
            .unwrap();

        let removed = repo
            .delete_outside_range("acc-1", day(2), day(4))
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert_eq!(
            repo.get_snapshots("acc-1", Some(day(1)), Some(day(10)))
                .unwrap()
                .len(),
            3
        );
    }
}
