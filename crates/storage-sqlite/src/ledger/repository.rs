use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::dsl::{count_star, min};
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use log::debug;
use std::sync::Arc;

use ledgersync_core::errors::Result;
use ledgersync_core::ledger::{LedgerEntry, LedgerRepositoryTrait, NewLedgerEntry, UpsertSummary};

use super::model::LedgerEntryDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::{IntoCore, StorageError};
use crate::schema::ledger_entries;
use crate::utils::{chunk_for_sqlite, format_date, now_naive, parse_optional_date};

pub struct LedgerRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl LedgerRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

fn upsert_one(
    conn: &mut SqliteConnection,
    entry: NewLedgerEntry,
    summary: &mut UpsertSummary,
) -> Result<()> {
    let now = now_naive();

    let existing = match &entry.external_id {
        Some(external_id) => ledger_entries::table
            .filter(ledger_entries::account_id.eq(&entry.account_id))
            .filter(ledger_entries::external_id.eq(external_id))
            .select(LedgerEntryDB::as_select())
            .first::<LedgerEntryDB>(conn)
            .optional()
            .map_err(StorageError::from)?,
        None => None,
    };

    match existing {
        Some(row) if row.matches(&entry) => summary.unchanged += 1,
        Some(row) => {
            diesel::update(ledger_entries::table.find(&row.id))
                .set((
                    ledger_entries::entry_date.eq(format_date(entry.date)),
                    ledger_entries::amount.eq(entry.amount.to_string()),
                    ledger_entries::currency.eq(&entry.currency),
                    ledger_entries::name.eq(&entry.name),
                    ledger_entries::source.eq(&entry.source),
                    ledger_entries::updated_at.eq(now),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
            summary.updated += 1;
        }
        None => {
            diesel::insert_into(ledger_entries::table)
                .values(&LedgerEntryDB::from_new(entry, now))
                .execute(conn)
                .map_err(StorageError::from)?;
            summary.inserted += 1;
        }
    }
    Ok(())
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    async fn upsert_entries(&self, entries: Vec<NewLedgerEntry>) -> Result<UpsertSummary> {
        if entries.is_empty() {
            return Ok(UpsertSummary::default());
        }
        for entry in &entries {
            entry.validate()?;
        }

        let summary = self
            .writer
            .exec(move |conn| {
                let mut summary = UpsertSummary::default();
                for entry in entries {
                    upsert_one(conn, entry, &mut summary)?;
                }
                Ok(summary)
            })
            .await?;

        debug!(
            "Ledger upsert: {} inserted, {} updated, {} unchanged",
            summary.inserted, summary.updated, summary.unchanged
        );
        Ok(summary)
    }

    fn list_for_account(
        &self,
        account_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<LedgerEntry>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = ledger_entries::table
            .filter(ledger_entries::account_id.eq(account_id))
            .into_boxed();
        if let Some(start) = start_date {
            query = query.filter(ledger_entries::entry_date.ge(format_date(start)));
        }
        if let Some(end) = end_date {
            query = query.filter(ledger_entries::entry_date.le(format_date(end)));
        }

        query
            .select(LedgerEntryDB::as_select())
            .order((ledger_entries::entry_date.asc(), ledger_entries::created_at.asc()))
            .load::<LedgerEntryDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(LedgerEntry::try_from)
            .collect()
    }

    fn earliest_entry_date(&self, account_id: &str) -> Result<Option<NaiveDate>> {
        let mut conn = get_connection(&self.pool)?;
        let earliest: Option<String> = ledger_entries::table
            .filter(ledger_entries::account_id.eq(account_id))
            .select(min(ledger_entries::entry_date))
            .first(&mut conn)
            .into_core()?;
        parse_optional_date(earliest.as_deref())
    }

    fn count_created_since(
        &self,
        account_ids: &[String],
        source: &str,
        since: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = get_connection(&self.pool)?;
        let since = since.naive_utc();
        let mut total: i64 = 0;
        for chunk in chunk_for_sqlite(account_ids) {
            let count: i64 = ledger_entries::table
                .filter(ledger_entries::account_id.eq_any(chunk))
                .filter(ledger_entries::source.eq(source))
                .filter(ledger_entries::created_at.ge(since))
                .select(count_star())
                .first(&mut conn)
                .into_core()?;
            total += count;
        }
        Ok(usize::try_from(total).unwrap_or_default())
    }

    fn count_by_source(&self, account_ids: &[String], source: &str) -> Result<usize> {
        let mut conn = get_connection(&self.pool)?;
        let mut total: i64 = 0;
        for chunk in chunk_for_sqlite(account_ids) {
            let count: i64 = ledger_entries::table
                .filter(ledger_entries::account_id.eq_any(chunk))
                .filter(ledger_entries::source.eq(source))
                .select(count_star())
                .first(&mut conn)
                .into_core()?;
            total += count;
        }
        Ok(usize::try_from(total).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountRepository;
    use crate::db::test_support::setup_db;
    use chrono::Duration;
    use ledgersync_core::accounts::{AccountClassification, AccountRepositoryTrait, NewAccount};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    fn entry(external_id: Option<&str>, d: u32, amount: Decimal) -> NewLedgerEntry {
        NewLedgerEntry {
            account_id: "acc-1".to_string(),
            date: day(d),
            amount,
            currency: "USD".to_string(),
            name: "Transfer".to_string(),
            external_id: external_id.map(str::to_string),
            source: Some("plaid".to_string()),
        }
    }

    async fn setup() -> (LedgerRepository, tempfile::TempDir) {
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
        (LedgerRepository::new(pool, writer), dir)
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (repo, _dir) = setup().await;
        let batch = vec![
            entry(Some("tx-1"), 1, dec!(-10)),
            entry(Some("tx-2"), 2, dec!(250.5)),
        ];

        let first = repo.upsert_entries(batch.clone()).await.unwrap();
        assert_eq!(first.inserted, 2);

        let before = repo.list_for_account("acc-1", None, None).unwrap();
        let second = repo.upsert_entries(batch).await.unwrap();
        let after = repo.list_for_account("acc-1", None, None).unwrap();

        assert_eq!(second.unchanged, 2);
        assert_eq!(second.inserted + second.updated, 0);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_upsert_updates_changed_content() {
        let (repo, _dir) = setup().await;
        repo.upsert_entries(vec![entry(Some("tx-1"), 1, dec!(-10))])
            .await
            .unwrap();

        let summary = repo
            .upsert_entries(vec![entry(Some("tx-1"), 3, dec!(-12))])
            .await
            .unwrap();
        assert_eq!(summary.updated, 1);

        let entries = repo.list_for_account("acc-1", None, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].date, day(3));
        assert_eq!(entries[0].amount, dec!(-12));
    }

    #[tokio::test]
    async fn test_entries_without_external_id_always_insert() {
        let (repo, _dir) = setup().await;
        let manual = entry(None, 5, dec!(20));
        repo.upsert_entries(vec![manual.clone()]).await.unwrap();
        let summary = repo.upsert_entries(vec![manual]).await.unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(repo.list_for_account("acc-1", None, None).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_date_bounds_and_earliest() {
        let (repo, _dir) = setup().await;
        repo.upsert_entries(vec![
            entry(Some("a"), 9, dec!(1)),
            entry(Some("b"), 3, dec!(2)),
            entry(Some("c"), 6, dec!(3)),
        ])
        .await
        .unwrap();

        let bounded = repo
            .list_for_account("acc-1", Some(day(4)), Some(day(9)))
            .unwrap();
        assert_eq!(
            bounded.iter().map(|e| e.date).collect::<Vec<_>>(),
            vec![day(6), day(9)]
        );
        assert_eq!(repo.earliest_entry_date("acc-1").unwrap(), Some(day(3)));
        assert_eq!(repo.earliest_entry_date("other").unwrap(), None);
    }

    #[tokio::test]
    async fn test_counts_by_source_and_creation_time() {
        let (repo, _dir) = setup().await;
        let started = Utc::now() - Duration::seconds(5);
        let mut simplefin = entry(Some("s-1"), 2, dec!(4));
        simplefin.source = Some("simplefin".to_string());
        repo.upsert_entries(vec![entry(Some("p-1"), 1, dec!(1)), simplefin])
            .await
            .unwrap();

        let ids = vec!["acc-1".to_string()];
        assert_eq!(repo.count_by_source(&ids, "plaid").unwrap(), 1);
        assert_eq!(repo.count_created_since(&ids, "plaid", started).unwrap(), 1);
        assert_eq!(
            repo.count_created_since(&ids, "plaid", Utc::now() + Duration::hours(1))
                .unwrap(),
            0
        );
    }
}
