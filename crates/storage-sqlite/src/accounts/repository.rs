use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use rust_decimal::Decimal;
use std::sync::Arc;

use ledgersync_core::accounts::{Account, AccountRepositoryTrait, BalanceAnchor, NewAccount};
use ledgersync_core::errors::Result;

use super::model::{anchor_to_columns, AccountDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::{not_found_as, IntoCore, StorageError};
use crate::schema::accounts;
use crate::utils::{chunk_for_sqlite, now_naive};

/// Repository for managing account data in the database
pub struct AccountRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl AccountRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

fn load_account(conn: &mut SqliteConnection, account_id: &str) -> Result<Account> {
    accounts::table
        .find(account_id)
        .select(AccountDB::as_select())
        .first::<AccountDB>(conn)
        .map_err(not_found_as("account", account_id))?
        .try_into()
}

/// Fails with `NotFound` when the update touched nothing.
fn ensure_updated(affected: usize, account_id: &str) -> Result<()> {
    if affected == 0 {
        return Err(not_found_as("account", account_id)(
            diesel::result::Error::NotFound,
        ));
    }
    Ok(())
}

#[async_trait]
impl AccountRepositoryTrait for AccountRepository {
    async fn create(&self, new_account: NewAccount) -> Result<Account> {
        new_account.validate()?;

        self.writer
            .exec(move |conn| {
                let account_db: AccountDB = new_account.into();
                diesel::insert_into(accounts::table)
                    .values(&account_db)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                account_db.try_into()
            })
            .await
    }

    fn get_by_id(&self, account_id: &str) -> Result<Account> {
        let mut conn = get_connection(&self.pool)?;
        load_account(&mut conn, account_id)
    }

    fn list_by_family(
        &self,
        family_id: &str,
        account_ids: Option<&[String]>,
    ) -> Result<Vec<Account>> {
        let mut conn = get_connection(&self.pool)?;

        let rows: Vec<AccountDB> = match account_ids {
            Some(ids) => {
                let mut rows = Vec::with_capacity(ids.len());
                for chunk in chunk_for_sqlite(ids) {
                    rows.extend(
                        accounts::table
                            .filter(accounts::family_id.eq(family_id))
                            .filter(accounts::id.eq_any(chunk))
                            .select(AccountDB::as_select())
                            .load::<AccountDB>(&mut conn)
                            .into_core()?,
                    );
                }
                rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
                rows
            }
            None => accounts::table
                .filter(accounts::family_id.eq(family_id))
                .select(AccountDB::as_select())
                .order((accounts::name.asc(), accounts::id.asc()))
                .load::<AccountDB>(&mut conn)
                .into_core()?,
        };

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn update_balance(&self, account_id: &str, balance: Decimal) -> Result<()> {
        let account_id = account_id.to_string();
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(accounts::table.find(&account_id))
                    .set((
                        accounts::balance.eq(balance.to_string()),
                        accounts::updated_at.eq(now_naive()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                ensure_updated(affected, &account_id)
            })
            .await
    }

    async fn update_reported_balance(
        &self,
        account_id: &str,
        anchor: BalanceAnchor,
    ) -> Result<()> {
        let account_id = account_id.to_string();
        let (date, balance) = anchor_to_columns(Some(anchor));
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(accounts::table.find(&account_id))
                    .set((
                        accounts::reported_balance_date.eq(date),
                        accounts::reported_balance.eq(balance),
                        accounts::updated_at.eq(now_naive()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                ensure_updated(affected, &account_id)
            })
            .await
    }

    async fn set_provider_link(
        &self,
        account_id: &str,
        provider_account_ref: Option<String>,
    ) -> Result<Account> {
        let account_id = account_id.to_string();
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(accounts::table.find(&account_id))
                    .set((
                        accounts::linked.eq(provider_account_ref.is_some()),
                        accounts::provider_account_ref.eq(provider_account_ref),
                        accounts::updated_at.eq(now_naive()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                ensure_updated(affected, &account_id)?;
                load_account(conn, &account_id)
            })
            .await
    }
}
