use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use ledgersync_core::errors::Result;
use ledgersync_core::providers::{
    ProviderAccount, ProviderCheckpoint, ProviderItem, ProviderItemRepositoryTrait,
    ProviderItemStatus, RemoteAccount,
};

use super::model::{json_text, ProviderAccountDB, ProviderItemDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::{not_found_as, IntoCore, StorageError};
use crate::schema::{provider_accounts, provider_items};
use crate::utils::{format_date, format_timestamp};

pub struct ProviderItemRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl ProviderItemRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

/// Fails with `NotFound` when an item update touched nothing.
fn ensure_item_updated(affected: usize, item_id: &str) -> Result<()> {
    if affected == 0 {
        return Err(not_found_as("provider item", item_id)(
            diesel::result::Error::NotFound,
        ));
    }
    Ok(())
}

fn load_provider_account(
    conn: &mut SqliteConnection,
    provider_account_id: &str,
) -> Result<ProviderAccount> {
    provider_accounts::table
        .find(provider_account_id)
        .select(ProviderAccountDB::as_select())
        .first::<ProviderAccountDB>(conn)
        .map_err(not_found_as("provider account", provider_account_id))?
        .try_into()
}

#[async_trait]
impl ProviderItemRepositoryTrait for ProviderItemRepository {
    async fn create_item(&self, item: ProviderItem) -> Result<ProviderItem> {
        let row = ProviderItemDB::try_from(item.clone())?;
        self.writer
            .exec(move |conn| {
                diesel::insert_into(provider_items::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await?;
        Ok(item)
    }

    fn get_item(&self, item_id: &str) -> Result<ProviderItem> {
        let mut conn = get_connection(&self.pool)?;
        provider_items::table
            .find(item_id)
            .select(ProviderItemDB::as_select())
            .first::<ProviderItemDB>(&mut conn)
            .map_err(not_found_as("provider item", item_id))?
            .try_into()
    }

    fn list_items(&self, family_id: Option<&str>) -> Result<Vec<ProviderItem>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = provider_items::table.into_boxed();
        if let Some(family_id) = family_id {
            query = query.filter(provider_items::family_id.eq(family_id));
        }
        query
            .select(ProviderItemDB::as_select())
            .order((provider_items::created_at.asc(), provider_items::id.asc()))
            .load::<ProviderItemDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(ProviderItem::try_from)
            .collect()
    }

    async fn update_status(&self, item_id: &str, status: ProviderItemStatus) -> Result<()> {
        let item_id = item_id.to_string();
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(provider_items::table.find(&item_id))
                    .set((
                        provider_items::status.eq(status.as_str()),
                        provider_items::updated_at.eq(format_timestamp(Utc::now())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                ensure_item_updated(affected, &item_id)
            })
            .await
    }

    async fn set_pending_account_setup(&self, item_id: &str, pending: bool) -> Result<()> {
        let item_id = item_id.to_string();
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(provider_items::table.find(&item_id))
                    .set((
                        provider_items::pending_account_setup.eq(pending),
                        provider_items::updated_at.eq(format_timestamp(Utc::now())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                ensure_item_updated(affected, &item_id)
            })
            .await
    }

    async fn save_checkpoint(&self, item_id: &str, checkpoint: ProviderCheckpoint) -> Result<()> {
        let item_id = item_id.to_string();
        let checkpoint = serde_json::to_string(&checkpoint)?;
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(provider_items::table.find(&item_id))
                    .set((
                        provider_items::checkpoint.eq(Some(checkpoint)),
                        provider_items::updated_at.eq(format_timestamp(Utc::now())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                ensure_item_updated(affected, &item_id)
            })
            .await
    }

    async fn mark_synced(&self, item_id: &str, synced_at: DateTime<Utc>) -> Result<()> {
        let item_id = item_id.to_string();
        self.writer
            .exec(move |conn| {
                let affected = diesel::update(provider_items::table.find(&item_id))
                    .set((
                        provider_items::last_synced_at.eq(Some(format_timestamp(synced_at))),
                        provider_items::updated_at.eq(format_timestamp(Utc::now())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                ensure_item_updated(affected, &item_id)
            })
            .await
    }

    async fn upsert_provider_account(
        &self,
        item_id: &str,
        remote: &RemoteAccount,
    ) -> Result<ProviderAccount> {
        let item_id = item_id.to_string();
        let remote = remote.clone();
        self.writer
            .exec(move |conn| {
                let now = format_timestamp(Utc::now());
                let existing_id: Option<String> = provider_accounts::table
                    .filter(provider_accounts::provider_item_id.eq(&item_id))
                    .filter(provider_accounts::external_account_id.eq(&remote.external_account_id))
                    .select(provider_accounts::id)
                    .first(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                let id = match existing_id {
                    Some(id) => {
                        // The account_id link is left alone.
                        diesel::update(provider_accounts::table.find(&id))
                            .set((
                                provider_accounts::name.eq(&remote.name),
                                provider_accounts::currency.eq(&remote.currency),
                                provider_accounts::mask.eq(&remote.mask),
                                provider_accounts::raw_transactions_payload
                                    .eq(json_text(remote.transactions.as_ref())),
                                provider_accounts::raw_holdings_payload
                                    .eq(json_text(remote.holdings.as_ref())),
                                provider_accounts::reported_balance
                                    .eq(remote.balance.map(|b| b.to_string())),
                                provider_accounts::reported_balance_date
                                    .eq(remote.balance_date.map(format_date)),
                                provider_accounts::updated_at.eq(&now),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        id
                    }
                    None => {
                        let row = ProviderAccountDB {
                            id: uuid::Uuid::new_v4().to_string(),
                            provider_item_id: item_id.clone(),
                            external_account_id: remote.external_account_id.clone(),
                            name: remote.name.clone(),
                            currency: remote.currency.clone(),
                            mask: remote.mask.clone(),
                            account_id: None,
                            raw_transactions_payload: json_text(remote.transactions.as_ref()),
                            raw_holdings_payload: json_text(remote.holdings.as_ref()),
                            reported_balance: remote.balance.map(|b| b.to_string()),
                            reported_balance_date: remote.balance_date.map(format_date),
                            created_at: now.clone(),
                            updated_at: now,
                        };
                        diesel::insert_into(provider_accounts::table)
                            .values(&row)
                            .execute(conn)
                            .map_err(StorageError::from)?;
                        row.id
                    }
                };

                load_provider_account(conn, &id)
            })
            .await
    }

    fn list_provider_accounts(&self, item_id: &str) -> Result<Vec<ProviderAccount>> {
        let mut conn = get_connection(&self.pool)?;
        provider_accounts::table
            .filter(provider_accounts::provider_item_id.eq(item_id))
            .select(ProviderAccountDB::as_select())
            .order((
                provider_accounts::created_at.asc(),
                provider_accounts::external_account_id.asc(),
            ))
            .load::<ProviderAccountDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(ProviderAccount::try_from)
            .collect()
    }

    async fn link_provider_account(
        &self,
        provider_account_id: &str,
        account_id: Option<String>,
    ) -> Result<ProviderAccount> {
        let provider_account_id = provider_account_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::update(provider_accounts::table.find(&provider_account_id))
                    .set((
                        provider_accounts::account_id.eq(account_id),
                        provider_accounts::updated_at.eq(format_timestamp(Utc::now())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                load_provider_account(conn, &provider_account_id)
            })
            .await
    }
}
