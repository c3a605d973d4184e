//! Database models for provider items and provider accounts.

use diesel::prelude::*;
use serde_json::Value;

use ledgersync_core::errors::{Error, Result, ValidationError};
use ledgersync_core::providers::{
    ProviderAccount, ProviderCheckpoint, ProviderItem, ProviderItemStatus, ProviderKind,
};

use crate::utils::{
    format_date, format_timestamp, parse_decimal, parse_optional_date, parse_optional_timestamp,
    parse_timestamp,
};

#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone,
)]
#[diesel(table_name = crate::schema::provider_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProviderItemDB {
    pub id: String,
    pub family_id: String,
    pub kind: String,
    pub name: String,
    pub status: String,
    pub pending_account_setup: bool,
    pub checkpoint: Option<String>,
    pub last_synced_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn invalid(what: &str, value: &str) -> Error {
    Error::Validation(ValidationError::InvalidInput(format!(
        "Unknown {} '{}'",
        what, value
    )))
}

fn parse_json(value: Option<&str>) -> Result<Option<Value>> {
    Ok(value.map(serde_json::from_str).transpose()?)
}

pub(crate) fn json_text(value: Option<&Value>) -> Option<String> {
    value.map(Value::to_string)
}

impl TryFrom<ProviderItem> for ProviderItemDB {
    type Error = Error;

    fn try_from(item: ProviderItem) -> Result<Self> {
        Ok(Self {
            checkpoint: item
                .checkpoint
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            id: item.id,
            family_id: item.family_id,
            kind: item.kind.source_tag().to_string(),
            name: item.name,
            status: item.status.as_str().to_string(),
            pending_account_setup: item.pending_account_setup,
            last_synced_at: item.last_synced_at.map(format_timestamp),
            created_at: format_timestamp(item.created_at),
            updated_at: format_timestamp(item.updated_at),
        })
    }
}

impl TryFrom<ProviderItemDB> for ProviderItem {
    type Error = Error;

    fn try_from(db: ProviderItemDB) -> Result<Self> {
        let checkpoint: Option<ProviderCheckpoint> = db
            .checkpoint
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(Self {
            kind: ProviderKind::parse(&db.kind).ok_or_else(|| invalid("provider kind", &db.kind))?,
            status: ProviderItemStatus::parse(&db.status)
                .ok_or_else(|| invalid("provider item status", &db.status))?,
            checkpoint,
            last_synced_at: parse_optional_timestamp(db.last_synced_at.as_deref())?,
            created_at: parse_timestamp(&db.created_at)?,
            updated_at: parse_timestamp(&db.updated_at)?,
            id: db.id,
            family_id: db.family_id,
            name: db.name,
            pending_account_setup: db.pending_account_setup,
        })
    }
}

#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::provider_accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProviderAccountDB {
    pub id: String,
    pub provider_item_id: String,
    pub external_account_id: String,
    pub name: String,
    pub currency: String,
    pub mask: Option<String>,
    pub account_id: Option<String>,
    pub raw_transactions_payload: Option<String>,
    pub raw_holdings_payload: Option<String>,
    pub reported_balance: Option<String>,
    pub reported_balance_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&ProviderAccount> for ProviderAccountDB {
    fn from(pa: &ProviderAccount) -> Self {
        Self {
            id: pa.id.clone(),
            provider_item_id: pa.provider_item_id.clone(),
            external_account_id: pa.external_account_id.clone(),
            name: pa.name.clone(),
            currency: pa.currency.clone(),
            mask: pa.mask.clone(),
            account_id: pa.account_id.clone(),
            raw_transactions_payload: json_text(pa.raw_transactions_payload.as_ref()),
            raw_holdings_payload: json_text(pa.raw_holdings_payload.as_ref()),
            reported_balance: pa.reported_balance.map(|b| b.to_string()),
            reported_balance_date: pa.reported_balance_date.map(format_date),
            created_at: format_timestamp(pa.created_at),
            updated_at: format_timestamp(pa.updated_at),
        }
    }
}

impl TryFrom<ProviderAccountDB> for ProviderAccount {
    type Error = Error;

    fn try_from(db: ProviderAccountDB) -> Result<Self> {
        Ok(Self {
            raw_transactions_payload: parse_json(db.raw_transactions_payload.as_deref())?,
            raw_holdings_payload: parse_json(db.raw_holdings_payload.as_deref())?,
            reported_balance: db.reported_balance.as_deref().map(parse_decimal).transpose()?,
            reported_balance_date: parse_optional_date(db.reported_balance_date.as_deref())?,
            created_at: parse_timestamp(&db.created_at)?,
            updated_at: parse_timestamp(&db.updated_at)?,
            id: db.id,
            provider_item_id: db.provider_item_id,
            external_account_id: db.external_account_id,
            name: db.name,
            currency: db.currency,
            mask: db.mask,
            account_id: db.account_id,
        })
    }
}
