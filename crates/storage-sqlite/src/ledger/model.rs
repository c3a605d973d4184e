//! Database model for ledger entries.

use chrono::NaiveDateTime;
use diesel::prelude::*;

use ledgersync_core::errors::{Error, Result};
use ledgersync_core::ledger::{LedgerEntry, NewLedgerEntry};

use crate::utils::{format_date, parse_date, parse_decimal};

#[derive(Queryable, Identifiable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::ledger_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct LedgerEntryDB {
    pub id: String,
    pub account_id: String,
    pub entry_date: String,
    pub amount: String,
    pub currency: String,
    pub name: String,
    pub external_id: Option<String>,
    pub source: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl LedgerEntryDB {
    pub fn from_new(entry: NewLedgerEntry, now: NaiveDateTime) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: entry.account_id,
            entry_date: format_date(entry.date),
            amount: entry.amount.to_string(),
            currency: entry.currency,
            name: entry.name,
            external_id: entry.external_id,
            source: entry.source,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the stored row already carries the entry's content.
    ///
    /// Amounts compare as decimals so `10.0` and `10.00` are the same value.
    pub fn matches(&self, entry: &NewLedgerEntry) -> bool {
        self.entry_date == format_date(entry.date)
            && parse_decimal(&self.amount).is_ok_and(|amount| amount == entry.amount)
            && self.currency == entry.currency
            && self.name == entry.name
            && self.source == entry.source
    }
}

impl TryFrom<LedgerEntryDB> for LedgerEntry {
    type Error = Error;

    fn try_from(db: LedgerEntryDB) -> Result<Self> {
        Ok(Self {
            date: parse_date(&db.entry_date)?,
            amount: parse_decimal(&db.amount)?,
            id: db.id,
            account_id: db.account_id,
            currency: db.currency,
            name: db.name,
            external_id: db.external_id,
            source: db.source,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}
