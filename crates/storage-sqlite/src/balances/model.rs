use diesel::prelude::*;

use ledgersync_core::balances::BalanceSnapshot;
use ledgersync_core::errors::{Error, Result};

use crate::utils::{format_date, parse_date, parse_decimal};

/// One row per account and day; the primary key makes a second write for the
/// same day impossible.
#[derive(Queryable, Insertable, Selectable, PartialEq, Debug, Clone)]
#[diesel(table_name = crate::schema::balance_snapshots)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BalanceSnapshotDB {
    pub account_id: String,
    pub snapshot_date: String,
    pub balance: String,
    pub currency: String,
}

impl From<&BalanceSnapshot> for BalanceSnapshotDB {
    fn from(snapshot: &BalanceSnapshot) -> Self {
        Self {
            account_id: snapshot.account_id.clone(),
            snapshot_date: format_date(snapshot.date),
            balance: snapshot.balance.to_string(),
            currency: snapshot.currency.clone(),
        }
    }
}

impl TryFrom<BalanceSnapshotDB> for BalanceSnapshot {
    type Error = Error;

    fn try_from(db: BalanceSnapshotDB) -> Result<Self> {
        Ok(Self {
            date: parse_date(&db.snapshot_date)?,
            balance: parse_decimal(&db.balance)?,
            account_id: db.account_id,
            currency: db.currency,
        })
    }
}
