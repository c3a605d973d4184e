//! Database model for accounts.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use rust_decimal::Decimal;

use ledgersync_core::accounts::{Account, AccountClassification, BalanceAnchor, NewAccount};
use ledgersync_core::errors::{Error, Result, ValidationError};

use crate::utils::{format_date, parse_decimal, parse_optional_date};

/// Database model for accounts
#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, PartialEq, Debug, Clone,
)]
#[diesel(table_name = crate::schema::accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AccountDB {
    pub id: String,
    pub family_id: String,
    pub name: String,
    pub currency: String,
    pub classification: String,
    pub linked: bool,
    pub balance: String,
    pub opening_anchor_date: Option<String>,
    pub opening_anchor_balance: Option<String>,
    pub reported_balance_date: Option<String>,
    pub reported_balance: Option<String>,
    pub provider_account_ref: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

fn anchor_from_columns(
    date: Option<&str>,
    balance: Option<&str>,
) -> Result<Option<BalanceAnchor>> {
    match (parse_optional_date(date)?, balance) {
        (Some(date), Some(balance)) => Ok(Some(BalanceAnchor::new(date, parse_decimal(balance)?))),
        _ => Ok(None),
    }
}

pub(crate) fn anchor_to_columns(anchor: Option<BalanceAnchor>) -> (Option<String>, Option<String>) {
    match anchor {
        Some(anchor) => (
            Some(format_date(anchor.date)),
            Some(anchor.balance.to_string()),
        ),
        None => (None, None),
    }
}

impl TryFrom<AccountDB> for Account {
    type Error = Error;

    fn try_from(db: AccountDB) -> Result<Self> {
        let classification = AccountClassification::parse(&db.classification).ok_or_else(|| {
            Error::Validation(ValidationError::InvalidInput(format!(
                "Unknown account classification '{}'",
                db.classification
            )))
        })?;

        Ok(Self {
            opening_anchor: anchor_from_columns(
                db.opening_anchor_date.as_deref(),
                db.opening_anchor_balance.as_deref(),
            )?,
            reported_balance: anchor_from_columns(
                db.reported_balance_date.as_deref(),
                db.reported_balance.as_deref(),
            )?,
            balance: parse_decimal(&db.balance)?,
            id: db.id,
            family_id: db.family_id,
            name: db.name,
            currency: db.currency,
            classification,
            linked: db.linked,
            provider_account_ref: db.provider_account_ref,
            is_active: db.is_active,
            created_at: db.created_at,
            updated_at: db.updated_at,
        })
    }
}

impl From<NewAccount> for AccountDB {
    fn from(domain: NewAccount) -> Self {
        let now = chrono::Utc::now().naive_utc();
        let (opening_anchor_date, opening_anchor_balance) = anchor_to_columns(domain.opening_anchor);
        Self {
            id: domain
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            family_id: domain.family_id,
            name: domain.name,
            currency: domain.currency,
            classification: domain.classification.as_str().to_string(),
            linked: domain.linked,
            balance: Decimal::ZERO.to_string(),
            opening_anchor_date,
            opening_anchor_balance,
            reported_balance_date: None,
            reported_balance: None,
            provider_account_ref: domain.provider_account_ref,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
