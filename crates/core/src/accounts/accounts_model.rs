//! Account domain models.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::balances::BalanceStrategy;
use crate::{errors::ValidationError, Error, Result};

/// Whether the account holds value or owes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountClassification {
    #[default]
    Asset,
    Liability,
}

impl AccountClassification {
    /// Effect of a ledger amount on the account balance.
    ///
    /// Ledger amounts are signed from the account holder's perspective
    /// (positive is an inflow). An inflow raises an asset balance and pays
    /// down a liability balance.
    pub fn balance_delta(self, amount: Decimal) -> Decimal {
        match self {
            AccountClassification::Asset => amount,
            AccountClassification::Liability => -amount,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountClassification::Asset => "ASSET",
            AccountClassification::Liability => "LIABILITY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ASSET" => Some(AccountClassification::Asset),
            "LIABILITY" => Some(AccountClassification::Liability),
            _ => None,
        }
    }
}

/// A known balance on a specific date.
///
/// For the opening anchor the balance is the value at the start of `date`,
/// before any entries dated that day. For a reported anchor it is the
/// provider's balance at the end of `date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAnchor {
    pub date: NaiveDate,
    pub balance: Decimal,
}

impl BalanceAnchor {
    pub fn new(date: NaiveDate, balance: Decimal) -> Self {
        Self { date, balance }
    }
}

/// Domain model representing an account in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub family_id: String,
    pub name: String,
    pub currency: String,
    pub classification: AccountClassification,
    /// True when a live provider connection backs this account.
    pub linked: bool,
    /// Cached current balance, written only by materialization.
    pub balance: Decimal,
    pub opening_anchor: Option<BalanceAnchor>,
    /// Latest provider-reported balance, authoritative for linked accounts.
    pub reported_balance: Option<BalanceAnchor>,
    /// Remote account identifier used when repairing provider links
    pub provider_account_ref: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// Strategy used to rebuild this account's balance series.
    pub fn balance_strategy(&self) -> BalanceStrategy {
        BalanceStrategy::for_account(self)
    }

    pub fn opening_anchor_date(&self) -> Option<NaiveDate> {
        self.opening_anchor.map(|anchor| anchor.date)
    }
}

/// Input model for creating a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub family_id: String,
    pub name: String,
    pub currency: String,
    pub classification: AccountClassification,
    pub linked: bool,
    pub opening_anchor: Option<BalanceAnchor>,
    pub provider_account_ref: Option<String>,
}

impl NewAccount {
    /// Validates the new account data.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "Account name cannot be empty".to_string(),
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "Currency cannot be empty".to_string(),
            )));
        }
        if self.family_id.trim().is_empty() {
            return Err(Error::Validation(ValidationError::MissingField(
                "family_id".to_string(),
            )));
        }
        if !self.linked && self.opening_anchor.is_none() {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "Manual accounts need an opening balance anchor".to_string(),
            )));
        }
        Ok(())
    }
}
