//! In-memory repository fakes for tests.
//!
//! Available to this crate's tests and, through the `test-utils` feature, to
//! dependent crates.

mod in_memory;

pub use in_memory::*;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::accounts::{Account, AccountClassification, BalanceAnchor};

/// A manual (forward) asset account anchored at `opening`.
pub fn manual_account(id: &str, opening: BalanceAnchor) -> Account {
    let now = Utc::now().naive_utc();
    Account {
        id: id.to_string(),
        family_id: "family-1".to_string(),
        name: format!("Account {}", id),
        currency: "USD".to_string(),
        classification: AccountClassification::Asset,
        linked: false,
        balance: Decimal::ZERO,
        opening_anchor: Some(opening),
        reported_balance: None,
        provider_account_ref: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// A linked (reverse) asset account with a provider-reported balance.
pub fn linked_account(id: &str, reported: BalanceAnchor) -> Account {
    Account {
        linked: true,
        opening_anchor: None,
        reported_balance: Some(reported),
        ..manual_account(id, reported)
    }
}

/// Shorthand for a date in tests.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}
