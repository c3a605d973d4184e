//! Ledger entry domain models.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::accounts::AccountClassification;
use crate::errors::{Result, ValidationError};
use crate::Error;

/// Immutable record of a dated, signed amount attached to an account.
///
/// Amounts are signed from the account holder's perspective: positive values
/// are inflows, negative values are outflows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub account_id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub name: String,
    /// Provider identifier; `(account_id, external_id)` is unique when present.
    pub external_id: Option<String>,
    /// Tag of the system that produced the entry (e.g. "plaid", "simplefin").
    pub source: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Input model for creating or upserting a ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLedgerEntry {
    pub account_id: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub name: String,
    pub external_id: Option<String>,
    pub source: Option<String>,
}

impl NewLedgerEntry {
    pub fn validate(&self) -> Result<()> {
        if self.account_id.trim().is_empty() {
            return Err(Error::Validation(ValidationError::MissingField(
                "account_id".to_string(),
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(Error::Validation(ValidationError::MissingField(
                "currency".to_string(),
            )));
        }
        if matches!(&self.external_id, Some(id) if id.trim().is_empty()) {
            return Err(Error::Validation(ValidationError::InvalidInput(
                "external_id cannot be blank".to_string(),
            )));
        }
        Ok(())
    }
}

/// Outcome of an idempotent upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSummary {
    /// Entries that did not exist before
    pub inserted: usize,
    /// Existing entries whose content changed
    pub updated: usize,
    /// Existing entries left as they were
    pub unchanged: usize,
}

impl UpsertSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }

    pub fn merge(&mut self, other: UpsertSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }
}

/// Collapses entries into per-day balance deltas for the given classification.
pub fn daily_net_deltas(
    entries: &[LedgerEntry],
    classification: AccountClassification,
) -> BTreeMap<NaiveDate, Decimal> {
    let mut deltas: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
    for entry in entries {
        *deltas.entry(entry.date).or_insert(Decimal::ZERO) +=
            classification.balance_delta(entry.amount);
    }
    deltas
}

/// Drops entries that share an external id with an earlier one in the batch.
///
/// Providers occasionally repeat a transaction across pages; the last copy wins
/// so that corrections in later pages are kept.
pub fn dedupe_by_external_id(entries: Vec<NewLedgerEntry>) -> Vec<NewLedgerEntry> {
    let mut positions: BTreeMap<(String, String), usize> = BTreeMap::new();
    let mut result: Vec<NewLedgerEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match &entry.external_id {
            Some(external_id) => {
                let key = (entry.account_id.clone(), external_id.clone());
                if let Some(&index) = positions.get(&key) {
                    result[index] = entry;
                } else {
                    positions.insert(key, result.len());
                    result.push(entry);
                }
            }
            None => result.push(entry),
        }
    }
    result
}
