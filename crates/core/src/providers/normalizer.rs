//! Raw transaction validation and the canonical JSON normalizer.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;

use super::{ProviderAccount, TransactionNormalizer};
use crate::accounts::Account;
use crate::errors::{Error, Result, ValidationError};
use crate::ledger::NewLedgerEntry;

/// Fields every raw transaction must carry before it is normalized.
pub const REQUIRED_TRANSACTION_FIELDS: [&str; 3] = ["id", "date", "amount"];

/// Checks one raw transaction for the required fields.
pub fn validate_raw_transaction(raw: &Value) -> Result<()> {
    let object = raw.as_object().ok_or_else(|| {
        Error::Validation(ValidationError::InvalidInput(
            "transaction is not an object".to_string(),
        ))
    })?;
    for field in REQUIRED_TRANSACTION_FIELDS {
        match object.get(field) {
            None | Some(Value::Null) => {
                return Err(Error::Validation(ValidationError::MissingField(
                    field.to_string(),
                )))
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(Error::Validation(ValidationError::MissingField(
                    field.to_string(),
                )))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Splits a raw transaction list into the valid transactions (as a new list)
/// and the number rejected. A payload that is not a list counts as empty.
pub fn partition_raw_transactions(raw: &Value) -> (Value, usize) {
    let Some(items) = raw.as_array() else {
        return (Value::Array(Vec::new()), 0);
    };
    let mut valid = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for item in items {
        match validate_raw_transaction(item) {
            Ok(()) => valid.push(item.clone()),
            Err(e) => {
                log::debug!("Skipping raw transaction: {}", e);
                skipped += 1;
            }
        }
    }
    (Value::Array(valid), skipped)
}

/// Sign convention of raw amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmountConvention {
    /// Positive amounts are money coming into the account.
    #[default]
    InflowPositive,
    /// Positive amounts are money leaving the account.
    OutflowPositive,
}

/// Normalizer for payloads already in canonical shape:
/// `[{"id", "date": "YYYY-MM-DD", "amount", "name"?, "currency"?}]`.
///
/// Amounts may be JSON numbers or decimal strings.
#[derive(Debug, Clone)]
pub struct JsonTransactionNormalizer {
    source: String,
    convention: AmountConvention,
}

impl JsonTransactionNormalizer {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            convention: AmountConvention::InflowPositive,
        }
    }

    pub fn with_convention(mut self, convention: AmountConvention) -> Self {
        self.convention = convention;
        self
    }

    fn parse_entry(
        &self,
        raw: &Value,
        provider_account: &ProviderAccount,
        account: &Account,
    ) -> Result<NewLedgerEntry> {
        validate_raw_transaction(raw)?;

        let external_id = match &raw["id"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let date = raw["date"]
            .as_str()
            .ok_or_else(|| {
                Error::Normalization(format!("transaction {} has a non-string date", external_id))
            })
            .and_then(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| {
                    Error::Normalization(format!(
                        "transaction {} has an invalid date '{}': {}",
                        external_id, s, e
                    ))
                })
            })?;
        let amount = parse_amount(&raw["amount"]).ok_or_else(|| {
            Error::Normalization(format!(
                "transaction {} has an invalid amount {}",
                external_id, raw["amount"]
            ))
        })?;
        let amount = match self.convention {
            AmountConvention::InflowPositive => amount,
            AmountConvention::OutflowPositive => -amount,
        };

        Ok(NewLedgerEntry {
            account_id: account.id.clone(),
            date,
            amount,
            currency: raw["currency"]
                .as_str()
                .unwrap_or(&provider_account.currency)
                .to_string(),
            name: raw["name"].as_str().unwrap_or("").to_string(),
            external_id: Some(external_id),
            source: Some(self.source.clone()),
        })
    }
}

fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        Value::Number(n) => n.to_string().parse::<Decimal>().ok(),
        _ => None,
    }
}

impl TransactionNormalizer for JsonTransactionNormalizer {
    fn normalize(
        &self,
        raw_transactions: &Value,
        provider_account: &ProviderAccount,
        account: &Account,
    ) -> Result<Vec<NewLedgerEntry>> {
        let Some(items) = raw_transactions.as_array() else {
            return Err(Error::Normalization(format!(
                "raw transactions for provider account {} are not a list",
                provider_account.id
            )));
        };
        items
            .iter()
            .map(|raw| self.parse_entry(raw, provider_account, account))
            .collect()
    }

    fn count_holdings(&self, raw_holdings: &Value) -> usize {
        raw_holdings.as_array().map_or(0, Vec::len)
    }
}
