//! Balance snapshot domain models.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::accounts::Account;
use crate::errors::{MaterializationError, Result};

/// Direction in which a balance series is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BalanceStrategy {
    /// Accumulate entries forward from the opening anchor.
    Forward,
    /// Unwind entries backward from the provider-reported balance.
    Reverse,
}

impl BalanceStrategy {
    /// Linked accounts trust the provider's current balance; manual accounts
    /// are the sum of their own entries.
    pub fn for_account(account: &Account) -> Self {
        if account.linked {
            BalanceStrategy::Reverse
        } else {
            BalanceStrategy::Forward
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceStrategy::Forward => "forward",
            BalanceStrategy::Reverse => "reverse",
        }
    }
}

impl std::fmt::Display for BalanceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One account's balance at the end of one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    pub account_id: String,
    pub date: NaiveDate,
    pub balance: Decimal,
    pub currency: String,
}

/// Inclusive date range to recompute. `None` bounds mean "from the series
/// origin" and "through today".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializationWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl MaterializationWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// The whole series.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn validate(&self, account_id: &str) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(MaterializationError::InvalidWindow {
                    account_id: account_id.to_string(),
                    start,
                    end,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Smallest window covering both. An open bound on either side stays open.
    pub fn union(&self, other: &MaterializationWindow) -> MaterializationWindow {
        let start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(a.min(b)),
            _ => None,
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
        MaterializationWindow { start, end }
    }
}

/// What a materialization wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializationResult {
    pub account_id: String,
    pub strategy: BalanceStrategy,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub snapshots_written: usize,
    pub stale_snapshots_removed: usize,
    pub current_balance: Decimal,
}
