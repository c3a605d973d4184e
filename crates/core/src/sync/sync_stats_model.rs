//! Structured progress and health counters recorded on a sync run.
//!
//! Every field merges additively (see [`SyncStats::merge`]) so independent
//! phases can record deltas without reading the current value first.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Broad class of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Database,
    Validation,
    Timeout,
    Authentication,
    ProviderImport,
    Normalization,
    Materialization,
    MarketData,
    Cancelled,
    Unexpected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorRecord {
    pub message: String,
    pub category: ErrorCategory,
}

impl SyncErrorRecord {
    pub fn from_error(error: &crate::Error) -> Self {
        Self {
            message: error.to_string(),
            category: error.category(),
        }
    }
}

/// Linked vs unlinked provider accounts seen during configuration check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupStats {
    pub total: usize,
    pub linked: usize,
    pub unlinked: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStats {
    /// Raw transactions looked at
    pub seen: usize,
    /// Ledger entries created since the import started
    pub created: usize,
    pub updated: usize,
    /// Raw transactions rejected by validation
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingsStats {
    pub processed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStats {
    pub error_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup: Option<SetupStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_started_at: Option<DateTime<Utc>>,
    /// Keyed by source tag
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transactions: BTreeMap<String, TransactionStats>,
    /// Keyed by holdings label
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub holdings: BTreeMap<String, HoldingsStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStats>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<SyncErrorRecord>,
    /// Request flag: skip transaction processing, refresh balances only
    #[serde(default)]
    pub balances_only: bool,
}

impl SyncStats {
    pub fn balances_only() -> Self {
        Self {
            balances_only: true,
            ..Self::default()
        }
    }

    /// Adds `delta` into `self`.
    ///
    /// Counters are summed, maps merge per key, errors are appended, the
    /// earliest import start is kept and `balances_only` is sticky. No key
    /// recorded before a merge is ever dropped by it.
    pub fn merge(&mut self, delta: &SyncStats) {
        if let Some(setup) = delta.setup {
            let current = self.setup.get_or_insert_with(SetupStats::default);
            current.total += setup.total;
            current.linked += setup.linked;
            current.unlinked += setup.unlinked;
        }

        self.import_started_at = match (self.import_started_at, delta.import_started_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        for (source, stats) in &delta.transactions {
            let current = self.transactions.entry(source.clone()).or_default();
            current.seen += stats.seen;
            current.created += stats.created;
            current.updated += stats.updated;
            current.skipped += stats.skipped;
        }

        for (label, stats) in &delta.holdings {
            self.holdings.entry(label.clone()).or_default().processed += stats.processed;
        }

        if let Some(health) = delta.health {
            self.health.get_or_insert_with(HealthStats::default).error_count += health.error_count;
        }

        self.errors.extend(delta.errors.iter().cloned());
        self.balances_only |= delta.balances_only;
    }

    pub fn merged(mut self, delta: &SyncStats) -> Self {
        self.merge(delta);
        self
    }

    pub fn first_error(&self) -> Option<&SyncErrorRecord> {
        self.errors.first()
    }
}
