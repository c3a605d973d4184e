//! Domain event types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::sync::SyncRunStatus;

/// Facts about data changes, emitted by core services after the change is
/// committed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// An account's balance series was rewritten over `start..=end`.
    BalancesMaterialized {
        account_id: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },

    /// Ledger entries were inserted or updated for these accounts.
    LedgerEntriesChanged {
        account_ids: Vec<String>,
        inserted: usize,
        updated: usize,
    },

    /// A provider item exposes remote accounts nobody has linked yet.
    ProviderAccountsPendingSetup {
        provider_item_id: String,
        unlinked_count: usize,
    },

    /// A sync run reached a terminal status.
    SyncRunFinished {
        sync_run_id: String,
        status: SyncRunStatus,
    },
}

impl DomainEvent {
    pub fn balances_materialized(
        account_id: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self::BalancesMaterialized {
            account_id,
            start_date,
            end_date,
        }
    }

    pub fn ledger_entries_changed(account_ids: Vec<String>, inserted: usize, updated: usize) -> Self {
        Self::LedgerEntriesChanged {
            account_ids,
            inserted,
            updated,
        }
    }

    pub fn provider_accounts_pending_setup(provider_item_id: String, unlinked_count: usize) -> Self {
        Self::ProviderAccountsPendingSetup {
            provider_item_id,
            unlinked_count,
        }
    }

    pub fn sync_run_finished(sync_run_id: String, status: SyncRunStatus) -> Self {
        Self::SyncRunFinished {
            sync_run_id,
            status,
        }
    }
}
