//! Hand-off of account syncs from item pipelines to the job runner.

use std::sync::{Mutex, PoisonError};

use log::debug;

use crate::balances::MaterializationWindow;

/// An account that needs its balances recomputed over `window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAccountSync {
    pub account_id: String,
    pub parent_run_id: String,
    pub window: MaterializationWindow,
}

pub trait AccountSyncScheduler: Send + Sync {
    fn schedule(&self, parent_run_id: &str, account_id: &str, window: MaterializationWindow);
}

/// In-process queue of scheduled account syncs.
///
/// Scheduling an account twice keeps its first position and widens its window
/// to cover both requests.
#[derive(Debug, Default)]
pub struct AccountSyncQueue {
    pending: Mutex<Vec<ScheduledAccountSync>>,
}

impl AccountSyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything scheduled so far, in scheduling order.
    pub fn drain(&self) -> Vec<ScheduledAccountSync> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *pending)
    }

    /// Removes and returns the syncs scheduled by one run, leaving the rest.
    ///
    /// An account scheduled by several runs sits under the first of them.
    pub fn drain_for_parent(&self, parent_run_id: &str) -> Vec<ScheduledAccountSync> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let (mine, others): (Vec<_>, Vec<_>) = std::mem::take(&mut *pending)
            .into_iter()
            .partition(|s| s.parent_run_id == parent_run_id);
        *pending = others;
        mine
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AccountSyncScheduler for AccountSyncQueue {
    fn schedule(&self, parent_run_id: &str, account_id: &str, window: MaterializationWindow) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = pending.iter_mut().find(|s| s.account_id == account_id) {
            existing.window = existing.window.union(&window);
            debug!(
                "Account {} already scheduled, window widened to {:?}",
                account_id, existing.window
            );
            return;
        }
        pending.push(ScheduledAccountSync {
            account_id: account_id.to_string(),
            parent_run_id: parent_run_id.to_string(),
            window,
        });
    }
}
