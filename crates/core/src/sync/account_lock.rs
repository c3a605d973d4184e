//! Per-account mutual exclusion for balance materialization.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Hands out one async mutex per account id.
///
/// Holding the guard is what makes a materialization exclusive; the lock
/// entries themselves are never removed.
#[derive(Debug, Default, Clone)]
pub struct AccountLockRegistry {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl AccountLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the account's lock.
    pub async fn lock(&self, account_id: &str) -> OwnedMutexGuard<()> {
        self.lock_for(account_id).lock_owned().await
    }

    /// Takes the account's lock only if nobody holds it.
    pub fn try_lock(&self, account_id: &str) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(account_id).try_lock_owned().ok()
    }

    fn lock_for(&self, account_id: &str) -> Arc<Mutex<()>> {
        // Clone out of the map so no shard lock is held across the await.
        self.locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
