//! Tuning knobs for provider item syncs.

use std::time::Duration;

/// Configuration for provider item syncs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Upper bound on a single gateway fetch.
    pub gateway_timeout: Duration,
    /// Days SimpleFin windows reach back before the last synced date, so
    /// late-posting transactions are picked up again.
    pub simplefin_lookback_days: i64,
    /// History requested from SimpleFin on an item's first sync.
    pub initial_history_days: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(60),
            simplefin_lookback_days: 7,
            initial_history_days: 90,
        }
    }
}

impl SyncConfig {
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }
}
