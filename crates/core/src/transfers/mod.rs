//! Family-wide transfer matching run after account syncs.

use async_trait::async_trait;

use crate::errors::Result;

/// Pairs opposite ledger entries across a family's accounts as transfers.
///
/// Runs best effort after syncs; failures are reported, never raised.
#[async_trait]
pub trait TransferMatcher: Send + Sync {
    /// Returns the number of transfers matched.
    async fn auto_match_transfers(&self, family_id: &str) -> Result<usize>;
}

#[derive(Debug, Clone, Default)]
pub struct NoOpTransferMatcher;

#[async_trait]
impl TransferMatcher for NoOpTransferMatcher {
    async fn auto_match_transfers(&self, _family_id: &str) -> Result<usize> {
        Ok(0)
    }
}
