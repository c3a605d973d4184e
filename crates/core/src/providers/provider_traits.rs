//! Provider collaborator and repository traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::provider_model::{
    FetchRequest, ProviderAccount, ProviderCheckpoint, ProviderItem, ProviderItemStatus,
    ProviderPayload, RemoteAccount,
};
use crate::accounts::Account;
use crate::errors::Result;
use crate::ledger::NewLedgerEntry;

/// Client for one aggregation service.
///
/// Authentication problems must surface as
/// `ProviderError::AuthenticationRequired` so the item can be flagged for the
/// user to reconnect.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn fetch(&self, item: &ProviderItem, request: &FetchRequest) -> Result<ProviderPayload>;
}

/// Converts raw provider payloads into ledger entries for a linked account.
///
/// Output must be stable for identical input and carry `external_id`s so
/// that re-running it upserts instead of duplicating.
pub trait TransactionNormalizer: Send + Sync {
    fn normalize(
        &self,
        raw_transactions: &Value,
        provider_account: &ProviderAccount,
        account: &Account,
    ) -> Result<Vec<NewLedgerEntry>>;

    /// Number of holdings in a raw holdings payload.
    fn count_holdings(&self, raw_holdings: &Value) -> usize;
}

#[async_trait]
pub trait ProviderItemRepositoryTrait: Send + Sync {
    async fn create_item(&self, item: ProviderItem) -> Result<ProviderItem>;

    fn get_item(&self, item_id: &str) -> Result<ProviderItem>;

    /// All items, or the items of one family.
    fn list_items(&self, family_id: Option<&str>) -> Result<Vec<ProviderItem>>;

    async fn update_status(&self, item_id: &str, status: ProviderItemStatus) -> Result<()>;

    async fn set_pending_account_setup(&self, item_id: &str, pending: bool) -> Result<()>;

    async fn save_checkpoint(&self, item_id: &str, checkpoint: ProviderCheckpoint) -> Result<()>;

    async fn mark_synced(&self, item_id: &str, synced_at: DateTime<Utc>) -> Result<()>;

    /// Inserts or refreshes the provider account matching
    /// `(item_id, external_account_id)`. Raw payloads and the reported balance
    /// are replaced; an existing `account_id` link is preserved.
    async fn upsert_provider_account(
        &self,
        item_id: &str,
        remote: &RemoteAccount,
    ) -> Result<ProviderAccount>;

    fn list_provider_accounts(&self, item_id: &str) -> Result<Vec<ProviderAccount>>;

    /// Sets (`Some`) or clears (`None`) the local account back-reference.
    async fn link_provider_account(
        &self,
        provider_account_id: &str,
        account_id: Option<String>,
    ) -> Result<ProviderAccount>;
}
