//! Account repository trait.
//!
//! This trait defines the contract for account persistence without any
//! database-specific types, allowing for different storage implementations.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::accounts_model::{Account, BalanceAnchor, NewAccount};
use crate::errors::Result;

/// Trait defining the contract for Account repository operations.
#[async_trait]
pub trait AccountRepositoryTrait: Send + Sync {
    /// Creates a new account.
    async fn create(&self, new_account: NewAccount) -> Result<Account>;

    /// Retrieves an account by its ID.
    fn get_by_id(&self, account_id: &str) -> Result<Account>;

    /// Lists accounts of a family, optionally narrowed to the given IDs.
    fn list_by_family(
        &self,
        family_id: &str,
        account_ids: Option<&[String]>,
    ) -> Result<Vec<Account>>;

    /// Writes the cached current balance.
    ///
    /// Only the balance materializer calls this.
    async fn update_balance(&self, account_id: &str, balance: Decimal) -> Result<()>;

    /// Records the latest provider-reported balance.
    async fn update_reported_balance(&self, account_id: &str, anchor: BalanceAnchor)
        -> Result<()>;

    /// Links (`Some`) or unlinks (`None`) the account to a remote account.
    ///
    /// The `linked` flag follows the presence of the reference.
    async fn set_provider_link(
        &self,
        account_id: &str,
        provider_account_ref: Option<String>,
    ) -> Result<Account>;
}
