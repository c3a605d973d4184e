use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::accounts::Account;
use crate::errors::Result;

/// What one market data import brought in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataImport {
    /// Source that served the import
    pub provider_id: String,
    pub fx_rates_imported: usize,
    pub prices_imported: usize,
}

/// Imports FX rates and security prices an account depends on.
///
/// Failures are expected and must never stop a sync; callers log and report
/// them, then carry on.
#[async_trait]
pub trait MarketDataImporter: Send + Sync {
    async fn import_all(&self, account: &Account) -> Result<MarketDataImport>;
}

/// One upstream market data service.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn id(&self) -> &str;

    async fn import(&self, account: &Account) -> Result<MarketDataImport>;
}

/// Importer for deployments without market data sources.
#[derive(Debug, Clone, Default)]
pub struct NoOpMarketDataImporter;

#[async_trait]
impl MarketDataImporter for NoOpMarketDataImporter {
    async fn import_all(&self, _account: &Account) -> Result<MarketDataImport> {
        Ok(MarketDataImport::default())
    }
}
