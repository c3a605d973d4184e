//! Ordered fallback over several market data sources.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use log::{debug, warn};

use super::{MarketDataImport, MarketDataImporter, MarketDataSource};
use crate::accounts::Account;
use crate::errors::{Error, Result};

/// Tries each source in order; the first success wins and later sources are
/// not called.
///
/// Only the winner is remembered. When every source fails the last error is
/// returned.
pub struct FallbackMarketDataImporter {
    sources: Vec<Arc<dyn MarketDataSource>>,
    last_provider: Mutex<Option<String>>,
}

impl FallbackMarketDataImporter {
    pub fn new(sources: Vec<Arc<dyn MarketDataSource>>) -> Self {
        Self {
            sources,
            last_provider: Mutex::new(None),
        }
    }

    /// Id of the source that served the most recent successful import.
    pub fn last_successful_provider(&self) -> Option<String> {
        self.last_provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MarketDataImporter for FallbackMarketDataImporter {
    async fn import_all(&self, account: &Account) -> Result<MarketDataImport> {
        let mut last_error: Option<Error> = None;

        for source in &self.sources {
            match source.import(account).await {
                Ok(mut import) => {
                    debug!(
                        "Market data for account {} served by '{}'",
                        account.id,
                        source.id()
                    );
                    import.provider_id = source.id().to_string();
                    *self
                        .last_provider
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(import.provider_id.clone());
                    return Ok(import);
                }
                Err(e) => {
                    warn!(
                        "Market data source '{}' failed for account {}: {}, trying next",
                        source.id(),
                        account.id,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::MarketData("no market data sources configured".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountClassification;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource {
        id: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn new(id: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                id,
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MarketDataSource for StubSource {
        fn id(&self) -> &str {
            self.id
        }

        async fn import(&self, _account: &Account) -> Result<MarketDataImport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::MarketData(format!("{} unavailable", self.id)))
            } else {
                Ok(MarketDataImport {
                    provider_id: String::new(),
                    fx_rates_imported: 2,
                    prices_imported: 3,
                })
            }
        }
    }

    fn account() -> Account {
        let now = Utc::now().naive_utc();
        Account {
            id: "acc-1".to_string(),
            family_id: "fam".to_string(),
            name: "Brokerage".to_string(),
            currency: "USD".to_string(),
            classification: AccountClassification::Asset,
            linked: true,
            balance: Decimal::ZERO,
            opening_anchor: None,
            reported_balance: None,
            provider_account_ref: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let failing = StubSource::new("primary", true);
        let working = StubSource::new("secondary", false);
        let unused = StubSource::new("tertiary", false);
        let sources: Vec<Arc<dyn MarketDataSource>> =
            vec![failing.clone(), working.clone(), unused.clone()];
        let importer = FallbackMarketDataImporter::new(sources);

        let import = importer.import_all(&account()).await.unwrap();

        assert_eq!(import.provider_id, "secondary");
        assert_eq!(import.prices_imported, 3);
        assert_eq!(importer.last_successful_provider().as_deref(), Some("secondary"));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(unused.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_failing_returns_last_error() {
        let sources: Vec<Arc<dyn MarketDataSource>> =
            vec![StubSource::new("a", true), StubSource::new("b", true)];
        let importer = FallbackMarketDataImporter::new(sources);

        let err = importer.import_all(&account()).await.unwrap_err();
        assert!(err.to_string().contains("b unavailable"));
        assert!(importer.last_successful_provider().is_none());
    }

    #[tokio::test]
    async fn test_no_sources_is_an_error() {
        let importer = FallbackMarketDataImporter::new(Vec::new());
        assert!(matches!(
            importer.import_all(&account()).await,
            Err(Error::MarketData(_))
        ));
    }
}
