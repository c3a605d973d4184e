//! Provider gateway backed by JSON files dropped into a directory.
//!
//! An exporter (or a test) writes `<drop_dir>/<item id>.json` holding a
//! `ProviderPayload`; the next scheduled sync of that item picks it up.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use ledgersync_core::errors::{ProviderError, Result};
use ledgersync_core::providers::{FetchRequest, ProviderGateway, ProviderItem, ProviderPayload};

pub struct FileDropGateway {
    drop_dir: PathBuf,
}

impl FileDropGateway {
    pub fn new(drop_dir: impl Into<PathBuf>) -> Self {
        Self {
            drop_dir: drop_dir.into(),
        }
    }

    pub fn payload_path(&self, item_id: &str) -> PathBuf {
        self.drop_dir.join(format!("{}.json", item_id))
    }

    pub fn has_payload(&self, item_id: &str) -> bool {
        self.payload_path(item_id).is_file()
    }

    async fn read_payload(path: &Path) -> Result<ProviderPayload> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ProviderError::RequestFailed(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ProviderError::InvalidPayload(format!("{}: {}", path.display(), e)).into()
        })
    }
}

#[async_trait]
impl ProviderGateway for FileDropGateway {
    async fn fetch(&self, item: &ProviderItem, request: &FetchRequest) -> Result<ProviderPayload> {
        let path = self.payload_path(&item.id);
        tracing::debug!(
            "Reading payload for item {} from {} ({:?})",
            item.id,
            path.display(),
            request
        );
        let mut payload = Self::read_payload(&path).await?;
        if request.balances_only {
            for account in &mut payload.accounts {
                account.transactions = None;
                account.holdings = None;
            }
        }
        Ok(payload)
    }
}
