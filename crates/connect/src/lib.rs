//! Ledgersync Connect - provider item sync pipelines.
//!
//! Pulls remote accounts and transactions through a [`ProviderGateway`],
//! folds them into the ledger and hands affected accounts to the
//! [`SyncJobRunner`], which recomputes their balances.
//!
//! [`ProviderGateway`]: ledgersync_core::providers::ProviderGateway

pub mod config;
pub mod item_sync;
pub mod progress;
pub mod runner;


pub use config::SyncConfig;
pub use item_sync::{
    FetchPlan, ItemSyncOutcome, ItemSyncPipeline, PlaidItemSyncer, ProviderItemSyncOrchestrator,
    SimpleFinItemSyncer,
};
pub use progress::{NoOpProgressReporter, SyncProgressPayload, SyncProgressReporter};
pub use runner::{ItemSyncRequest, ItemSyncReport, SyncJobRunner};
