//! Sync runs and the account-level sync pipeline.
//!
//! Provider-item pipelines live in the connect crate; they build on the
//! pieces here: run records, stats, cancellation, account locks and the
//! account sync scheduler.

mod account_lock;
mod account_sync;
mod cancellation;
mod scheduler;
mod stats_collector;
mod sync_context;
mod sync_run_model;
mod sync_stats_model;
mod sync_traits;

pub use account_lock::*;
pub use account_sync::*;
pub use cancellation::*;
pub use scheduler::*;
pub use stats_collector::*;
pub use sync_context::*;
pub use sync_run_model::*;
pub use sync_stats_model::*;
pub use sync_traits::*;

#[cfg(test)]
mod tests;
