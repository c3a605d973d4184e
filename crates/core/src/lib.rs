//! Ledgersync Core - Domain entities, services, and traits.
//!
//! Ledger-derived balance materialization and the account-level sync
//! pipeline. The crate is database-agnostic: it defines repository traits
//! that the `storage-sqlite` crate implements.

pub mod accounts;
pub mod balances;
pub mod constants;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod market_data;
pub mod providers;
pub mod sync;
pub mod telemetry;
pub mod transfers;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
