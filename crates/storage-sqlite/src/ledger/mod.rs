//! SQLite storage implementation for ledger entries.

mod model;
mod repository;

pub use model::LedgerEntryDB;
pub use repository::LedgerRepository;
