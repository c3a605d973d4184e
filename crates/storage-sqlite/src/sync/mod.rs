//! SQLite storage implementation for sync runs.

mod model;
mod repository;

pub use model::SyncRunDB;
pub use repository::SyncRunRepository;
