//! SQLite storage implementation for provider items and their accounts.

mod model;
mod repository;

pub use model::{ProviderAccountDB, ProviderItemDB};
pub use repository::ProviderItemRepository;
