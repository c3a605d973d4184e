//! Market data supplementation run before materialization.

mod fallback_importer;
mod market_data_traits;

pub use fallback_importer::*;
pub use market_data_traits::*;
