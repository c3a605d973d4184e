//! Balance series - snapshots, the two calculation strategies, and the
//! materializer that persists them.

mod balance_calculator;
mod balance_model;
mod balance_traits;
mod materializer;

pub use balance_calculator::*;
pub use balance_model::*;
pub use balance_traits::*;
pub use materializer::*;
