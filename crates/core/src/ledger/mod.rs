//! Ledger entries - the signed, dated amounts balances are derived from.

mod ledger_model;
mod ledger_traits;

pub use ledger_model::*;
pub use ledger_traits::*;
