//! Provider connections, the accounts they expose, and the collaborator
//! traits used to fetch and normalize their data.

mod normalizer;
mod provider_model;
mod provider_traits;
mod repair;

pub use normalizer::*;
pub use provider_model::*;
pub use provider_traits::*;
pub use repair::*;
