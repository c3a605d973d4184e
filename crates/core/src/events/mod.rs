//! Domain events module.
//!
//! Domain event types and the sink trait used to publish them after
//! successful mutations. The worker (or any embedding runtime) implements the
//! sink to fan events out to whatever listens for them.

mod domain_event;
mod sink;

pub use domain_event::*;
pub use sink::*;
