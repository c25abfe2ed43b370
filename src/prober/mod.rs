//! Availability prober: keeps checking that this node's app ports are reachable from the
//! internet and tracks a DOS score when they are not.

pub mod prober;
pub mod responder;
pub mod state;

pub use prober::{AvailabilityProber, Deps, ProbeOutcome};
pub use responder::ProbeResponder;
pub use state::{Delay, DosState, PortChoice};
