//! Fleet gossip: inbound envelope handling and the location announcer loop.

pub mod announcer;
pub mod handler;

pub use announcer::Announcer;
pub use handler::{AppRequest, GossipHandler, GossipOutcome};
