// Shared test support: doubles for every external seam, builders and a wired node.

pub mod fakes;
pub mod fixtures;
pub mod harness;

pub use harness::{peer_key, TestNode, PEER_IPS, SELF_IP};
