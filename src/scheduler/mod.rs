//! Distributed scheduler: each node independently and probabilistically picks apps to host.

pub mod eligibility;
pub mod spawner;

pub use eligibility::Skip;
pub use spawner::{Cycle, Deps, Spawner};
