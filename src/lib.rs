//! fleetd: a decentralized application orchestration node.
//!
//! Every node keeps the global specification registry in sync with the ledger, decides on its
//! own which applications to host, runs them in containers and proves its ports are reachable.

#[path = "shared/dedlog/mod.rs"]
pub mod dedlog;
#[path = "shared/rand/mod.rs"]
pub mod rand;
#[path = "shared/rate/mod.rs"]
pub mod rate;
#[path = "shared/time/mod.rs"]
pub mod time;
#[path = "shared/ttl/mod.rs"]
pub mod ttl;
#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod app;
pub mod config;
pub mod controller;
pub mod crypto;
pub mod daemon;
pub mod db;
pub mod gossip;
pub mod governor;
pub mod http;
pub mod lifecycle;
pub mod metrics;
pub mod middleware;
pub mod model;
pub mod network;
pub mod peers;
pub mod prober;
pub mod registry;
pub mod reinstaller;
pub mod runtime;
pub mod scheduler;
pub mod shutdown;
pub mod volumes;
pub mod watcher;
