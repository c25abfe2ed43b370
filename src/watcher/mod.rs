//! Ledger watcher loop driving promotion and expiry of specifications.

#[allow(clippy::module_inception)]
pub mod watcher;

pub use watcher::{Deps, Pass, Watcher};
