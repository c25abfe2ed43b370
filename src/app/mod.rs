// Node application assembly.

#[allow(clippy::module_inception)]
pub mod app;
pub mod components;
pub mod server;

pub use app::App;
pub use components::{node_key, Adapters, Components};
pub use server::NodeServer;
