// HTTP module: server, outbound client and JSON rendering.

pub mod client;
pub mod render;
pub mod server;

pub use crate::middleware::middleware::Middleware;
pub use crate::middleware::recover_middleware::panics_counter;

pub use server::HttpServer;

// Common controller interface
pub use crate::controller::controller::Controller;
