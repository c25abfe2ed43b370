//! Background loop orchestration.

pub mod api;
pub mod governor;
pub mod service;
pub mod transport;

pub use api::Governor;
pub use self::governor::{Orchestrator, ServiceStatus};
pub use service::Service;
pub use transport::Transport;
