// Package governor provides the Governor interface.

use anyhow::Result;
use std::sync::Arc;

use super::governor::ServiceStatus;
use super::service::Service;

/// Governor drives registered loops and switches them at runtime.
pub trait Governor: Send + Sync {
    /// Registers a service and starts its loop. A second registration under the same name is
    /// ignored.
    fn register(&self, s: Arc<dyn Service>);

    fn on(&self, name: &str) -> Result<()>;

    fn off(&self, name: &str) -> Result<()>;

    /// Runs the next cycle of `name` now.
    fn wake(&self, name: &str) -> Result<()>;

    /// Stops every loop.
    fn stop(&self);

    fn statuses(&self) -> Vec<ServiceStatus>;
}
