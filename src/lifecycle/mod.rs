//! Local application lifecycle: install, remove, redeploy, container actions and monitoring.

pub mod guard;
pub mod manager;
pub mod monitor;
pub mod resources;
pub mod rollback;

pub use guard::{OperationFlags, OperationGuard};
pub use manager::{redeploy_mode, Deps, LifecycleManager, Mode};
pub use monitor::{MonitorSnapshot, Sample};
