// Compensating teardown for half-finished installs.

use std::sync::Arc;
use tracing::warn;

use super::monitor::Monitor;
use crate::network::Firewall;
use crate::runtime::{ContainerAction, ContainerRuntime};
use crate::volumes::Volumes;

const COMPONENT: &str = "lifecycle";

/// Side effects on the host a lifecycle step may have to undo.
pub struct Host {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub volumes: Arc<dyn Volumes>,
    pub firewall: Arc<dyn Firewall>,
    pub monitor: Monitor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Undo {
    Image(String),
    Volume(String),
    MountJob(String),
    Container(String),
    Rule(u16),
    Upnp(u16, String),
    Monitor(String),
}

/// Steps recorded in execution order and undone in reverse.
#[derive(Debug, Default)]
pub struct Rollback {
    steps: Vec<Undo>,
}

impl Rollback {
    pub fn push(&mut self, step: Undo) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Undo] {
        &self.steps
    }

    /// Undoes every step. Each failure is logged and the walk continues.
    pub async fn run(self, host: &Host) {
        for step in self.steps.into_iter().rev() {
            let result = match &step {
                Undo::Monitor(container) => {
                    host.monitor.stop(container);
                    Ok(())
                }
                Undo::Upnp(port, label) => host.firewall.unmap_upnp(*port, label).await,
                Undo::Rule(port) => host.firewall.deny(*port).await,
                Undo::Container(id) => {
                    let _ = host.runtime.act(id, ContainerAction::Stop).await;
                    host.runtime.remove(id).await
                }
                Undo::MountJob(name) => host.volumes.unregister_mount_job(name).await,
                Undo::Volume(name) => host.volumes.destroy(name).await,
                Undo::Image(image) => host.runtime.remove_image(image).await,
            };
            if let Err(e) = result {
                warn!(
                    component = COMPONENT,
                    event = "rollback_step_failed",
                    step = ?step,
                    error = %format!("{e:#}"),
                    "compensation step failed"
                );
            }
        }
    }
}
