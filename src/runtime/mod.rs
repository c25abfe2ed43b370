//! Container runtime seam.
//!
//! The lifecycle manager and the scheduler only talk to [`ContainerRuntime`]; the Docker
//! Engine adapter lives in [`docker`].

pub mod docker;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::mpsc;

pub use docker::DockerRuntime;

/// Label carrying the owning application name.
pub const LABEL_APP: &str = "fleet.app";
/// Label carrying the component name.
pub const LABEL_COMPONENT: &str = "fleet.component";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

/// Everything needed to create one container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    pub ports: Vec<PortBinding>,
    /// Host directory bound at `container_data`.
    pub volume: Option<(PathBuf, String)>,
    pub cpu: f64,
    pub ram_mb: f64,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: String,
    pub labels: BTreeMap<String, String>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    pub fn app(&self) -> Option<&str> {
        self.labels.get(LABEL_APP).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub memory_limit: u64,
    pub net_rx: u64,
    pub net_tx: u64,
    pub block_read: u64,
    pub block_write: u64,
}

/// Registry facts about an image that has not been pulled.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoteImage {
    pub architectures: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
    Pause,
    Unpause,
    Kill,
}

impl ContainerAction {
    pub fn parse(s: &str) -> Option<ContainerAction> {
        match s {
            "start" => Some(ContainerAction::Start),
            "stop" => Some(ContainerAction::Stop),
            "restart" => Some(ContainerAction::Restart),
            "pause" => Some(ContainerAction::Pause),
            "unpause" => Some(ContainerAction::Unpause),
            "kill" => Some(ContainerAction::Kill),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
            ContainerAction::Pause => "pause",
            ContainerAction::Unpause => "unpause",
            ContainerAction::Kill => "kill",
        }
    }

    /// Constructive actions run components in declared order, the rest in reverse.
    pub fn is_constructive(&self) -> bool {
        matches!(
            self,
            ContainerAction::Start | ContainerAction::Restart | ContainerAction::Unpause
        )
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait::async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Engine architecture in registry notation (`amd64`, `arm64`).
    async fn architecture(&self) -> Result<String>;

    /// Pulls `image`, forwarding progress lines when a sink is given.
    async fn pull(&self, image: &str, progress: Option<mpsc::UnboundedSender<String>>) -> Result<()>;

    /// Looks the image up in its registry without pulling it.
    async fn inspect_remote(&self, image: &str) -> Result<RemoteImage>;

    /// Size in bytes of a pulled image.
    async fn image_size(&self, image: &str) -> Result<u64>;

    async fn remove_image(&self, image: &str) -> Result<()>;

    /// Returns the container id.
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;

    async fn act(&self, id: &str, action: ContainerAction) -> Result<()>;

    async fn remove(&self, id: &str) -> Result<()>;

    async fn stats(&self, id: &str) -> Result<ContainerStats>;

    async fn exec(&self, id: &str, cmd: &[String], env: &[String]) -> Result<String>;

    /// Containers whose name carries the reserved prefix.
    async fn list(&self, all: bool) -> Result<Vec<ContainerSummary>>;
}
