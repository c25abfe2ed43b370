// Package db provides dump/load of the store snapshot.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use super::memory::{MemoryStore, Snapshot};
use crate::governor::Service;

/// Error for when dump is not enabled.
#[derive(Debug, thiserror::Error)]
#[error("persistence mode is not enabled")]
pub struct DumpNotEnabledError;

/// Trait for persistence operations.
#[async_trait::async_trait]
pub trait Dumper: Send + Sync {
    /// Dumps the store to disk.
    async fn dump(&self) -> Result<()>;

    /// Loads the store from the last dump. A missing file is not an error.
    async fn load(&self) -> Result<()>;
}

/// Writes the whole store as one JSON document, atomically through a tmp file.
pub struct JsonDumper {
    enabled: bool,
    path: PathBuf,
    store: Arc<MemoryStore>,
}

impl JsonDumper {
    pub fn new(enabled: bool, path: PathBuf, store: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            enabled,
            path,
            store,
        })
    }
}

#[async_trait::async_trait]
impl Dumper for JsonDumper {
    async fn dump(&self) -> Result<()> {
        if !self.enabled {
            return Err(anyhow::anyhow!(DumpNotEnabledError));
        }
        let start = Instant::now();

        let snap = self.store.snapshot();
        let counts = (snap.local.len(), snap.global.len(), snap.permanent.len());
        let data = serde_json::to_vec(&snap).context("encode store snapshot")?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("create dump dir: {}", dir.display()))?;
            }
        }
        let tmp = PathBuf::from(format!("{}.tmp", self.path.display()));
        tokio::fs::write(&tmp, &data)
            .await
            .with_context(|| format!("write dump file: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("rename {} to {}", tmp.display(), self.path.display()))?;

        info!(
            component = "dump",
            event = "dump_finished",
            local = counts.0,
            global = counts.1,
            permanent = counts.2,
            bytes = data.len(),
            elapsed = ?start.elapsed(),
            "store dumped"
        );
        Ok(())
    }

    async fn load(&self) -> Result<()> {
        if !self.enabled {
            return Err(anyhow::anyhow!(DumpNotEnabledError));
        }
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    component = "dump",
                    event = "load_skipped",
                    path = %self.path.display(),
                    "no dump found, starting empty"
                );
                return Ok(());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("read dump file: {}", self.path.display()))
            }
        };
        let snap: Snapshot = serde_json::from_slice(&data)
            .with_context(|| format!("decode dump file: {}", self.path.display()))?;
        let local = snap.local.len();
        self.store.restore(snap);

        info!(
            component = "dump",
            event = "load_finished",
            local,
            path = %self.path.display(),
            "store restored"
        );
        Ok(())
    }
}

/// Periodic store snapshot loop; also dumps once when the loop stops.
pub struct SnapshotLoop {
    dumper: Arc<dyn Dumper>,
    enabled: bool,
    interval: Duration,
}

impl SnapshotLoop {
    pub fn new(dumper: Arc<dyn Dumper>, enabled: bool, interval: Duration) -> Self {
        Self {
            dumper,
            enabled,
            interval,
        }
    }
}

#[async_trait::async_trait]
impl Service for SnapshotLoop {
    fn name(&self) -> &'static str {
        "dumper"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn tick(&self) -> Result<Duration> {
        self.dumper.dump().await?;
        Ok(self.interval)
    }

    fn retry_delay(&self) -> Duration {
        self.interval
    }

    async fn shutdown(&self) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.dumper.dump().await {
            error!(component = "dump", event = "final_dump_failed", error = %format!("{e:#}"), "store not dumped on shutdown");
        }
    }
}
