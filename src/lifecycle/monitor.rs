// Per-container resource sampling on two independent timers.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Lifecycle;
use crate::dedlog;
use crate::runtime::ContainerRuntime;
use crate::time;
use crate::volumes::Volumes;

const COMPONENT: &str = "monitor";

#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub timestamp: i64,
    pub cpu_percent: f64,
    pub memory_bytes: u64,
    pub net_rx: u64,
    pub net_tx: u64,
    pub block_read: u64,
    pub block_write: u64,
    /// Bytes used on the app volume.
    pub disk_bytes: u64,
}

/// Bounded rolling window; the oldest sample drops first.
struct Window {
    capacity: usize,
    samples: Mutex<VecDeque<Sample>>,
}

impl Window {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    fn push(&self, sample: Sample) {
        let mut samples = self.samples.lock();
        while samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    fn snapshot(&self) -> Vec<Sample> {
        self.samples.lock().iter().cloned().collect()
    }
}

struct Watch {
    token: CancellationToken,
    short: Arc<Window>,
    long: Arc<Window>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub short: Vec<Sample>,
    pub long: Vec<Sample>,
}

pub struct Monitor {
    runtime: Arc<dyn ContainerRuntime>,
    volumes: Arc<dyn Volumes>,
    short_period: Duration,
    short_window: usize,
    long_period: Duration,
    long_window: usize,
    watches: DashMap<String, Watch>,
}

impl Monitor {
    pub fn new(cfg: &Lifecycle, runtime: Arc<dyn ContainerRuntime>, volumes: Arc<dyn Volumes>) -> Self {
        Self {
            runtime,
            volumes,
            short_period: cfg.monitor_short_period.unwrap_or(Duration::from_secs(60)),
            short_window: cfg.monitor_short_window,
            long_period: cfg.monitor_long_period.unwrap_or(Duration::from_secs(15 * 60)),
            long_window: cfg.monitor_long_window,
            watches: DashMap::new(),
        }
    }

    /// Starts both timers for `container`. A running watch is left as is.
    pub fn start(&self, container: &str, container_id: &str, volume: &str) {
        if self.watches.contains_key(container) {
            return;
        }
        let watch = Watch {
            token: CancellationToken::new(),
            short: Arc::new(Window::new(self.short_window)),
            long: Arc::new(Window::new(self.long_window)),
        };
        for (period, window) in [(self.short_period, watch.short.clone()), (self.long_period, watch.long.clone())] {
            tokio::spawn(sample_loop(
                watch.token.clone(),
                period,
                window,
                self.runtime.clone(),
                self.volumes.clone(),
                container_id.to_string(),
                volume.to_string(),
            ));
        }
        self.watches.insert(container.to_string(), watch);
        debug!(component = COMPONENT, event = "started", container, "monitoring started");
    }

    pub fn stop(&self, container: &str) {
        if let Some((_, watch)) = self.watches.remove(container) {
            watch.token.cancel();
            debug!(component = COMPONENT, event = "stopped", container, "monitoring stopped");
        }
    }

    pub fn stop_all(&self) {
        for entry in self.watches.iter() {
            entry.value().token.cancel();
        }
        self.watches.clear();
    }

    pub fn is_monitored(&self, container: &str) -> bool {
        self.watches.contains_key(container)
    }

    pub fn snapshot(&self, container: &str) -> Option<MonitorSnapshot> {
        self.watches.get(container).map(|w| MonitorSnapshot {
            short: w.short.snapshot(),
            long: w.long.snapshot(),
        })
    }
}

async fn sample_loop(
    token: CancellationToken,
    period: Duration,
    window: Arc<Window>,
    runtime: Arc<dyn ContainerRuntime>,
    volumes: Arc<dyn Volumes>,
    container_id: String,
    volume: String,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = interval.tick() => {}
        }
        let stats = match runtime.stats(&container_id).await {
            Ok(stats) => stats,
            Err(e) => {
                dedlog::err(COMPONENT, Some(&format!("{e:#}")), "container stats failed");
                continue;
            }
        };
        let disk_bytes = volumes.usage(&volume).await.unwrap_or_default();
        window.push(Sample {
            timestamp: time::unix_millis(),
            cpu_percent: stats.cpu_percent,
            memory_bytes: stats.memory_bytes,
            net_rx: stats.net_rx,
            net_tx: stats.net_tx,
            block_read: stats.block_read,
            block_write: stats.block_write,
            disk_bytes,
        });
    }
}
