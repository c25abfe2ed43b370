//! Loop orchestration: one task per registered service, switched through its transport.

use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::api::Governor;
use super::service::Service;
use super::transport::{ChanneledTransport, Transport};
use crate::dedlog;

#[derive(Default)]
struct LoopState {
    enabled: AtomicBool,
    cycles: AtomicU64,
    failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Runtime view of one loop.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub name: String,
    pub enabled: bool,
    pub cycles: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

struct Entry {
    transport: Arc<dyn Transport>,
    state: Arc<LoopState>,
    handle: Option<JoinHandle<()>>,
}

/// Orchestrator manages services and their loops.
pub struct Orchestrator {
    shutdown_token: CancellationToken,
    srvs: Mutex<BTreeMap<&'static str, Entry>>,
}

impl Orchestrator {
    pub fn new(shutdown_token: CancellationToken) -> Self {
        Self {
            shutdown_token,
            srvs: Mutex::new(BTreeMap::new()),
        }
    }

    fn send_signal<F>(&self, name: &str, action: &'static str, send: F) -> Result<()>
    where
        F: FnOnce(&Arc<dyn Transport>) -> bool,
    {
        let srvs = self.srvs.lock();
        let entry = srvs
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("governor: no such {} loop", name))?;
        if !send(&entry.transport) {
            anyhow::bail!("governor: cannot {action} {name}, signal was not sent");
        }
        info!(component = "governor", event = "signal", srv = %name, action, "signal sent");
        Ok(())
    }

    /// Waits for every loop task to exit.
    pub async fn join(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .srvs
            .lock()
            .values_mut()
            .filter_map(|e| e.handle.take())
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Governor for Orchestrator {
    fn register(&self, s: Arc<dyn Service>) {
        let mut srvs = self.srvs.lock();
        let name = s.name();
        if srvs.contains_key(name) {
            warn!(component = "governor", event = "duplicate", srv = %name, "loop already registered");
            return;
        }

        let transport = ChanneledTransport::new();
        let state = Arc::new(LoopState::default());
        state.enabled.store(s.enabled(), Ordering::Relaxed);
        let handle = tokio::spawn(run(
            self.shutdown_token.clone(),
            s,
            transport.clone(),
            state.clone(),
        ));
        srvs.insert(
            name,
            Entry {
                transport,
                state,
                handle: Some(handle),
            },
        );
    }

    fn on(&self, name: &str) -> Result<()> {
        self.send_signal(name, "turn on", |t| t.on())
    }

    fn off(&self, name: &str) -> Result<()> {
        self.send_signal(name, "turn off", |t| t.off())
    }

    fn wake(&self, name: &str) -> Result<()> {
        self.send_signal(name, "wake", |t| t.wake())
    }

    fn stop(&self) {
        let srvs = self.srvs.lock();
        for (name, entry) in srvs.iter() {
            if entry.transport.stop() {
                info!(component = "governor", event = "stopping", srv = %name, "stopping loop");
            } else {
                error!(component = "governor", event = "stop_failed", srv = %name, "cannot stop, signal was not sent");
            }
        }
    }

    fn statuses(&self) -> Vec<ServiceStatus> {
        self.srvs
            .lock()
            .iter()
            .map(|(name, e)| ServiceStatus {
                name: name.to_string(),
                enabled: e.state.enabled.load(Ordering::Relaxed),
                cycles: e.state.cycles.load(Ordering::Relaxed),
                failures: e.state.failures.load(Ordering::Relaxed),
                last_error: e.state.last_error.lock().clone(),
            })
            .collect()
    }
}

async fn run(
    shutdown_token: CancellationToken,
    srv: Arc<dyn Service>,
    transport: Arc<dyn Transport>,
    state: Arc<LoopState>,
) {
    let name = srv.name();
    info!(component = "governor", event = "loop_started", srv = %name, enabled = state.enabled.load(Ordering::Relaxed), "loop started");
    loop {
        if !state.enabled.load(Ordering::Relaxed) {
            tokio::select! {
                _ = shutdown_token.cancelled() => break,
                _ = transport.on_stop() => break,
                _ = transport.on_on() => {
                    state.enabled.store(true, Ordering::Relaxed);
                    info!(component = "governor", event = "enabled", srv = %name, "loop enabled");
                }
                _ = transport.on_off() => {}
                _ = transport.on_wake() => {}
            }
            continue;
        }

        let delay = match srv.tick().await {
            Ok(delay) => {
                *state.last_error.lock() = None;
                delay
            }
            Err(e) => {
                let reason = format!("{e:#}");
                state.failures.fetch_add(1, Ordering::Relaxed);
                dedlog::err(name, Some(&reason), "loop cycle failed");
                *state.last_error.lock() = Some(reason);
                srv.retry_delay()
            }
        };
        state.cycles.fetch_add(1, Ordering::Relaxed);

        tokio::select! {
            _ = shutdown_token.cancelled() => break,
            _ = transport.on_stop() => break,
            _ = transport.on_off() => {
                state.enabled.store(false, Ordering::Relaxed);
                info!(component = "governor", event = "disabled", srv = %name, "loop disabled");
            }
            _ = transport.on_on() => {}
            _ = transport.on_wake() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }
    srv.shutdown().await;
    info!(component = "governor", event = "loop_stopped", srv = %name, "loop stopped");
}
