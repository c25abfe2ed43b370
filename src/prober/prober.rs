// The availability probe loop: open a throwaway port, have a random peer dial it, evaluate.

use anyhow::Result;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{Delay, DosState, PortChoice};
use crate::config::{Config, ConfigTrait};
use crate::daemon::{self, Daemon};
use crate::db::Store;
use crate::governor::Service;
use crate::metrics;
use crate::model::location::host_of;
use crate::model::{FleetError, NodeInfo, ProbeRequest, ProbeStatus};
use crate::network::{Firewall, PortBlocklist};
use crate::peers::Broadcaster;
use crate::rand;
use crate::ttl::TtlCache;

const COMPONENT: &str = "prober";
/// App name carried by probe requests; peers only use it for logging.
const PROBE_APP: &str = "fleetdprobe";

/// What one cycle did, mainly for tests and the node API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Guarded(String),
    Unusable(u16),
    UpnpFailed(u16),
    BindFailed(u16),
    PeerUnreachable(u16),
    UnknownStatus(u16),
    Failed(u16),
    Passed(u16),
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Guarded(_) => "guarded",
            ProbeOutcome::Unusable(_) => "unusable",
            ProbeOutcome::UpnpFailed(_) => "upnp_failed",
            ProbeOutcome::BindFailed(_) => "bind_failed",
            ProbeOutcome::PeerUnreachable(_) => "peer_unreachable",
            ProbeOutcome::UnknownStatus(_) => "unknown_status",
            ProbeOutcome::Failed(_) => "failed",
            ProbeOutcome::Passed(_) => "passed",
        }
    }
}

pub struct Deps {
    pub store: Arc<dyn Store>,
    pub daemon: Arc<dyn Daemon>,
    pub firewall: Arc<dyn Firewall>,
    pub broadcaster: Arc<Broadcaster>,
    pub blocklist: Arc<PortBlocklist>,
}

/// Temporary mappings opened for one probe.
#[derive(Default)]
struct Opened {
    rule: bool,
    upnp: bool,
}

pub struct AvailabilityProber {
    cfg: Arc<Config>,
    deps: Deps,
    /// Mutated only by the loop; the mutex is never held across an await.
    state: Mutex<DosState>,
    snapshot: ArcSwap<DosState>,
    unreachable: TtlCache<String>,
}

impl AvailabilityProber {
    pub fn new(cfg: Arc<Config>, deps: Deps) -> Self {
        let ttl = cfg.prober().unreachable_ttl.unwrap_or(Duration::from_secs(15 * 60));
        Self {
            cfg,
            deps,
            state: Mutex::new(DosState::default()),
            snapshot: ArcSwap::from_pointee(DosState::default()),
            unreachable: TtlCache::new(ttl, 1_000),
        }
    }

    /// Latest published state.
    pub fn state(&self) -> Arc<DosState> {
        self.snapshot.load_full()
    }

    fn interval(&self, delay: Delay) -> Duration {
        let p = self.cfg.prober();
        match delay {
            Delay::Short => p.short.unwrap_or(Duration::from_secs(15)),
            Delay::Medium => p.medium.unwrap_or(Duration::from_secs(60)),
            Delay::Normal => p.normal.unwrap_or(Duration::from_secs(4 * 60)),
            Delay::Long => p.long.unwrap_or(Duration::from_secs(60 * 60)),
            Delay::Guard => p.guard.unwrap_or(Duration::from_secs(2 * 60)),
        }
    }

    fn publish(&self) {
        let state = self.state.lock().clone();
        metrics::set_dos_state(state.dos_state_value, state.not_working.len());
        self.deps.blocklist.replace(state.not_working.iter().copied());
        self.snapshot.store(Arc::new(state));
    }

    /// Synced, confirmed, reachable at a public endpoint, and able to read the installed apps.
    async fn guard(&self) -> Result<BTreeSet<u16>, String> {
        if self.cfg.identity().ip.is_empty() {
            return Err("no public endpoint configured".to_string());
        }
        let key = self.deps.broadcaster.key().public_hex();
        let standing = daemon::standing(self.deps.daemon.as_ref(), &key)
            .await
            .map_err(|e| format!("{e:#}"))?;
        if !standing.sync.synced {
            return Err("daemon is not synced".to_string());
        }
        if !standing.confirmed {
            return Err("node is not confirmed".to_string());
        }
        let apps = self
            .deps
            .store
            .local_apps()
            .await
            .map_err(|e| format!("{e:#}"))?;
        Ok(apps.iter().flat_map(|a| a.spec.ports()).collect())
    }

    fn unusable(&self, used: &BTreeSet<u16>, port: u16) -> bool {
        used.contains(&port) || self.deps.firewall.is_blocked(port)
    }

    async fn open(&self, port: u16) -> Result<Opened, ()> {
        let mut opened = Opened::default();
        let firewall = &self.deps.firewall;
        if firewall.is_active().await.unwrap_or(false) {
            match firewall.allow(port).await {
                Ok(()) => opened.rule = true,
                Err(e) => warn!(component = COMPONENT, event = "rule_failed", port, error = %format!("{e:#}"), "cannot open probe port"),
            }
        }
        if firewall.upnp_enabled() {
            match firewall.map_upnp(port, PROBE_APP).await {
                Ok(()) => {
                    opened.upnp = true;
                    self.state.lock().on_upnp_success();
                }
                Err(e) => {
                    warn!(component = COMPONENT, event = "upnp_failed", port, error = %format!("{e:#}"), "cannot map probe port");
                    self.close(port, &opened).await;
                    return Err(());
                }
            }
        }
        Ok(opened)
    }

    async fn close(&self, port: u16, opened: &Opened) {
        let firewall = &self.deps.firewall;
        if opened.upnp {
            if let Err(e) = firewall.unmap_upnp(port, PROBE_APP).await {
                debug!(component = COMPONENT, event = "unmap_failed", port, error = %format!("{e:#}"), "probe mapping left behind");
            }
        }
        if opened.rule {
            if let Err(e) = firewall.deny(port).await {
                debug!(component = COMPONENT, event = "deny_failed", port, error = %format!("{e:#}"), "probe rule left behind");
            }
        }
    }

    async fn pick_peer(&self) -> Result<Option<NodeInfo>, FleetError> {
        let peers: Vec<NodeInfo> = self
            .deps
            .broadcaster
            .other_nodes()
            .await?
            .into_iter()
            .filter(|n| !self.unreachable.contains(&n.ip))
            .collect();
        Ok(rand::pick(&peers).cloned())
    }

    /// Runs one probe and returns its outcome with the delay before the next one.
    pub async fn probe_once(&self) -> (ProbeOutcome, Delay) {
        let used = match self.guard().await {
            Ok(used) => used,
            Err(reason) => return (ProbeOutcome::Guarded(reason), Delay::Guard),
        };
        let range = self.cfg.ports().clone();

        let choice = {
            let mut rng = ::rand::thread_rng();
            self.state
                .lock()
                .pick_port(&mut rng, &range, |p| self.unusable(&used, p))
        };
        let port = match choice {
            PortChoice::Probe(port) => port,
            PortChoice::Unusable(port) => return (ProbeOutcome::Unusable(port), Delay::Short),
        };

        let Ok(opened) = self.open(port).await else {
            let delay = self.state.lock().on_upnp_failure();
            return (ProbeOutcome::UpnpFailed(port), delay);
        };

        let listener = match TcpListener::bind(("0.0.0.0", port)).await {
            Ok(listener) => listener,
            Err(e) => {
                debug!(component = COMPONENT, event = "bind_failed", port, error = %e, "cannot bind probe listener");
                self.close(port, &opened).await;
                let delay = self.state.lock().on_bind_failure(port, &range);
                return (ProbeOutcome::BindFailed(port), delay);
            }
        };
        let accepting = CancellationToken::new();
        let acceptor = tokio::spawn(accept_until(listener, accepting.clone()));

        let result = self.ask_peer(port).await;
        accepting.cancel();
        // The port is free again once the listener is dropped.
        let _ = acceptor.await;
        self.close(port, &opened).await;

        let mut state = self.state.lock();
        match result {
            Err(peer) => {
                if let Some(peer) = peer {
                    self.unreachable.mark(peer);
                }
                (ProbeOutcome::PeerUnreachable(port), state.on_unreachable_peer(port))
            }
            Ok(ProbeStatus::Success) => (ProbeOutcome::Passed(port), state.on_success(port, &range)),
            Ok(ProbeStatus::Error) => (ProbeOutcome::Failed(port), state.on_error(port, &range)),
            Ok(ProbeStatus::Unknown) => (ProbeOutcome::UnknownStatus(port), state.on_unknown_status(port)),
        }
    }

    /// Asks a random peer to dial `port`. The error carries the peer to avoid for a while.
    async fn ask_peer(&self, port: u16) -> Result<ProbeStatus, Option<String>> {
        let peer = match self.pick_peer().await {
            Ok(Some(peer)) => peer,
            Ok(None) => return Err(None),
            Err(e) => {
                debug!(component = COMPONENT, event = "node_list_failed", error = %e, "cannot list peers");
                return Err(None);
            }
        };
        let identity = self.cfg.identity();
        let request = ProbeRequest::signed(
            host_of(&identity.ip),
            identity.api_port,
            PROBE_APP,
            vec![port],
            self.deps.broadcaster.key(),
        );
        let timeout = self.cfg.prober().peer_timeout.unwrap_or(Duration::from_secs(30));
        match self
            .deps
            .broadcaster
            .peers()
            .check_availability(&peer, &request, timeout)
            .await
        {
            Ok(resp) => {
                if resp.status == ProbeStatus::Unknown {
                    warn!(component = COMPONENT, event = "unknown_status", peer = %peer.ip, message = %resp.message, "peer answered with an unknown status");
                }
                Ok(resp.status)
            }
            Err(e) => {
                debug!(component = COMPONENT, event = "peer_unreachable", peer = %peer.ip, error = %e, "probe peer unreachable");
                Err(Some(peer.ip))
            }
        }
    }
}

/// Accepts and drops connections until cancelled.
async fn accept_until(listener: TcpListener, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            accepted = listener.accept() => {
                if accepted.is_err() {
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Service for AvailabilityProber {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    fn enabled(&self) -> bool {
        self.cfg.prober().enabled
    }

    async fn tick(&self) -> Result<Duration> {
        let (outcome, delay) = self.probe_once().await;
        self.publish();
        metrics::add_probe(outcome.as_str());
        let state = self.state();
        if let (true, Some(message)) = (state.is_saturated(), state.dos_message.as_deref()) {
            warn!(component = COMPONENT, event = "dos", dos = state.dos_state_value, message, "node is blocked");
        }
        info!(
            component = COMPONENT,
            event = "probed",
            outcome = outcome.as_str(),
            dos = state.dos_state_value,
            not_working = state.not_working.len(),
            next = ?delay,
            "probe cycle finished"
        );
        Ok(self.interval(delay))
    }

    fn retry_delay(&self) -> Duration {
        self.interval(Delay::Guard)
    }
}
