// Builds every node subsystem on top of a set of external adapters.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ConfigTrait};
use crate::crypto::NodeKey;
use crate::daemon::{Daemon, RpcDaemon};
use crate::db::{Dumper, JsonDumper, MemoryStore, SnapshotLoop, Store};
use crate::gossip::{Announcer, GossipHandler};
use crate::governor::{Governor, Orchestrator, Service};
use crate::http::client::create_client;
use crate::lifecycle::{self, LifecycleManager, OperationFlags};
use crate::network::{Firewall, HostFirewall, PortBlocklist};
use crate::peers::{Broadcaster, HttpPeerClient, PeerClient};
use crate::prober::{self, AvailabilityProber, ProbeResponder};
use crate::registry::{ImagePolicy, Registry};
use crate::reinstaller::Reinstaller;
use crate::runtime::{ContainerRuntime, DockerRuntime};
use crate::scheduler::{self, Spawner};
use crate::volumes::{LoopVolumes, Volumes};
use crate::watcher::{self, Watcher};

/// External collaborators. Production uses the host adapters; tests pass in-memory doubles.
pub struct Adapters {
    pub store: Arc<dyn Store>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub volumes: Arc<dyn Volumes>,
    pub firewall: Arc<dyn Firewall>,
    pub daemon: Arc<dyn Daemon>,
    pub peers: Arc<dyn PeerClient>,
    /// Snapshot writer for the store, when it supports one.
    pub dumper: Option<Arc<dyn Dumper>>,
}

impl Adapters {
    /// Docker, the ledger daemon over JSON-RPC, ufw/upnpc, loop volumes and HTTP peers.
    pub fn host(cfg: &Config) -> Self {
        let client = create_client();
        let rt = cfg.runtime();
        let daemon_cfg = cfg.daemon();
        let store = Arc::new(MemoryStore::new());
        let dumper: Arc<dyn Dumper> = JsonDumper::new(
            cfg.store().dump_enabled,
            cfg.store().path.clone(),
            store.clone(),
        );
        Self {
            runtime: Arc::new(DockerRuntime::new(
                client.clone(),
                &rt.endpoint,
                &rt.container_prefix,
                rt.timeout.unwrap_or(Duration::from_secs(60)),
            )),
            daemon: Arc::new(RpcDaemon::new(
                client.clone(),
                &daemon_cfg.url,
                daemon_cfg.user.as_deref(),
                daemon_cfg.password.as_deref(),
                daemon_cfg.timeout.unwrap_or(Duration::from_secs(30)),
            )),
            volumes: Arc::new(LoopVolumes::new(
                cfg.volumes().dir.clone(),
                cfg.volumes().mount_jobs,
            )),
            firewall: Arc::new(HostFirewall::new(cfg.ports(), cfg.upnp())),
            peers: Arc::new(HttpPeerClient::new(client, cfg.identity().api_port)),
            store,
            dumper: Some(dumper),
        }
    }
}

/// Every subsystem of one node, shared by the loops and the HTTP controllers.
pub struct Components {
    pub cfg: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub daemon: Arc<dyn Daemon>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub firewall: Arc<dyn Firewall>,
    pub dumper: Option<Arc<dyn Dumper>>,
    pub broadcaster: Arc<Broadcaster>,
    pub images: Arc<ImagePolicy>,
    pub registry: Arc<Registry>,
    pub lifecycle: Arc<LifecycleManager>,
    pub announcer: Arc<Announcer>,
    pub gossip: Arc<GossipHandler>,
    pub spawner: Arc<Spawner>,
    pub prober: Arc<AvailabilityProber>,
    pub responder: Arc<ProbeResponder>,
    pub watcher: Arc<Watcher>,
    pub reinstaller: Arc<Reinstaller>,
    pub governor: Arc<Orchestrator>,
}

/// Node key from the configured hex secret, or a throwaway one.
pub fn node_key(cfg: &Config) -> Result<NodeKey> {
    match cfg.identity().secret.as_deref() {
        Some(secret) => NodeKey::from_hex(secret).context("identity.secret"),
        None => Ok(NodeKey::generate()),
    }
}

impl Components {
    pub fn build(shutdown_token: CancellationToken, cfg: Arc<Config>, adapters: Adapters) -> Result<Self> {
        let key = node_key(&cfg)?;
        let Adapters {
            store,
            runtime,
            volumes,
            firewall,
            daemon,
            peers,
            dumper,
        } = adapters;

        let broadcaster = Arc::new(Broadcaster::new(
            daemon.clone(),
            peers,
            key,
            cfg.identity().endpoint(),
            cfg.locations().gossip_rate,
        ));
        let images = Arc::new(ImagePolicy::new(cfg.apps().images.clone(), runtime.clone()));
        let registry = Arc::new(Registry::new(cfg.clone(), store.clone(), images.clone()));
        let blocklist = PortBlocklist::new();
        let lifecycle = Arc::new(LifecycleManager::new(
            cfg.clone(),
            lifecycle::Deps {
                store: store.clone(),
                runtime: runtime.clone(),
                volumes,
                firewall: firewall.clone(),
                daemon: daemon.clone(),
                images: images.clone(),
                broadcaster: broadcaster.clone(),
                flags: OperationFlags::new(),
                blocklist: blocklist.clone(),
            },
        ));
        let announcer = Arc::new(Announcer::new(cfg.clone(), store.clone(), broadcaster.clone()));
        let gossip = Arc::new(GossipHandler::new(
            &cfg,
            daemon.clone(),
            store.clone(),
            registry.clone(),
            broadcaster.clone(),
        ));
        let spawner = Arc::new(Spawner::new(
            cfg.clone(),
            scheduler::Deps {
                store: store.clone(),
                daemon: daemon.clone(),
                images: images.clone(),
                lifecycle: lifecycle.clone(),
                announcer: announcer.clone(),
                broadcaster: broadcaster.clone(),
            },
        ));
        let prober = Arc::new(AvailabilityProber::new(
            cfg.clone(),
            prober::Deps {
                store: store.clone(),
                daemon: daemon.clone(),
                firewall: firewall.clone(),
                broadcaster: broadcaster.clone(),
                blocklist,
            },
        ));
        let responder = Arc::new(ProbeResponder::new(
            daemon.clone(),
            cfg.prober().dial_timeout.unwrap_or(Duration::from_secs(5)),
        ));
        let watcher = Arc::new(Watcher::new(
            cfg.clone(),
            watcher::Deps {
                store: store.clone(),
                daemon: daemon.clone(),
                registry: registry.clone(),
                lifecycle: lifecycle.clone(),
                gossip: gossip.clone(),
            },
        ));
        let reinstaller = Arc::new(Reinstaller::new(
            cfg.clone(),
            store.clone(),
            lifecycle.clone(),
            announcer.clone(),
        ));

        Ok(Self {
            governor: Arc::new(Orchestrator::new(shutdown_token)),
            cfg,
            store,
            daemon,
            runtime,
            firewall,
            dumper,
            broadcaster,
            images,
            registry,
            lifecycle,
            announcer,
            gossip,
            spawner,
            prober,
            responder,
            watcher,
            reinstaller,
        })
    }

    /// Every background loop, in start order.
    pub fn services(&self) -> Vec<Arc<dyn Service>> {
        let mut services: Vec<Arc<dyn Service>> = vec![
            self.watcher.clone() as Arc<dyn Service>,
            self.announcer.clone() as Arc<dyn Service>,
            self.spawner.clone() as Arc<dyn Service>,
            self.prober.clone() as Arc<dyn Service>,
            self.reinstaller.clone() as Arc<dyn Service>,
        ];
        if let Some(dumper) = &self.dumper {
            let store = self.cfg.store();
            services.push(Arc::new(SnapshotLoop::new(
                dumper.clone(),
                store.dump_enabled,
                store.interval.unwrap_or(Duration::from_secs(300)),
            )));
        }
        services
    }

    /// Registers and starts every loop with the governor.
    pub fn start_loops(&self) {
        for service in self.services() {
            self.governor.register(service);
        }
    }
}
