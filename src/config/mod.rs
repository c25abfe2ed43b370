// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::hardware::{Resources, TieredResources};
use crate::model::Tier;

pub const PROD: &str = "prod";
#[allow(dead_code)]
pub const DEV: &str = "dev";
#[allow(dead_code)]
pub const TEST: &str = "test";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Node {
    #[serde(rename = "node")]
    pub node: NodeBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeBox {
    pub env: String,
    pub logs: Option<Logs>,
    pub api: Option<Api>,
    pub identity: Identity,
    #[serde(default)]
    pub ports: Ports,
    #[serde(default)]
    pub upnp: Upnp,
    pub daemon: Daemon,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub volumes: Volumes,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub apps: Apps,
    #[serde(default)]
    pub scheduler: Scheduler,
    #[serde(default)]
    pub prober: Prober,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub locations: Locations,
    #[serde(default)]
    pub watcher: Watcher,
    #[serde(default)]
    pub reinstaller: Reinstaller,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Api {
    pub name: Option<String>,
    pub port: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

/// Who this node is on the network.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Identity {
    /// Public ip as registered in the node list.
    pub ip: String,
    pub api_port: u16,
    /// Hex ed25519 secret. A throwaway key is generated when absent.
    pub secret: Option<String>,
    /// `CONTINENT_COUNTRY_REGION`.
    pub geolocation: Option<String>,
    /// Tier override; normally taken from the node list.
    pub tier: Option<Tier>,
}

impl Identity {
    /// `ip:port` form used in gossip and locations.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.api_port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Ports {
    pub min: u16,
    pub max: u16,
    pub banned: Vec<u16>,
    pub user_blocked: Vec<u16>,
    pub upnp_banned: Vec<u16>,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            min: 31000,
            max: 39999,
            banned: Vec::new(),
            user_blocked: Vec::new(),
            upnp_banned: Vec::new(),
        }
    }
}

impl Ports {
    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Upnp {
    pub enabled: bool,
    /// Firewall rules are only touched when the host firewall is active.
    pub firewall: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Daemon {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Address app owners pay registrations and updates to.
    pub payment_address: String,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Container engine HTTP endpoint.
    pub endpoint: String,
    pub container_prefix: String,
    /// Overrides the architecture reported by the engine.
    pub architecture: Option<String>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:2375".to_string(),
            container_prefix: "fleet".to_string(),
            architecture: None,
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Volumes {
    pub dir: PathBuf,
    /// Register `@reboot` crontab mount jobs.
    pub mount_jobs: bool,
}

impl Default for Volumes {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/lib/fleetd/volumes"),
            mount_jobs: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Store {
    pub dump_enabled: bool,
    pub path: PathBuf,
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            dump_enabled: true,
            path: PathBuf::from("data/fleetd.store.json"),
            interval: Some(Duration::from_secs(300)),
        }
    }
}

/// One row of the height-bucketed price table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PriceBucket {
    pub height: u64,
    pub cpu: f64,
    pub ram: f64,
    pub hdd: f64,
    pub minimum: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Images {
    /// Allowed repository prefixes; empty allows any repository.
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    /// Ask the registry whether the image exists and fits.
    pub check_registry: bool,
    /// Bytes.
    pub max_size: u64,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            check_registry: true,
            max_size: 2 * 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Apps {
    pub price: Vec<PriceBucket>,
    pub min_instances: u32,
    pub max_instances: u32,
    pub blocks_lasting: u64,
    #[serde(with = "humantime_serde")]
    pub provisional_ttl: Option<Duration>,
    pub max_components: usize,
    pub max_name_len: usize,
    pub reserved_prefixes: Vec<String>,
    pub images: Images,
    pub tiers: TieredResources,
    pub system_reserve: Resources,
    /// Heights from which specification versions are accepted. Unlisted versions are always accepted.
    pub version_heights: Vec<VersionGate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct VersionGate {
    pub version: u8,
    pub height: u64,
}

impl Default for Apps {
    fn default() -> Self {
        Self {
            price: vec![
                PriceBucket { height: 0, cpu: 3.0, ram: 1.0, hdd: 0.5, minimum: 1.0 },
                PriceBucket { height: 983_000, cpu: 0.3, ram: 0.1, hdd: 0.05, minimum: 0.1 },
                PriceBucket { height: 1_004_000, cpu: 0.06, ram: 0.02, hdd: 0.01, minimum: 0.01 },
            ],
            min_instances: 3,
            max_instances: 100,
            blocks_lasting: 22_000,
            provisional_ttl: Some(Duration::from_secs(60 * 60)),
            max_components: 5,
            max_name_len: 32,
            reserved_prefixes: vec!["fleet".to_string(), "zel".to_string()],
            images: Images::default(),
            tiers: TieredResources {
                cumulus: Resources::new(4.0, 8000.0, 220.0),
                nimbus: Resources::new(8.0, 32000.0, 440.0),
                stratus: Resources::new(16.0, 64000.0, 880.0),
            },
            system_reserve: Resources::new(1.0, 2000.0, 60.0),
            version_heights: Vec::new(),
        }
    }
}

impl Apps {
    /// Bucket in force at `height`: the last row whose height is not above it.
    pub fn price_at(&self, height: u64) -> PriceBucket {
        self.price
            .iter()
            .filter(|b| b.height <= height)
            .max_by_key(|b| b.height)
            .or_else(|| self.price.first())
            .copied()
            .unwrap_or(PriceBucket { height: 0, cpu: 3.0, ram: 1.0, hdd: 0.5, minimum: 1.0 })
    }

    /// Whether specifications of `version` are accepted at `height`.
    pub fn version_active(&self, version: u8, height: u64) -> bool {
        self.version_heights
            .iter()
            .filter(|g| g.version == version)
            .all(|g| height >= g.height)
    }

    /// Tier ceiling available to apps once the system reserve is held back.
    pub fn usable(&self, tier: Tier) -> Resources {
        self.tiers.get(tier).saturating_sub(&self.system_reserve)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Scheduler {
    pub enabled: bool,
    pub probability: f64,
    #[serde(with = "humantime_serde")]
    pub base_delay: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub evaluated_ttl: Option<Duration>,
    /// One cycle in `geo_override` samples only geo-matching apps.
    pub geo_override: u32,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            enabled: true,
            probability: 100.0,
            base_delay: Some(Duration::from_secs(120)),
            evaluated_ttl: Some(Duration::from_secs(30 * 60)),
            geo_override: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Prober {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub short: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub medium: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub normal: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub long: Option<Duration>,
    /// Wait after a failed guard check.
    #[serde(with = "humantime_serde")]
    pub guard: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub peer_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub unreachable_ttl: Option<Duration>,
    /// Per-port dial timeout when answering a peer's probe.
    #[serde(with = "humantime_serde")]
    pub dial_timeout: Option<Duration>,
}

impl Default for Prober {
    fn default() -> Self {
        Self {
            enabled: true,
            short: Some(Duration::from_secs(15)),
            medium: Some(Duration::from_secs(60)),
            normal: Some(Duration::from_secs(4 * 60)),
            long: Some(Duration::from_secs(60 * 60)),
            guard: Some(Duration::from_secs(2 * 60)),
            peer_timeout: Some(Duration::from_secs(30)),
            unreachable_ttl: Some(Duration::from_secs(15 * 60)),
            dial_timeout: Some(Duration::from_secs(5)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Lifecycle {
    #[serde(with = "humantime_serde")]
    pub settle_delay: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub monitor_short_period: Option<Duration>,
    pub monitor_short_window: usize,
    #[serde(with = "humantime_serde")]
    pub monitor_long_period: Option<Duration>,
    pub monitor_long_window: usize,
    /// Global action fan-out rate, requests per second.
    pub global_rate: u32,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            settle_delay: Some(Duration::from_secs(5)),
            monitor_short_period: Some(Duration::from_secs(60)),
            monitor_short_window: 60,
            monitor_long_period: Some(Duration::from_secs(15 * 60)),
            monitor_long_window: 96,
            global_rate: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Locations {
    #[serde(with = "humantime_serde")]
    pub expiry: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub rebroadcast: Option<Duration>,
    pub gossip_rate: u32,
    #[serde(with = "humantime_serde")]
    pub dedup_ttl: Option<Duration>,
}

impl Default for Locations {
    fn default() -> Self {
        Self {
            expiry: Some(Duration::from_secs(125 * 60)),
            rebroadcast: Some(Duration::from_secs(60 * 60)),
            gossip_rate: 20,
            dedup_ttl: Some(Duration::from_secs(60 * 60)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Watcher {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
    /// Height to start from when no checkpoint is stored.
    pub start_height: u64,
}

impl Default for Watcher {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Some(Duration::from_secs(30)),
            start_height: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Reinstaller {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
    /// Locations above `instances + over_replication` trigger local removal.
    pub over_replication: u32,
}

impl Default for Reinstaller {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Some(Duration::from_secs(30 * 60)),
            over_replication: 2,
        }
    }
}

// Config trait
pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    #[allow(dead_code)]
    fn is_test(&self) -> bool;
    fn api(&self) -> Option<&Api>;
    fn identity(&self) -> &Identity;
    fn ports(&self) -> &Ports;
    fn upnp(&self) -> &Upnp;
    fn daemon(&self) -> &Daemon;
    fn runtime(&self) -> &Runtime;
    fn volumes(&self) -> &Volumes;
    fn store(&self) -> &Store;
    fn apps(&self) -> &Apps;
    fn scheduler(&self) -> &Scheduler;
    fn prober(&self) -> &Prober;
    fn lifecycle(&self) -> &Lifecycle;
    fn locations(&self) -> &Locations;
    fn watcher(&self) -> &Watcher;
    fn reinstaller(&self) -> &Reinstaller;
}

// Config type alias for convenience
pub type Config = Node;

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.node.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.node.env == PROD
    }

    fn is_test(&self) -> bool {
        self.node.env == TEST
    }

    fn api(&self) -> Option<&Api> {
        self.node.api.as_ref()
    }

    fn identity(&self) -> &Identity {
        &self.node.identity
    }

    fn ports(&self) -> &Ports {
        &self.node.ports
    }

    fn upnp(&self) -> &Upnp {
        &self.node.upnp
    }

    fn daemon(&self) -> &Daemon {
        &self.node.daemon
    }

    fn runtime(&self) -> &Runtime {
        &self.node.runtime
    }

    fn volumes(&self) -> &Volumes {
        &self.node.volumes
    }

    fn store(&self) -> &Store {
        &self.node.store
    }

    fn apps(&self) -> &Apps {
        &self.node.apps
    }

    fn scheduler(&self) -> &Scheduler {
        &self.node.scheduler
    }

    fn prober(&self) -> &Prober {
        &self.node.prober
    }

    fn lifecycle(&self) -> &Lifecycle {
        &self.node.lifecycle
    }

    fn locations(&self) -> &Locations {
        &self.node.locations
    }

    fn watcher(&self) -> &Watcher {
        &self.node.watcher
    }

    fn reinstaller(&self) -> &Reinstaller {
        &self.node.reinstaller
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Resolve absolute path
        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        let cfg = Self::parse(&data).with_context(|| format!("unmarshal yaml from {:?}", abs_path))?;
        Ok(cfg)
    }

    /// Parses and validates a YAML document.
    pub fn parse(data: &str) -> Result<Self> {
        let mut cfg: Node = serde_yaml::from_str(data)?;

        let ports = &cfg.node.ports;
        if ports.min == 0 || ports.min > ports.max {
            anyhow::bail!("invalid ports range {}..={}", ports.min, ports.max);
        }

        let apps = &mut cfg.node.apps;
        if apps.price.is_empty() {
            anyhow::bail!("apps.price table must not be empty");
        }
        apps.price.sort_by_key(|b| b.height);
        if apps.min_instances == 0 || apps.min_instances > apps.max_instances {
            anyhow::bail!(
                "invalid instances bounds {}..={}",
                apps.min_instances,
                apps.max_instances
            );
        }
        if apps.blocks_lasting == 0 {
            anyhow::bail!("apps.blocks_lasting must be positive");
        }

        Ok(cfg)
    }
}

// Test config is always available for integration tests
mod test_config;
#[allow(dead_code)]
pub use test_config::new_test_config;
