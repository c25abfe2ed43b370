// In-process doubles for every external seam. Each one writes to a shared journal so tests can
// assert on the order of side effects across seams.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::daemon::{AppPayment, Daemon, Transaction};
use crate::db::{MemoryStore, Store};
use crate::model::{
    AppLocation, BenchmarkStatus, FleetError, GlobalSpecRecord, GossipEnvelope, HeightCheckpoint,
    LocalAppRecord, NodeInfo, ProbeRequest, ProbeResponse, ProvisionalMessage, SpecMessage,
    SyncStatus,
};
use crate::network::Firewall;
use crate::peers::PeerClient;
use crate::runtime::{
    ContainerAction, ContainerRuntime, ContainerSpec, ContainerStats, ContainerSummary, RemoteImage,
};
use crate::volumes::Volumes;

#[derive(Default)]
pub struct Journal {
    entries: Mutex<Vec<String>>,
}

impl Journal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Index of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }

    pub fn starting_with(&self, prefix: &str) -> Vec<String> {
        self.entries.lock().iter().filter(|e| e.starts_with(prefix)).cloned().collect()
    }
}

/// Container engine double. Containers live in a map keyed by id.
pub struct FakeRuntime {
    pub journal: Arc<Journal>,
    architecture: Mutex<String>,
    containers: Mutex<BTreeMap<String, ContainerSummary>>,
    remote: Mutex<HashMap<String, RemoteImage>>,
    image_size: AtomicU64,
    failures: Mutex<HashSet<String>>,
    next_id: AtomicU64,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Self::with_journal(Journal::new())
    }

    pub fn with_journal(journal: Arc<Journal>) -> Arc<Self> {
        Arc::new(Self {
            journal,
            architecture: Mutex::new("amd64".to_string()),
            containers: Mutex::new(BTreeMap::new()),
            remote: Mutex::new(HashMap::new()),
            image_size: AtomicU64::new(100 * 1024 * 1024),
            failures: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Makes the named call fail, e.g. `"create"` or `"act:start"`.
    pub fn fail_on(&self, call: &str) {
        self.failures.lock().insert(call.to_string());
    }

    pub fn set_remote(&self, image: &str, architectures: &[&str]) {
        self.remote.lock().insert(
            image.to_string(),
            RemoteImage {
                architectures: architectures.iter().map(|a| a.to_string()).collect(),
            },
        );
    }

    pub fn set_image_size(&self, bytes: u64) {
        self.image_size.store(bytes, Ordering::Relaxed);
    }

    /// Adds a container the node does not know about.
    pub fn add_container(&self, summary: ContainerSummary) {
        self.containers.lock().insert(summary.id.clone(), summary);
    }

    pub fn containers(&self) -> Vec<ContainerSummary> {
        self.containers.lock().values().cloned().collect()
    }

    pub fn state_of(&self, name: &str) -> Option<String> {
        self.containers
            .lock()
            .values()
            .find(|c| c.name == name)
            .map(|c| c.state.clone())
    }

    fn check(&self, call: &str) -> Result<()> {
        if self.failures.lock().contains(call) {
            return Err(anyhow!("injected {call} failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn architecture(&self) -> Result<String> {
        Ok(self.architecture.lock().clone())
    }

    async fn pull(&self, image: &str, _progress: Option<mpsc::UnboundedSender<String>>) -> Result<()> {
        self.journal.push(format!("runtime.pull:{image}"));
        self.check("pull")
    }

    async fn inspect_remote(&self, image: &str) -> Result<RemoteImage> {
        self.check("inspect_remote")?;
        let arch = self.architecture.lock().clone();
        Ok(self
            .remote
            .lock()
            .get(image)
            .cloned()
            .unwrap_or(RemoteImage { architectures: vec![arch] }))
    }

    async fn image_size(&self, _image: &str) -> Result<u64> {
        Ok(self.image_size.load(Ordering::Relaxed))
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        self.journal.push(format!("runtime.remove_image:{image}"));
        self.check("remove_image")
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        self.journal.push(format!("runtime.create:{}", spec.name));
        self.check("create")?;
        let id = format!("cid-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.containers.lock().insert(
            id.clone(),
            ContainerSummary {
                id: id.clone(),
                name: spec.name.clone(),
                image: spec.image.clone(),
                state: "created".to_string(),
                labels: spec.labels.clone(),
            },
        );
        Ok(id)
    }

    async fn act(&self, id: &str, action: ContainerAction) -> Result<()> {
        let name = self
            .containers
            .lock()
            .get(id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.to_string());
        self.journal.push(format!("runtime.{action}:{name}"));
        self.check(&format!("act:{action}"))?;
        let mut containers = self.containers.lock();
        let container = containers.get_mut(id).ok_or_else(|| anyhow!("no such container {id}"))?;
        container.state = match action {
            ContainerAction::Start | ContainerAction::Restart | ContainerAction::Unpause => "running",
            ContainerAction::Stop | ContainerAction::Kill => "exited",
            ContainerAction::Pause => "paused",
        }
        .to_string();
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let removed = self.containers.lock().remove(id);
        let name = removed.map(|c| c.name).unwrap_or_else(|| id.to_string());
        self.journal.push(format!("runtime.remove:{name}"));
        self.check("remove")
    }

    async fn stats(&self, id: &str) -> Result<ContainerStats> {
        if !self.containers.lock().contains_key(id) {
            return Err(anyhow!("no such container {id}"));
        }
        Ok(ContainerStats {
            cpu_percent: 12.5,
            memory_bytes: 64 * 1024 * 1024,
            memory_limit: 1024 * 1024 * 1024,
            ..ContainerStats::default()
        })
    }

    async fn exec(&self, id: &str, cmd: &[String], _env: &[String]) -> Result<String> {
        self.check("exec")?;
        Ok(format!("{id}$ {}", cmd.join(" ")))
    }

    async fn list(&self, _all: bool) -> Result<Vec<ContainerSummary>> {
        self.check("list")?;
        Ok(self.containers())
    }
}

/// Loop-device volumes without a filesystem.
pub struct FakeVolumes {
    pub journal: Arc<Journal>,
    volumes: Mutex<HashSet<String>>,
    failures: Mutex<HashSet<String>>,
}

impl FakeVolumes {
    pub fn new(journal: Arc<Journal>) -> Arc<Self> {
        Arc::new(Self {
            journal,
            volumes: Mutex::new(HashSet::new()),
            failures: Mutex::new(HashSet::new()),
        })
    }

    pub fn fail_on(&self, call: &str) {
        self.failures.lock().insert(call.to_string());
    }

    pub fn has(&self, name: &str) -> bool {
        self.volumes.lock().contains(name)
    }

    fn check(&self, call: &str) -> Result<()> {
        if self.failures.lock().contains(call) {
            return Err(anyhow!("injected {call} failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Volumes for FakeVolumes {
    fn path(&self, name: &str) -> PathBuf {
        PathBuf::from("/fake/volumes").join(name)
    }

    async fn exists(&self, name: &str) -> bool {
        self.has(name)
    }

    async fn create(&self, name: &str, _size_gb: f64) -> Result<PathBuf> {
        self.journal.push(format!("volumes.create:{name}"));
        self.check("create")?;
        self.volumes.lock().insert(name.to_string());
        Ok(self.path(name))
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        self.journal.push(format!("volumes.destroy:{name}"));
        self.volumes.lock().remove(name);
        Ok(())
    }

    async fn register_mount_job(&self, name: &str) -> Result<()> {
        self.journal.push(format!("volumes.mount_job:{name}"));
        self.check("mount_job")
    }

    async fn unregister_mount_job(&self, name: &str) -> Result<()> {
        self.journal.push(format!("volumes.unmount_job:{name}"));
        Ok(())
    }

    async fn usage(&self, _name: &str) -> Result<u64> {
        Ok(4096)
    }
}

#[derive(Default)]
pub struct FirewallLists {
    pub banned: Vec<u16>,
    pub user_blocked: Vec<u16>,
    pub upnp_banned: Vec<u16>,
}

pub struct FakeFirewall {
    pub journal: Arc<Journal>,
    active: bool,
    upnp: bool,
    lists: FirewallLists,
    open: Mutex<HashSet<u16>>,
}

impl FakeFirewall {
    pub fn new(journal: Arc<Journal>, active: bool, upnp: bool, lists: FirewallLists) -> Arc<Self> {
        Arc::new(Self {
            journal,
            active,
            upnp,
            lists,
            open: Mutex::new(HashSet::new()),
        })
    }

    pub fn is_open(&self, port: u16) -> bool {
        self.open.lock().contains(&port)
    }
}

#[async_trait]
impl Firewall for FakeFirewall {
    async fn is_active(&self) -> Result<bool> {
        Ok(self.active)
    }

    async fn allow(&self, port: u16) -> Result<()> {
        self.journal.push(format!("firewall.allow:{port}"));
        self.open.lock().insert(port);
        Ok(())
    }

    async fn deny(&self, port: u16) -> Result<()> {
        self.journal.push(format!("firewall.deny:{port}"));
        self.open.lock().remove(&port);
        Ok(())
    }

    fn upnp_enabled(&self) -> bool {
        self.upnp
    }

    async fn map_upnp(&self, port: u16, _label: &str) -> Result<()> {
        self.journal.push(format!("upnp.map:{port}"));
        Ok(())
    }

    async fn unmap_upnp(&self, port: u16, _label: &str) -> Result<()> {
        self.journal.push(format!("upnp.unmap:{port}"));
        Ok(())
    }

    fn is_banned(&self, port: u16) -> bool {
        self.lists.banned.contains(&port)
    }

    fn is_user_blocked(&self, port: u16) -> bool {
        self.lists.user_blocked.contains(&port)
    }

    fn is_upnp_banned(&self, port: u16) -> bool {
        self.lists.upnp_banned.contains(&port)
    }
}

/// Ledger daemon double with settable state.
pub struct FakeDaemon {
    pub sync: Mutex<SyncStatus>,
    pub nodes: Mutex<Vec<NodeInfo>>,
    pub benchmark: Mutex<BenchmarkStatus>,
    pub transactions: Mutex<HashMap<String, Transaction>>,
    pub payments: Mutex<HashMap<u64, Vec<AppPayment>>>,
    pub offline: Mutex<bool>,
}

impl FakeDaemon {
    pub fn new(nodes: Vec<NodeInfo>, height: u64) -> Arc<Self> {
        Arc::new(Self {
            sync: Mutex::new(SyncStatus { synced: true, height }),
            nodes: Mutex::new(nodes),
            benchmark: Mutex::new(BenchmarkStatus::Passed),
            transactions: Mutex::new(HashMap::new()),
            payments: Mutex::new(HashMap::new()),
            offline: Mutex::new(false),
        })
    }

    pub fn set_height(&self, height: u64) {
        self.sync.lock().height = height;
    }

    /// Anchors `hash` in block `height` with a transaction paying `value` to `address`.
    pub fn pay(&self, height: u64, txid: &str, hash: &str, address: &str, value: f64) {
        self.payments.lock().entry(height).or_default().push(AppPayment {
            txid: txid.to_string(),
            hash: hash.to_string(),
        });
        self.transactions.lock().insert(
            txid.to_string(),
            Transaction {
                txid: txid.to_string(),
                outputs: vec![crate::daemon::TxOutput {
                    address: Some(address.to_string()),
                    value,
                }],
            },
        );
    }

    fn check(&self) -> Result<()> {
        if *self.offline.lock() {
            return Err(anyhow!("daemon offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl Daemon for FakeDaemon {
    async fn sync_status(&self) -> Result<SyncStatus> {
        self.check()?;
        Ok(*self.sync.lock())
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Transaction> {
        self.check()?;
        self.transactions
            .lock()
            .get(txid)
            .cloned()
            .ok_or_else(|| anyhow!("unknown transaction {txid}"))
    }

    async fn node_list(&self) -> Result<Vec<NodeInfo>> {
        self.check()?;
        Ok(self.nodes.lock().clone())
    }

    async fn block_payments(&self, height: u64, address: &str) -> Result<Vec<AppPayment>> {
        self.check()?;
        let transactions = self.transactions.lock();
        Ok(self
            .payments
            .lock()
            .get(&height)
            .map(|payments| {
                payments
                    .iter()
                    .filter(|p| {
                        transactions
                            .get(&p.txid)
                            .map_or(false, |tx| tx.paid_to(address) > 0.0)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn benchmark(&self) -> Result<BenchmarkStatus> {
        self.check()?;
        Ok(*self.benchmark.lock())
    }
}

/// Peer transport double. Probe answers are scripted per peer ip.
#[derive(Default)]
pub struct FakePeers {
    answers: Mutex<HashMap<String, std::result::Result<ProbeResponse, String>>>,
    pub probes: Mutex<Vec<(String, ProbeRequest)>>,
    pub gossip: Mutex<Vec<(String, GossipEnvelope)>>,
    pub actions: Mutex<Vec<(String, String, String)>>,
}

impl FakePeers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn answer(&self, ip: &str, response: ProbeResponse) {
        self.answers.lock().insert(ip.to_string(), Ok(response));
    }

    pub fn unreachable(&self, ip: &str) {
        self.answers.lock().insert(ip.to_string(), Err("connection refused".to_string()));
    }

    pub fn gossip_count(&self) -> usize {
        self.gossip.lock().len()
    }
}

#[async_trait]
impl PeerClient for FakePeers {
    async fn check_availability(
        &self,
        peer: &NodeInfo,
        req: &ProbeRequest,
        _timeout: Duration,
    ) -> std::result::Result<ProbeResponse, FleetError> {
        self.probes.lock().push((peer.ip.clone(), req.clone()));
        match self.answers.lock().get(&peer.ip).cloned() {
            Some(Ok(resp)) => Ok(resp),
            Some(Err(reason)) => Err(FleetError::UnreachablePeer {
                peer: peer.ip.clone(),
                reason,
            }),
            None => Ok(ProbeResponse::success("all ports reachable")),
        }
    }

    async fn gossip(&self, peer: &NodeInfo, envelope: &GossipEnvelope) -> Result<()> {
        self.gossip.lock().push((peer.ip.clone(), envelope.clone()));
        Ok(())
    }

    async fn app_action(&self, peer: &NodeInfo, target: &str, action: &str) -> Result<()> {
        self.actions
            .lock()
            .push((peer.ip.clone(), target.to_string(), action.to_string()));
        Ok(())
    }
}

/// Memory store that journals local-record writes.
pub struct RecordingStore {
    inner: MemoryStore,
    journal: Arc<Journal>,
    failures: Mutex<HashSet<String>>,
}

impl RecordingStore {
    pub fn new(journal: Arc<Journal>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            journal,
            failures: Mutex::new(HashSet::new()),
        })
    }

    /// Makes the named write fail until [`RecordingStore::heal`], e.g. `"put_location"`.
    pub fn fail_on(&self, call: &str) {
        self.failures.lock().insert(call.to_string());
    }

    pub fn heal(&self) {
        self.failures.lock().clear();
    }

    fn check(&self, call: &str) -> Result<()> {
        if self.failures.lock().contains(call) {
            return Err(anyhow!("injected {call} failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn local_apps(&self) -> Result<Vec<LocalAppRecord>> {
        self.inner.local_apps().await
    }
    async fn local_app(&self, name: &str) -> Result<Option<LocalAppRecord>> {
        self.inner.local_app(name).await
    }
    async fn put_local_app(&self, record: LocalAppRecord) -> Result<()> {
        self.journal.push(format!("store.put_local_app:{}", record.name));
        self.inner.put_local_app(record).await
    }
    async fn delete_local_app(&self, name: &str) -> Result<bool> {
        self.journal.push(format!("store.delete_local_app:{name}"));
        self.inner.delete_local_app(name).await
    }

    async fn global_specs(&self) -> Result<Vec<GlobalSpecRecord>> {
        self.inner.global_specs().await
    }
    async fn global_spec(&self, name: &str) -> Result<Option<GlobalSpecRecord>> {
        self.inner.global_spec(name).await
    }
    async fn put_global_spec(&self, record: GlobalSpecRecord) -> Result<()> {
        self.inner.put_global_spec(record).await
    }
    async fn delete_global_spec(&self, name: &str) -> Result<bool> {
        self.inner.delete_global_spec(name).await
    }

    async fn provisional(&self, hash: &str) -> Result<Option<ProvisionalMessage>> {
        self.inner.provisional(hash).await
    }
    async fn provisional_messages(&self) -> Result<Vec<ProvisionalMessage>> {
        self.inner.provisional_messages().await
    }
    async fn put_provisional(&self, message: ProvisionalMessage) -> Result<()> {
        self.check("put_provisional")?;
        self.inner.put_provisional(message).await
    }
    async fn delete_provisional(&self, hash: &str) -> Result<bool> {
        self.inner.delete_provisional(hash).await
    }
    async fn purge_provisional(&self, now_ms: i64) -> Result<usize> {
        self.inner.purge_provisional(now_ms).await
    }

    async fn permanent(&self, hash: &str) -> Result<Option<SpecMessage>> {
        self.inner.permanent(hash).await
    }
    async fn put_permanent(&self, message: SpecMessage) -> Result<()> {
        self.inner.put_permanent(message).await
    }
    async fn permanent_for(&self, name: &str) -> Result<Vec<SpecMessage>> {
        self.inner.permanent_for(name).await
    }
    async fn permanent_messages(&self) -> Result<Vec<SpecMessage>> {
        self.inner.permanent_messages().await
    }

    async fn locations(&self, name: Option<&str>) -> Result<Vec<AppLocation>> {
        self.inner.locations(name).await
    }
    async fn put_location(&self, location: AppLocation) -> Result<()> {
        self.check("put_location")?;
        self.inner.put_location(location).await
    }
    async fn delete_location(&self, name: &str, ip: &str) -> Result<bool> {
        self.journal.push(format!("store.delete_location:{name}"));
        self.inner.delete_location(name, ip).await
    }
    async fn delete_locations_of(&self, name: &str) -> Result<usize> {
        self.inner.delete_locations_of(name).await
    }
    async fn purge_locations(&self, older_than_ms: i64) -> Result<usize> {
        self.inner.purge_locations(older_than_ms).await
    }

    async fn checkpoint(&self) -> Result<Option<HeightCheckpoint>> {
        self.inner.checkpoint().await
    }
    async fn set_checkpoint(&self, checkpoint: HeightCheckpoint) -> Result<()> {
        self.inner.set_checkpoint(checkpoint).await
    }
}
