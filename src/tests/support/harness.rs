// One fully wired node over in-process doubles.

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use super::fakes::{FakeDaemon, FakeFirewall, FakePeers, FakeRuntime, FakeVolumes, FirewallLists, Journal, RecordingStore};
use super::fixtures::node_info;
use crate::app::{node_key, Adapters, Components, NodeServer};
use crate::config::{new_test_config, Config};
use crate::crypto::NodeKey;
use crate::db::Store;
use crate::model::{AppSpec, GlobalSpecRecord, NodeInfo, Tier};

pub const SELF_IP: &str = "10.0.0.1:16127";
pub const PEER_IPS: [&str; 2] = ["10.0.0.2:16127", "10.0.0.3:16127"];

/// Key of the `i`-th peer in [`PEER_IPS`].
pub fn peer_key(i: usize) -> NodeKey {
    NodeKey::from_seed([100 + i as u8; 32])
}

pub struct TestNode {
    pub journal: Arc<Journal>,
    pub runtime: Arc<FakeRuntime>,
    pub volumes: Arc<FakeVolumes>,
    pub firewall: Arc<FakeFirewall>,
    pub daemon: Arc<FakeDaemon>,
    pub peers: Arc<FakePeers>,
    pub store: Arc<RecordingStore>,
    pub components: Arc<Components>,
    pub token: CancellationToken,
}

impl TestNode {
    pub fn new() -> Self {
        Self::with_config(new_test_config())
    }

    /// Node on `cfg`; the firewall is active and UPnP follows `cfg`.
    pub fn with_config(cfg: Config) -> Self {
        let journal = Journal::new();
        let runtime = FakeRuntime::with_journal(journal.clone());
        let volumes = FakeVolumes::new(journal.clone());
        let firewall = FakeFirewall::new(
            journal.clone(),
            true,
            cfg.node.upnp.enabled,
            FirewallLists {
                banned: cfg.node.ports.banned.clone(),
                user_blocked: cfg.node.ports.user_blocked.clone(),
                upnp_banned: cfg.node.ports.upnp_banned.clone(),
            },
        );
        let key = node_key(&cfg).expect("test config carries a valid secret");
        let mut nodes: Vec<NodeInfo> = vec![node_info(SELF_IP, &key, Tier::Cumulus)];
        for (i, ip) in PEER_IPS.iter().enumerate() {
            nodes.push(node_info(ip, &peer_key(i), Tier::Cumulus));
        }
        let daemon = FakeDaemon::new(nodes, 1_000);
        let peers = FakePeers::new();
        let store = RecordingStore::new(journal.clone());
        let token = CancellationToken::new();

        let adapters = Adapters {
            store: store.clone(),
            runtime: runtime.clone(),
            volumes: volumes.clone(),
            firewall: firewall.clone(),
            daemon: daemon.clone(),
            peers: peers.clone(),
            dumper: None,
        };
        let components = Arc::new(
            Components::build(token.clone(), Arc::new(cfg), adapters).expect("components build"),
        );
        Self {
            journal,
            runtime,
            volumes,
            firewall,
            daemon,
            peers,
            store,
            components,
            token,
        }
    }

    /// Stores `spec` as the fleet-wide record at `height`.
    pub async fn publish(&self, spec: AppSpec, height: u64) -> GlobalSpecRecord {
        let record = super::fixtures::global_record(spec, height);
        self.store.put_global_spec(record.clone()).await.unwrap();
        record
    }

    /// Routes with every middleware applied.
    pub fn router(&self) -> Router {
        NodeServer::new(self.token.clone(), &self.components)
            .expect("server builds")
            .router()
    }

    /// Sends one request through the router and decodes the JSON answer.
    pub async fn call(&self, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                req = req.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = self.router().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.components.lifecycle.stop_monitoring();
        self.token.cancel();
    }
}
