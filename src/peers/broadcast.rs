// Paced, fire-and-forget fan-out to every other node in the node list.

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::PeerClient;
use crate::crypto::NodeKey;
use crate::daemon::Daemon;
use crate::dedlog;
use crate::model::location::host_of;
use crate::model::{GossipEnvelope, GossipKind, NodeInfo};
use crate::rate::Pacer;
use crate::time;

const COMPONENT: &str = "broadcast";

pub struct Broadcaster {
    daemon: Arc<dyn Daemon>,
    peers: Arc<dyn PeerClient>,
    key: NodeKey,
    endpoint: String,
    pacer: Pacer,
}

impl Broadcaster {
    pub fn new(
        daemon: Arc<dyn Daemon>,
        peers: Arc<dyn PeerClient>,
        key: NodeKey,
        endpoint: String,
        per_second: u32,
    ) -> Self {
        Self {
            daemon,
            peers,
            key,
            endpoint,
            pacer: Pacer::per_second(per_second),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    pub fn peers(&self) -> &Arc<dyn PeerClient> {
        &self.peers
    }

    /// Node-list entries other than this node.
    pub async fn other_nodes(&self) -> Result<Vec<NodeInfo>> {
        let own = host_of(&self.endpoint);
        let own_key = self.key.public_hex();
        Ok(self
            .daemon
            .node_list()
            .await?
            .into_iter()
            .filter(|n| host_of(&n.ip) != own || n.pubkey != own_key)
            .collect())
    }

    pub fn seal(&self, kind: GossipKind, payload: Value) -> GossipEnvelope {
        GossipEnvelope::seal(kind, &self.endpoint, time::unix_millis(), payload, &self.key)
    }

    /// Signs and sends a new envelope to every peer.
    pub async fn broadcast(&self, kind: GossipKind, payload: Value) -> Result<GossipEnvelope> {
        let envelope = self.seal(kind, payload);
        self.relay(envelope.clone()).await?;
        Ok(envelope)
    }

    /// Forwards an envelope unchanged to every peer except its author.
    pub async fn relay(&self, envelope: GossipEnvelope) -> Result<usize> {
        let author = host_of(&envelope.ip).to_string();
        let targets: Vec<NodeInfo> = self
            .other_nodes()
            .await?
            .into_iter()
            .filter(|n| host_of(&n.ip) != author)
            .collect();
        let count = targets.len();
        let envelope = Arc::new(envelope);
        for peer in targets {
            self.pacer.take().await;
            let peers = self.peers.clone();
            let envelope = envelope.clone();
            tokio::spawn(async move {
                if let Err(e) = peers.gossip(&peer, &envelope).await {
                    dedlog::err(COMPONENT, Some(&format!("{e:#}")), "gossip delivery failed");
                }
            });
        }
        debug!(component = COMPONENT, event = "relayed", kind = %envelope.kind, peers = count, "gossip relayed");
        Ok(count)
    }

    /// Fires an app action at each of `hosts`, paced, without waiting for answers.
    pub fn fan_out_action(&self, hosts: Vec<NodeInfo>, target: String, action: &'static str) {
        let peers = self.peers.clone();
        let pacer = self.pacer.clone();
        tokio::spawn(async move {
            for host in hosts {
                pacer.take().await;
                let peers = peers.clone();
                let target = target.clone();
                tokio::spawn(async move {
                    if let Err(e) = peers.app_action(&host, &target, action).await {
                        dedlog::err(COMPONENT, Some(&format!("{e:#}")), "global app action failed");
                    }
                });
            }
        });
    }
}
