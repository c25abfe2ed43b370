//! Outbound peer traffic: availability probes, gossip and global app actions.

pub mod broadcast;
pub mod client;

use anyhow::Result;
use std::time::Duration;

use crate::model::{FleetError, GossipEnvelope, NodeInfo, ProbeRequest, ProbeResponse};

pub use broadcast::Broadcaster;
pub use client::HttpPeerClient;

#[async_trait::async_trait]
pub trait PeerClient: Send + Sync {
    /// Asks `peer` to dial back the ports in `req`. Transport failures map to `UnreachablePeer`.
    async fn check_availability(
        &self,
        peer: &NodeInfo,
        req: &ProbeRequest,
        timeout: Duration,
    ) -> Result<ProbeResponse, FleetError>;

    async fn gossip(&self, peer: &NodeInfo, envelope: &GossipEnvelope) -> Result<()>;

    /// Fires `action` on `target` at `peer`.
    async fn app_action(&self, peer: &NodeInfo, target: &str, action: &str) -> Result<()>;
}
