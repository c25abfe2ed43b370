use anyhow::{Context, Result};
use hyper::Method;
use std::time::Duration;

use super::PeerClient;
use crate::http::client::{self, HyperClient};
use crate::model::{FleetError, GossipEnvelope, NodeInfo, ProbeRequest, ProbeResponse};

const GOSSIP_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpPeerClient {
    client: HyperClient,
    /// Api port assumed for node-list entries without one.
    default_port: u16,
}

impl HttpPeerClient {
    pub fn new(client: HyperClient, default_port: u16) -> Self {
        Self {
            client,
            default_port,
        }
    }
}

#[async_trait::async_trait]
impl PeerClient for HttpPeerClient {
    async fn check_availability(
        &self,
        peer: &NodeInfo,
        req: &ProbeRequest,
        timeout: Duration,
    ) -> Result<ProbeResponse, FleetError> {
        let url = format!("{}/checkappavailability", peer.base_url(self.default_port));
        let unreachable = |reason: String| FleetError::UnreachablePeer {
            peer: peer.ip.clone(),
            reason,
        };
        let resp = client::post_json(&self.client, &url, &[], req, timeout)
            .await
            .map_err(|e| unreachable(format!("{e:#}")))?;
        resp.json::<ProbeResponse>()
            .map_err(|e| unreachable(format!("{e:#}")))
    }

    async fn gossip(&self, peer: &NodeInfo, envelope: &GossipEnvelope) -> Result<()> {
        let url = format!("{}/gossip", peer.base_url(self.default_port));
        client::post_json(&self.client, &url, &[], envelope, GOSSIP_TIMEOUT)
            .await?
            .error_for_status()
            .with_context(|| format!("gossip to {}", peer.ip))?;
        Ok(())
    }

    async fn app_action(&self, peer: &NodeInfo, target: &str, action: &str) -> Result<()> {
        let url = format!("{}/apps/{target}/{action}", peer.base_url(self.default_port));
        client::send(&self.client, Method::POST, &url, &[], None, GOSSIP_TIMEOUT)
            .await?
            .error_for_status()
            .with_context(|| format!("{action} {target} at {}", peer.ip))?;
        Ok(())
    }
}
