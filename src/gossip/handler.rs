// Inbound gossip: authenticate the sender, dedup by hash, dispatch by kind, relay.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{Config, ConfigTrait};
use crate::daemon::Daemon;
use crate::db::Store;
use crate::metrics;
use crate::model::location::host_of;
use crate::model::{
    AppLocation, FleetError, GossipEnvelope, GossipKind, MessageType, SpecMessage, ValidationError,
};
use crate::peers::Broadcaster;
use crate::registry::Registry;
use crate::ttl::TtlCache;

const COMPONENT: &str = "gossip";

/// `apprequest` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRequest {
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GossipOutcome {
    Duplicate,
    /// Applied locally and relayed.
    Accepted,
    /// Well formed and authentic but nothing to do.
    Ignored(String),
}

pub struct GossipHandler {
    daemon: Arc<dyn Daemon>,
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    broadcaster: Arc<Broadcaster>,
    seen: TtlCache<String>,
}

fn kind_label(kind: GossipKind) -> &'static str {
    match kind {
        GossipKind::AppRunning => "apprunning",
        GossipKind::AppRegister => "appregister",
        GossipKind::AppUpdate => "appupdate",
        GossipKind::AppRequest => "apprequest",
    }
}

fn decode<T: serde::de::DeserializeOwned>(envelope: &GossipEnvelope) -> Result<T, FleetError> {
    serde_json::from_value(envelope.payload.clone())
        .map_err(|e| ValidationError::new("payload", format!("{} payload: {e}", envelope.kind)).into())
}

impl GossipHandler {
    pub fn new(
        cfg: &Config,
        daemon: Arc<dyn Daemon>,
        store: Arc<dyn Store>,
        registry: Arc<Registry>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        let ttl = cfg.locations().dedup_ttl.unwrap_or(Duration::from_secs(60 * 60));
        Self {
            daemon,
            store,
            registry,
            broadcaster,
            seen: TtlCache::new(ttl, 50_000),
        }
    }

    /// The sender must be in the node list and must have signed the envelope.
    async fn authenticate(&self, envelope: &GossipEnvelope) -> Result<(), FleetError> {
        let host = host_of(&envelope.ip);
        let nodes = self.daemon.node_list().await?;
        let sender = nodes
            .iter()
            .find(|n| host_of(&n.ip) == host)
            .ok_or_else(|| FleetError::Signature(format!("{} is not in the node list", envelope.ip)))?;
        envelope.verify(&sender.pubkey)
    }

    pub async fn handle(&self, envelope: GossipEnvelope) -> Result<GossipOutcome, FleetError> {
        if self.seen.contains(&envelope.hash) {
            return Ok(GossipOutcome::Duplicate);
        }
        self.authenticate(&envelope).await?;
        if !self.seen.mark(envelope.hash.clone()) {
            return Ok(GossipOutcome::Duplicate);
        }
        metrics::add_gossip(kind_label(envelope.kind));

        let hash = envelope.hash.clone();
        let result = self.dispatch(envelope).await;
        if let Err(FleetError::Infrastructure(_)) = &result {
            // Local failure, a later copy of the envelope may still get through.
            self.seen.remove(&hash);
        }
        result
    }

    async fn dispatch(&self, envelope: GossipEnvelope) -> Result<GossipOutcome, FleetError> {
        let outcome = match envelope.kind {
            GossipKind::AppRegister | GossipKind::AppUpdate => self.on_message(&envelope).await?,
            GossipKind::AppRunning => self.on_running(&envelope).await?,
            GossipKind::AppRequest => return self.on_request(&envelope).await,
        };
        if outcome == GossipOutcome::Accepted {
            self.broadcaster.relay(envelope).await?;
        }
        Ok(outcome)
    }

    async fn on_message(&self, envelope: &GossipEnvelope) -> Result<GossipOutcome, FleetError> {
        let message: SpecMessage = decode(envelope)?;
        let expected = if envelope.kind == GossipKind::AppRegister {
            MessageType::Register
        } else {
            MessageType::Update
        };
        if message.kind != expected {
            return Err(ValidationError::new("type", "envelope and message types differ").into());
        }
        let height = self.daemon.sync_status().await?.height;
        if self.registry.register_provisional(message, height).await? {
            Ok(GossipOutcome::Accepted)
        } else {
            Ok(GossipOutcome::Ignored("message already known".to_string()))
        }
    }

    async fn on_running(&self, envelope: &GossipEnvelope) -> Result<GossipOutcome, FleetError> {
        let location: AppLocation = decode(envelope)?;
        if host_of(&location.ip) != host_of(&envelope.ip) {
            return Ok(GossipOutcome::Ignored(format!(
                "{} reported a location for {}",
                envelope.ip, location.ip
            )));
        }
        let known = self
            .store
            .locations(Some(&location.name))
            .await?
            .into_iter()
            .find(|l| l.ip == location.ip);
        if known.map_or(false, |k| k.broadcasted_at >= location.broadcasted_at) {
            return Ok(GossipOutcome::Ignored("location already current".to_string()));
        }
        debug!(
            component = COMPONENT,
            event = "location",
            app = %location.name,
            ip = %location.ip,
            "location recorded"
        );
        self.store.put_location(location).await?;
        Ok(GossipOutcome::Accepted)
    }

    /// Answers with the stored message, permanent first. Never relayed.
    async fn on_request(&self, envelope: &GossipEnvelope) -> Result<GossipOutcome, FleetError> {
        let request: AppRequest = decode(envelope)?;
        let message = match self.store.permanent(&request.hash).await? {
            Some(message) => Some(message),
            None => self.store.provisional(&request.hash).await?.map(|p| p.message),
        };
        let Some(message) = message else {
            return Ok(GossipOutcome::Ignored(format!("{} is unknown here", request.hash)));
        };
        let kind = match message.kind {
            MessageType::Register => GossipKind::AppRegister,
            MessageType::Update => GossipKind::AppUpdate,
        };
        let mut answer = message;
        answer.txid = None;
        answer.height = None;
        answer.value = None;
        let payload = serde_json::to_value(&answer).map_err(anyhow::Error::from)?;
        self.broadcaster.broadcast(kind, payload).await?;
        info!(
            component = COMPONENT,
            event = "request_answered",
            hash = %request.hash,
            "requested message re-broadcast"
        );
        Ok(GossipOutcome::Accepted)
    }

    /// Asks the fleet for a message this node saw paid for but never received.
    pub async fn request(&self, hash: &str) -> Result<(), FleetError> {
        let payload = serde_json::to_value(AppRequest { hash: hash.to_string() })
            .map_err(anyhow::Error::from)?;
        self.broadcaster.broadcast(GossipKind::AppRequest, payload).await?;
        metrics::add_gossip("apprequest");
        Ok(())
    }
}

#[cfg(test)]
#[path = "handler_test.rs"]
mod handler_test;
