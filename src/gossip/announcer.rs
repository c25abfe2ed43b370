// Tells the fleet which apps this node hosts, and forgets stale reports from others.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{Config, ConfigTrait};
use crate::db::Store;
use crate::governor::Service;
use crate::metrics;
use crate::model::{AppLocation, FleetError, GossipKind};
use crate::peers::Broadcaster;
use crate::time;

const COMPONENT: &str = "announcer";

pub struct Announcer {
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    broadcaster: Arc<Broadcaster>,
}

impl Announcer {
    pub fn new(cfg: Arc<Config>, store: Arc<dyn Store>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            cfg,
            store,
            broadcaster,
        }
    }

    fn expiry(&self) -> Duration {
        self.cfg.locations().expiry.unwrap_or(Duration::from_secs(125 * 60))
    }

    /// Records and broadcasts "this node hosts `name` at `hash`".
    pub async fn announce(&self, name: &str, hash: &str) -> Result<AppLocation, FleetError> {
        let location = AppLocation {
            name: name.to_string(),
            hash: hash.to_string(),
            ip: self.broadcaster.endpoint().to_string(),
            broadcasted_at: time::unix_millis(),
        };
        self.store.put_location(location.clone()).await?;
        let payload = serde_json::to_value(&location).map_err(anyhow::Error::from)?;
        let envelope = self.broadcaster.broadcast(GossipKind::AppRunning, payload).await?;
        metrics::add_gossip("apprunning");
        debug!(
            component = COMPONENT,
            event = "announced",
            app = %name,
            hash = %envelope.hash,
            "app location broadcast"
        );
        Ok(location)
    }

    /// Re-announces every local app. Returns how many were announced.
    pub async fn announce_all(&self) -> Result<usize, FleetError> {
        let apps = self.store.local_apps().await?;
        for app in &apps {
            self.announce(&app.name, &app.hash).await?;
        }
        Ok(apps.len())
    }

    /// Drops location reports older than the expiry window.
    pub async fn purge(&self) -> Result<usize, FleetError> {
        let horizon = time::unix_millis() - self.expiry().as_millis() as i64;
        Ok(self.store.purge_locations(horizon).await?)
    }
}

#[async_trait]
impl Service for Announcer {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    async fn tick(&self) -> Result<Duration> {
        let announced = self.announce_all().await?;
        let purged = self.purge().await?;
        info!(
            component = COMPONENT,
            event = "cycle",
            announced,
            purged,
            "locations refreshed"
        );
        Ok(self.cfg.locations().rebroadcast.unwrap_or(Duration::from_secs(60 * 60)))
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_secs(60)
    }
}
