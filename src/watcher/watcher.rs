// Ledger watcher: walks new blocks, promotes paid messages and expires stale specifications.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigTrait};
use crate::daemon::{AppPayment, Daemon};
use crate::db::Store;
use crate::gossip::GossipHandler;
use crate::governor::Service;
use crate::lifecycle::{LifecycleManager, Mode};
use crate::metrics;
use crate::model::{FleetError, HeightCheckpoint};
use crate::registry::{PromoteOutcome, Registry};
use crate::ttl::TtlCache;

const COMPONENT: &str = "watcher";
/// Blocks handled per tick; a longer backlog continues on the next tick without waiting.
const BLOCKS_PER_TICK: u64 = 500;
/// How long a paid but unseen hash is retried.
const MISSING_TTL: Duration = Duration::from_secs(2 * 60 * 60);

pub struct Deps {
    pub store: Arc<dyn Store>,
    pub daemon: Arc<dyn Daemon>,
    pub registry: Arc<Registry>,
    pub lifecycle: Arc<LifecycleManager>,
    pub gossip: Arc<GossipHandler>,
}

/// Summary of one pass over the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pass {
    /// Last height processed, if any block was.
    pub height: Option<u64>,
    pub promoted: usize,
    pub underpaid: usize,
    pub requested: usize,
    pub expired: Vec<String>,
    /// More blocks are waiting.
    pub behind: bool,
}

pub struct Watcher {
    cfg: Arc<Config>,
    deps: Deps,
    /// Paid hashes whose message this node has not received yet: hash -> (txid, height).
    missing: TtlCache<String, (String, u64)>,
}

impl Watcher {
    pub fn new(cfg: Arc<Config>, deps: Deps) -> Self {
        Self {
            cfg,
            deps,
            missing: TtlCache::new(MISSING_TTL, 10_000),
        }
    }

    /// Hashes paid for but still unknown here.
    pub fn missing(&self) -> Vec<String> {
        self.missing.keys()
    }

    /// Processes blocks from the checkpoint up to the tip, then expires and purges.
    pub async fn pass(&self) -> Result<Pass, FleetError> {
        let mut pass = Pass::default();
        let sync = self.deps.daemon.sync_status().await?;
        if !sync.synced {
            debug!(component = COMPONENT, event = "not_synced", height = sync.height, "daemon still syncing");
            return Ok(pass);
        }

        self.retry_missing(&mut pass).await?;

        let from = match self.deps.store.checkpoint().await? {
            Some(cp) => cp.height + 1,
            None => match self.cfg.watcher().start_height {
                0 => sync.height,
                start => start,
            },
        };
        let to = sync.height.min(from.saturating_add(BLOCKS_PER_TICK - 1));
        pass.behind = to < sync.height;

        for height in from..=to {
            self.block(height, &mut pass).await?;
            self.deps.store.set_checkpoint(HeightCheckpoint { height }).await?;
            pass.height = Some(height);
        }
        if let Some(height) = pass.height {
            metrics::set_ledger_height(height);
        }

        // Only what was read so far counts; an unread block may renew a spec.
        let horizon = pass.height.unwrap_or(from.saturating_sub(1));
        pass.expired = self.deps.registry.expire(horizon).await?;
        self.cascade(&pass.expired).await;
        self.deps.registry.purge_provisional().await?;
        self.missing.purge();
        Ok(pass)
    }

    async fn block(&self, height: u64, pass: &mut Pass) -> Result<(), FleetError> {
        let address = &self.cfg.daemon().payment_address;
        for payment in self.deps.daemon.block_payments(height, address).await? {
            self.payment(&payment, height, pass).await?;
        }
        Ok(())
    }

    async fn payment(&self, payment: &AppPayment, height: u64, pass: &mut Pass) -> Result<(), FleetError> {
        let Some(provisional) = self.deps.store.provisional(&payment.hash).await? else {
            if self.deps.store.permanent(&payment.hash).await?.is_none() {
                self.missing.insert(payment.hash.clone(), (payment.txid.clone(), height));
                if let Err(e) = self.deps.gossip.request(&payment.hash).await {
                    warn!(component = COMPONENT, event = "request_failed", hash = %payment.hash, error = %e, "cannot ask peers for message");
                }
                pass.requested += 1;
            }
            return Ok(());
        };

        let address = &self.cfg.daemon().payment_address;
        let value = self.deps.daemon.raw_transaction(&payment.txid).await?.paid_to(address);
        match self
            .deps
            .registry
            .promote(&provisional.message, &payment.txid, height, value)
            .await?
        {
            PromoteOutcome::Promoted { .. } => pass.promoted += 1,
            PromoteOutcome::Underpaid { .. } => pass.underpaid += 1,
            PromoteOutcome::Stale | PromoteOutcome::Ignored(_) => {}
        }
        self.missing.remove(&payment.hash);
        Ok(())
    }

    /// Promotes messages that arrived after their payment was seen.
    async fn retry_missing(&self, pass: &mut Pass) -> Result<(), FleetError> {
        for hash in self.missing.keys() {
            let Some((txid, height)) = self.missing.get(&hash) else {
                continue;
            };
            if self.deps.store.provisional(&hash).await?.is_some() {
                let payment = AppPayment { txid, hash: hash.clone() };
                self.payment(&payment, height, pass).await?;
            }
        }
        Ok(())
    }

    /// Expired specifications stop running here too.
    async fn cascade(&self, expired: &[String]) {
        for name in expired {
            match self.deps.store.local_app(name).await {
                Ok(Some(_)) => {}
                Ok(None) => continue,
                Err(e) => {
                    warn!(component = COMPONENT, event = "lookup_failed", app = %name, error = %format!("{e:#}"), "cannot read local app");
                    continue;
                }
            }
            match self.deps.lifecycle.remove(name, Mode::Hard, true).await {
                Ok(()) => info!(component = COMPONENT, event = "expired_removed", app = %name, "expired application removed"),
                Err(e) => warn!(component = COMPONENT, event = "expired_remove_failed", app = %name, error = %e, "cannot remove expired application"),
            }
        }
    }
}

#[async_trait]
impl Service for Watcher {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    fn enabled(&self) -> bool {
        self.cfg.watcher().enabled
    }

    async fn tick(&self) -> Result<Duration> {
        let pass = self.pass().await?;
        if pass.height.is_some() || !pass.expired.is_empty() {
            info!(
                component = COMPONENT,
                event = "pass",
                height = pass.height.unwrap_or_default(),
                promoted = pass.promoted,
                underpaid = pass.underpaid,
                requested = pass.requested,
                expired = pass.expired.len(),
                "ledger processed"
            );
        }
        if pass.behind {
            return Ok(Duration::ZERO);
        }
        Ok(self.retry_delay())
    }

    fn retry_delay(&self) -> Duration {
        self.cfg.watcher().interval.unwrap_or(Duration::from_secs(30))
    }
}
