//! Keeps local installs in line with the global specification state: redeploys outdated apps,
//! removes orphaned ones and trims over-replication.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, ConfigTrait};
use crate::db::Store;
use crate::gossip::Announcer;
use crate::governor::Service;
use crate::lifecycle::{redeploy_mode, LifecycleManager, Mode};
use crate::model::{AppLocation, FleetError, LocalAppRecord};

const COMPONENT: &str = "reinstaller";

/// What a pass decided for one local app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Current,
    Redeploy(Mode),
    /// The global specification is gone.
    Orphaned,
    OverReplicated,
}

/// Decides what to do with `local` given the global record hash and the app's known locations.
///
/// Over-replication removes the instances that reported most recently: with `excess` extra
/// locations, the `excess` newest reporters step down. Every node sorts the same way, so the
/// fleet converges without coordination.
pub fn verdict(
    local: &LocalAppRecord,
    global: Option<&crate::model::GlobalSpecRecord>,
    locations: &[AppLocation],
    own: &str,
    over_replication: u32,
) -> Verdict {
    let Some(global) = global else {
        return Verdict::Orphaned;
    };
    if global.hash != local.hash {
        return Verdict::Redeploy(redeploy_mode(local, &global.spec));
    }
    let allowed = (global.spec.instances() + over_replication) as usize;
    if locations.len() > allowed {
        let mut sorted: Vec<&AppLocation> = locations.iter().collect();
        sorted.sort_by(|a, b| {
            b.broadcasted_at
                .cmp(&a.broadcasted_at)
                .then_with(|| a.ip.cmp(&b.ip))
        });
        let excess = locations.len() - allowed;
        if sorted.iter().take(excess).any(|l| l.ip == own) {
            return Verdict::OverReplicated;
        }
    }
    Verdict::Current
}

pub struct Reinstaller {
    cfg: Arc<Config>,
    store: Arc<dyn Store>,
    lifecycle: Arc<LifecycleManager>,
    announcer: Arc<Announcer>,
    own: String,
}

impl Reinstaller {
    pub fn new(
        cfg: Arc<Config>,
        store: Arc<dyn Store>,
        lifecycle: Arc<LifecycleManager>,
        announcer: Arc<Announcer>,
    ) -> Self {
        let own = cfg.identity().endpoint();
        Self {
            cfg,
            store,
            lifecycle,
            announcer,
            own,
        }
    }

    /// One pass over every local app. Returns the verdicts that led to an action.
    pub async fn pass(&self) -> Result<Vec<(String, Verdict)>, FleetError> {
        let over = self.cfg.reinstaller().over_replication;
        let mut acted = Vec::new();
        for local in self.store.local_apps().await? {
            let global = self.store.global_spec(&local.name).await?;
            let locations = self.store.locations(Some(&local.name)).await?;
            let verdict = verdict(&local, global.as_ref(), &locations, &self.own, over);
            let result = match (&verdict, &global) {
                (Verdict::Current, _) => continue,
                (Verdict::Redeploy(mode), Some(global)) => {
                    match self.lifecycle.redeploy(global, Some(*mode), false).await {
                        Ok(record) => self
                            .announcer
                            .announce(&record.name, &record.hash)
                            .await
                            .map(|_| ()),
                        Err(e) => Err(e),
                    }
                }
                (Verdict::Redeploy(_), None) => continue,
                (Verdict::Orphaned, _) => self.lifecycle.remove(&local.name, Mode::Hard, true).await,
                (Verdict::OverReplicated, _) => self.lifecycle.remove(&local.name, Mode::Hard, false).await,
            };
            match result {
                Ok(()) => {
                    info!(component = COMPONENT, event = "reconciled", app = %local.name, verdict = ?verdict, "local app reconciled");
                    acted.push((local.name.clone(), verdict));
                }
                Err(FleetError::Busy(op)) => {
                    info!(component = COMPONENT, event = "busy", app = %local.name, op = %op, "deferred, node busy");
                }
                Err(e) => {
                    warn!(component = COMPONENT, event = "failed", app = %local.name, verdict = ?verdict, error = %e, "cannot reconcile local app");
                }
            }
        }
        Ok(acted)
    }
}

#[async_trait]
impl Service for Reinstaller {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    fn enabled(&self) -> bool {
        self.cfg.reinstaller().enabled
    }

    async fn tick(&self) -> Result<Duration> {
        let acted = self.pass().await?;
        if !acted.is_empty() {
            info!(component = COMPONENT, event = "pass", acted = acted.len(), "reinstall pass finished");
        }
        Ok(self.retry_delay())
    }

    fn retry_delay(&self) -> Duration {
        self.cfg.reinstaller().interval.unwrap_or(Duration::from_secs(30 * 60))
    }
}
