// The distributed scheduling loop: sample, check, draw, install, announce.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::eligibility::{self, Skip, View};
use crate::config::{Config, ConfigTrait};
use crate::daemon::{self, Daemon};
use crate::db::Store;
use crate::gossip::Announcer;
use crate::governor::Service;
use crate::lifecycle::{LifecycleManager, Mode};
use crate::metrics;
use crate::model::{FleetError, GlobalSpecRecord};
use crate::peers::Broadcaster;
use crate::rand;
use crate::registry::ImagePolicy;
use crate::ttl::TtlCache;

const COMPONENT: &str = "scheduler";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    Installed(String),
    Skipped { app: Option<String>, reason: Skip },
}

pub struct Deps {
    pub store: Arc<dyn Store>,
    pub daemon: Arc<dyn Daemon>,
    pub images: Arc<ImagePolicy>,
    pub lifecycle: Arc<LifecycleManager>,
    pub announcer: Arc<Announcer>,
    pub broadcaster: Arc<Broadcaster>,
}

pub struct Spawner {
    cfg: Arc<Config>,
    deps: Deps,
    evaluated: TtlCache<String>,
    known_apps: AtomicUsize,
}

fn skipped(app: Option<&str>, reason: Skip) -> Cycle {
    Cycle::Skipped {
        app: app.map(str::to_string),
        reason,
    }
}

impl Spawner {
    pub fn new(cfg: Arc<Config>, deps: Deps) -> Self {
        let ttl = cfg.scheduler().evaluated_ttl.unwrap_or(Duration::from_secs(30 * 60));
        Self {
            cfg,
            deps,
            evaluated: TtlCache::new(ttl, 10_000),
            known_apps: AtomicUsize::new(0),
        }
    }

    pub fn is_evaluated(&self, name: &str) -> bool {
        self.evaluated.contains(&name.to_string())
    }

    /// One scheduling cycle. Never installs more than one app.
    pub async fn cycle(&self) -> Result<Cycle, FleetError> {
        let key = self.deps.broadcaster.key().public_hex();
        let standing = daemon::standing(self.deps.daemon.as_ref(), &key).await?;
        if !standing.is_eligible() {
            return Ok(skipped(None, Skip::NotEligible));
        }

        let specs = self.deps.store.global_specs().await?;
        self.known_apps.store(specs.len(), Ordering::Relaxed);
        metrics::set_global_apps(specs.len());
        let sampled = {
            let mut rng = ::rand::thread_rng();
            eligibility::sample(
                &mut rng,
                &specs,
                self.deps.lifecycle.location(),
                self.cfg.scheduler().geo_override,
            )
            .cloned()
        };
        let Some(record) = sampled else {
            return Ok(skipped(None, Skip::NoApps));
        };
        if self.is_evaluated(&record.name) {
            return Ok(skipped(Some(&record.name), Skip::RecentlyEvaluated));
        }

        if let Err(reason) = self.evaluate(&record).await? {
            if reason.is_cached() {
                self.evaluated.mark(record.name.clone());
            }
            return Ok(skipped(Some(&record.name), reason));
        }

        let bound = eligibility::draw_bound(self.cfg.scheduler().probability, specs.len());
        if rand::below(bound) != 0 {
            return Ok(skipped(Some(&record.name), Skip::LostDraw));
        }

        info!(
            component = COMPONENT,
            event = "spawning",
            app = %record.name,
            hash = %record.hash,
            "installing sampled application"
        );
        match self.deps.lifecycle.install(&record, None, Mode::Hard, false).await {
            Ok(local) => {
                metrics::add_scheduler_install();
                // The announcer loop repeats the broadcast later.
                if let Err(err) = self.deps.announcer.announce(&local.name, &local.hash).await {
                    warn!(
                        component = COMPONENT,
                        event = "announce_failed",
                        app = %local.name,
                        error = %err,
                        "installed application not announced yet"
                    );
                }
                Ok(Cycle::Installed(local.name))
            }
            Err(FleetError::Busy(_)) => Ok(skipped(Some(&record.name), Skip::Busy)),
            Err(err) => {
                self.evaluated.mark(record.name.clone());
                Err(err)
            }
        }
    }

    async fn evaluate(&self, record: &GlobalSpecRecord) -> Result<Result<(), Skip>, FleetError> {
        let locations = self.deps.store.locations(Some(&record.name)).await?;
        let containers = self.deps.lifecycle.containers().await?;
        let installed = self.deps.lifecycle.installed().await?;
        let view = View {
            own: self.deps.broadcaster.endpoint(),
            locations: &locations,
            containers: &containers,
            installed: &installed,
        };
        if let Err(skip) = eligibility::precheck(record, &view) {
            return Ok(Err(skip));
        }

        let architecture = match &self.cfg.runtime().architecture {
            Some(arch) => arch.clone(),
            None => self.deps.lifecycle.runtime().architecture().await?,
        };
        for repotag in record.spec.repotags() {
            match self.deps.images.check(repotag, &architecture).await {
                Ok(()) => {}
                Err(FleetError::Infrastructure(e)) => return Err(FleetError::Infrastructure(e)),
                Err(e) => return Ok(Err(Skip::ImageRejected(e.to_string()))),
            }
        }
        Ok(Ok(()))
    }

    fn idle_delay(&self) -> Duration {
        let base = self.cfg.scheduler().base_delay.unwrap_or(Duration::from_secs(120));
        rand::jitter(
            eligibility::idle_delay(base, self.known_apps.load(Ordering::Relaxed)),
            0.25,
        )
    }
}

#[async_trait]
impl Service for Spawner {
    fn name(&self) -> &'static str {
        COMPONENT
    }

    fn enabled(&self) -> bool {
        self.cfg.scheduler().enabled
    }

    async fn tick(&self) -> Result<Duration> {
        metrics::add_scheduler_cycle();
        match self.cycle().await {
            Ok(Cycle::Installed(app)) => {
                info!(component = COMPONENT, event = "installed", app = %app, "application spawned");
            }
            Ok(Cycle::Skipped { app, reason }) => {
                metrics::add_scheduler_skip(reason.as_str());
                debug!(
                    component = COMPONENT,
                    event = "skipped",
                    app = app.as_deref().unwrap_or("-"),
                    reason = %reason,
                    "cycle skipped"
                );
            }
            Err(err) => {
                warn!(component = COMPONENT, event = "failed", error = %err, "scheduling cycle failed");
            }
        }
        Ok(self.idle_delay())
    }

    fn retry_delay(&self) -> Duration {
        self.cfg.scheduler().base_delay.unwrap_or(Duration::from_secs(120))
    }
}
