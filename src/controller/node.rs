// Node administration: standing, DOS state and loop switches.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, ConfigTrait};
use crate::daemon::{self, Daemon};
use crate::db::Store;
use crate::governor::Governor;
use crate::http::render::{ok, ApiResult};
use crate::http::Controller;
use crate::model::{FleetError, NodeStanding, ValidationError};
use crate::peers::Broadcaster;
use crate::prober::{AvailabilityProber, DosState};

#[derive(Debug, Serialize)]
struct Status {
    endpoint: String,
    pubkey: String,
    standing: NodeStanding,
    installed: usize,
    dos: Arc<DosState>,
}

#[derive(Clone)]
pub struct NodeController {
    cfg: Arc<Config>,
    daemon: Arc<dyn Daemon>,
    store: Arc<dyn Store>,
    broadcaster: Arc<Broadcaster>,
    prober: Arc<AvailabilityProber>,
    governor: Arc<dyn Governor>,
}

impl NodeController {
    pub fn new(
        cfg: Arc<Config>,
        daemon: Arc<dyn Daemon>,
        store: Arc<dyn Store>,
        broadcaster: Arc<Broadcaster>,
        prober: Arc<AvailabilityProber>,
        governor: Arc<dyn Governor>,
    ) -> Self {
        Self {
            cfg,
            daemon,
            store,
            broadcaster,
            prober,
            governor,
        }
    }

    async fn status(State(c): State<Self>) -> ApiResult {
        let pubkey = c.broadcaster.key().public_hex();
        let standing = daemon::standing(c.daemon.as_ref(), &pubkey).await?;
        Ok(ok(Status {
            endpoint: c.cfg.identity().endpoint(),
            pubkey,
            standing,
            installed: c.store.local_apps().await?.len(),
            dos: c.prober.state(),
        }))
    }

    async fn dos(State(c): State<Self>) -> ApiResult {
        Ok(ok(c.prober.state()))
    }

    async fn loops(State(c): State<Self>) -> ApiResult {
        Ok(ok(c.governor.statuses()))
    }

    /// `POST /node/loops/{name}/{on|off|wake}`
    async fn switch(State(c): State<Self>, Path((name, state)): Path<(String, String)>) -> ApiResult {
        let result = match state.as_str() {
            "on" => c.governor.on(&name),
            "off" => c.governor.off(&name),
            "wake" => c.governor.wake(&name),
            other => {
                return Err(ValidationError::new("state", format!("{other} is not one of on, off, wake")).into())
            }
        };
        result.map_err(|e| FleetError::NotFound(format!("{e:#}")))?;
        info!(component = "api", event = "loop_switched", srv = %name, state = %state, "loop switched");
        Ok(ok(format!("{name} {state}")))
    }
}

impl Controller for NodeController {
    fn add_route(&self, router: Router) -> Router {
        let routes: Router = Router::new()
            .route("/node/status", get(Self::status))
            .route("/node/dos", get(Self::dos))
            .route("/node/loops", get(Self::loops))
            .route("/node/loops/:name/:state", post(Self::switch))
            .with_state(self.clone());
        router.merge(routes)
    }
}
