// User API: registry reads, specification submission, price quotes and local lifecycle actions.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::daemon::Daemon;
use crate::db::Store;
use crate::gossip::Announcer;
use crate::http::render::{ok, ApiResult};
use crate::http::Controller;
use crate::lifecycle::{LifecycleManager, Mode};
use crate::model::{
    FleetError, GlobalSpecRecord, GossipKind, MessageType, SpecMessage, Target, ValidationError,
};
use crate::peers::Broadcaster;
use crate::registry::Registry;
use crate::runtime::ContainerAction;
use crate::time;

/// `POST /apps/register` body: a signed register or update message, specification unformatted.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub specification: serde_json::Value,
    pub timestamp: i64,
    pub signature: String,
}

/// `POST /apps/price` body.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceRequest {
    #[serde(rename = "type", default = "register_kind")]
    pub kind: MessageType,
    pub specification: serde_json::Value,
}

fn register_kind() -> MessageType {
    MessageType::Register
}

#[derive(Debug, Clone, Serialize)]
struct Submitted {
    hash: String,
    price: f64,
    accepted: bool,
}

#[derive(Debug, Clone, Serialize)]
struct Quote {
    price: f64,
    height: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActionQuery {
    #[serde(default)]
    pub global: bool,
    pub mode: Option<String>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationsQuery {
    pub name: Option<String>,
}

/// `POST /apps/{target}/exec` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecRequest {
    pub cmd: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
}

#[derive(Clone)]
pub struct AppsController {
    daemon: Arc<dyn Daemon>,
    store: Arc<dyn Store>,
    registry: Arc<Registry>,
    lifecycle: Arc<LifecycleManager>,
    announcer: Arc<Announcer>,
    broadcaster: Arc<Broadcaster>,
}

fn parse_mode(raw: Option<&str>) -> Result<Option<Mode>, FleetError> {
    match raw {
        None => Ok(None),
        Some(raw) => Mode::parse(raw)
            .map(Some)
            .ok_or_else(|| ValidationError::new("mode", format!("{raw} is neither soft nor hard")).into()),
    }
}

impl AppsController {
    pub fn new(
        daemon: Arc<dyn Daemon>,
        store: Arc<dyn Store>,
        registry: Arc<Registry>,
        lifecycle: Arc<LifecycleManager>,
        announcer: Arc<Announcer>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            daemon,
            store,
            registry,
            lifecycle,
            announcer,
            broadcaster,
        }
    }

    async fn specs(State(c): State<Self>) -> ApiResult {
        Ok(ok(c.registry.specs().await?))
    }

    async fn installed(State(c): State<Self>) -> ApiResult {
        Ok(ok(c.lifecycle.installed().await?))
    }

    async fn locations(State(c): State<Self>, Query(q): Query<LocationsQuery>) -> ApiResult {
        Ok(ok(c.store.locations(q.name.as_deref()).await?))
    }

    async fn permanent(State(c): State<Self>) -> ApiResult {
        Ok(ok(c.store.permanent_messages().await?))
    }

    async fn register(State(c): State<Self>, Json(req): Json<SubmitRequest>) -> ApiResult {
        let spec = c.registry.format(req.specification)?;
        let message = SpecMessage::new(req.kind, spec, req.timestamp, req.signature);
        let height = c.daemon.sync_status().await?.height;
        let price = c.registry.required_price(&message, height).await?;
        let accepted = c.registry.register_provisional(message.clone(), height).await?;
        if accepted {
            let kind = match message.kind {
                MessageType::Register => GossipKind::AppRegister,
                MessageType::Update => GossipKind::AppUpdate,
            };
            let payload = serde_json::to_value(&message).map_err(anyhow::Error::from)?;
            c.broadcaster.broadcast(kind, payload).await?;
            info!(component = "api", event = "submitted", app = %message.name(), hash = %message.hash, price, "specification accepted");
        }
        Ok(ok(Submitted {
            hash: message.hash,
            price,
            accepted,
        }))
    }

    async fn price(State(c): State<Self>, Json(req): Json<PriceRequest>) -> ApiResult {
        let spec = c.registry.format(req.specification)?;
        let height = c.daemon.sync_status().await?.height;
        c.registry.verify(&spec, height)?;
        let message = SpecMessage::new(req.kind, spec, time::unix_millis(), String::new());
        let price = c.registry.required_price(&message, height).await?;
        Ok(ok(Quote { price, height }))
    }

    async fn global(&self, name: &str) -> Result<GlobalSpecRecord, FleetError> {
        self.registry
            .current(name)
            .await?
            .ok_or_else(|| FleetError::NotFound(name.to_string()))
    }

    async fn monitor(State(c): State<Self>, Path((target, action)): Path<(String, String)>) -> ApiResult {
        if action != "monitor" {
            return Err(FleetError::NotFound(format!("GET {target}/{action}")).into());
        }
        let target = Target::parse(&target);
        Ok(ok(c.lifecycle.monitor_snapshot(&target).await?))
    }

    async fn action(
        State(c): State<Self>,
        Path((target, action)): Path<(String, String)>,
        Query(q): Query<ActionQuery>,
        body: Bytes,
    ) -> ApiResult {
        let mode = parse_mode(q.mode.as_deref())?;
        let target = Target::parse(&target);
        match action.as_str() {
            "install" => {
                let record = c.global(&target.app).await?;
                let local = c
                    .lifecycle
                    .install(&record, target.component.as_deref(), mode.unwrap_or(Mode::Hard), q.force)
                    .await?;
                c.announcer.announce(&local.name, &local.hash).await?;
                Ok(ok(local))
            }
            "remove" => {
                c.lifecycle.remove(&target.app, mode.unwrap_or(Mode::Hard), q.force).await?;
                Ok(ok(format!("{} removed", target.app)))
            }
            "redeploy" => {
                let record = c.global(&target.app).await?;
                let local = c.lifecycle.redeploy(&record, mode, q.force).await?;
                c.announcer.announce(&local.name, &local.hash).await?;
                Ok(ok(local))
            }
            "exec" => {
                let req: ExecRequest = serde_json::from_slice(&body)
                    .map_err(|e| ValidationError::new("body", e.to_string()))?;
                if req.cmd.is_empty() {
                    return Err(ValidationError::new("cmd", "command is empty").into());
                }
                Ok(ok(c.lifecycle.exec(&target, &req.cmd, &req.env).await?))
            }
            other => {
                let action = ContainerAction::parse(other)
                    .ok_or_else(|| FleetError::NotFound(format!("action {other}")))?;
                c.lifecycle.act(&target, action, q.global).await?;
                Ok(ok(format!("{action} {target} done")))
            }
        }
    }
}

impl Controller for AppsController {
    fn add_route(&self, router: Router) -> Router {
        let routes: Router = Router::new()
            .route("/apps/specs", get(Self::specs))
            .route("/apps/installed", get(Self::installed))
            .route("/apps/locations", get(Self::locations))
            .route("/apps/permanent", get(Self::permanent))
            .route("/apps/register", post(Self::register))
            .route("/apps/price", post(Self::price))
            .route("/apps/:target/:action", get(Self::monitor).post(Self::action))
            .with_state(self.clone());
        router.merge(routes)
    }
}
