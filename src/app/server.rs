// HTTP server of the node: wires controllers and middlewares to the shared components.

use anyhow::Result;
use axum::Router;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::controller;
use crate::governor::Governor;
use crate::http::{Controller, Middleware};
use crate::middleware::{recover_middleware::PanicRecoverMiddleware, trace_middleware::TraceMiddleware};

use super::components::Components;

/// HTTP server implementation that wraps all dependencies.
pub struct NodeServer {
    server: Arc<crate::http::HttpServer>,
    is_server_alive: Arc<AtomicBool>,
}

impl NodeServer {
    pub fn new(ctx: CancellationToken, c: &Components) -> Result<Self> {
        let is_server_alive = Arc::new(AtomicBool::new(false));
        let server = crate::http::HttpServer::new(
            ctx,
            c.cfg.clone(),
            Self::controllers(c, is_server_alive.clone()),
            Self::middlewares(),
        )?;
        Ok(Self {
            server,
            is_server_alive,
        })
    }

    pub fn is_alive(&self) -> bool {
        self.is_server_alive.load(Ordering::Relaxed)
    }

    /// Routes with every middleware applied, served in-process by tests.
    pub fn router(&self) -> Router {
        self.server.router()
    }

    /// Serves until the shutdown token fires.
    pub async fn listen_and_serve(&self) -> Result<()> {
        self.is_server_alive.store(true, Ordering::Relaxed);
        let result = self.server.listen_and_serve().await;
        self.is_server_alive.store(false, Ordering::Relaxed);
        result
    }

    /// Marks the node as going away so `/healthz` turns 503 while loops drain.
    pub fn mark_down(&self) {
        self.is_server_alive.store(false, Ordering::Relaxed);
    }

    fn controllers(c: &Components, alive: Arc<AtomicBool>) -> Vec<Box<dyn Controller>> {
        let governor: Arc<dyn Governor> = c.governor.clone();
        vec![
            Box::new(controller::HealthController::new(alive)),
            Box::new(controller::PrometheusMetricsController::new()),
            Box::new(controller::ShowConfigController::new(c.cfg.clone())),
            Box::new(controller::NodeController::new(
                c.cfg.clone(),
                c.daemon.clone(),
                c.store.clone(),
                c.broadcaster.clone(),
                c.prober.clone(),
                governor,
            )),
            Box::new(controller::PeerController::new(c.responder.clone(), c.gossip.clone())),
            Box::new(controller::AppsController::new(
                c.daemon.clone(),
                c.store.clone(),
                c.registry.clone(),
                c.lifecycle.clone(),
                c.announcer.clone(),
                c.broadcaster.clone(),
            )),
        ]
    }

    /// The first listed wraps outermost.
    fn middlewares() -> Vec<Box<dyn Middleware>> {
        vec![
            // Exec first - panic recovery
            Box::new(PanicRecoverMiddleware::new()),
            Box::new(TraceMiddleware::new()),
        ]
    }
}
