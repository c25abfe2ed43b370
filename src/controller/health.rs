// Liveness endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::http::Controller;

pub const HEALTH_PATH: &str = "/healthz";

/// Answers 200 while the node is serving and 503 once it started shutting down.
#[derive(Clone)]
pub struct HealthController {
    alive: Arc<AtomicBool>,
}

impl HealthController {
    pub fn new(alive: Arc<AtomicBool>) -> Self {
        Self { alive }
    }

    async fn probe(State(c): State<Self>) -> impl IntoResponse {
        if c.alive.load(Ordering::Relaxed) {
            (StatusCode::OK, Json(json!({ "status": "success", "data": "alive" })))
        } else {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "error", "kind": "busy", "message": "shutting down" })),
            )
        }
    }
}

impl Controller for HealthController {
    fn add_route(&self, router: Router) -> Router {
        let routes: Router = Router::new()
            .route(HEALTH_PATH, get(Self::probe))
            .with_state(self.clone());
        router.merge(routes)
    }
}
