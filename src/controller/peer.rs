// Peer-facing endpoints: availability probes and gossip.

use axum::{extract::State, routing::post, Json, Router};
use std::sync::Arc;

use crate::gossip::{GossipHandler, GossipOutcome};
use crate::http::render::{ok, ApiResult};
use crate::http::Controller;
use crate::model::{GossipEnvelope, ProbeRequest};
use crate::prober::ProbeResponder;

pub const PROBE_PATH: &str = "/checkappavailability";
pub const GOSSIP_PATH: &str = "/gossip";

#[derive(Clone)]
pub struct PeerController {
    responder: Arc<ProbeResponder>,
    gossip: Arc<GossipHandler>,
}

impl PeerController {
    pub fn new(responder: Arc<ProbeResponder>, gossip: Arc<GossipHandler>) -> Self {
        Self { responder, gossip }
    }

    /// Answers with the bare `{status,message}` wire body.
    async fn check_availability(State(c): State<Self>, Json(req): Json<ProbeRequest>) -> ApiResult {
        let resp = c.responder.respond(&req).await?;
        Ok(axum::response::IntoResponse::into_response(Json(resp)))
    }

    async fn gossip(State(c): State<Self>, Json(envelope): Json<GossipEnvelope>) -> ApiResult {
        let outcome = match c.gossip.handle(envelope).await? {
            GossipOutcome::Duplicate => "duplicate".to_string(),
            GossipOutcome::Accepted => "accepted".to_string(),
            GossipOutcome::Ignored(reason) => format!("ignored: {reason}"),
        };
        Ok(ok(outcome))
    }
}

impl Controller for PeerController {
    fn add_route(&self, router: Router) -> Router {
        let routes: Router = Router::new()
            .route(PROBE_PATH, post(Self::check_availability))
            .route(GOSSIP_PATH, post(Self::gossip))
            .with_state(self.clone());
        router.merge(routes)
    }
}
