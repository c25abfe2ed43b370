// Shows the running configuration with secrets masked.

use axum::{extract::State, routing::get, Router};
use std::sync::Arc;

use crate::config::Config;
use crate::http::render::{ok, ApiResult};
use crate::http::Controller;

const MASK: &str = "***";

/// ShowConfigController displays the current configuration.
#[derive(Clone)]
pub struct ShowConfigController {
    cfg: Arc<Config>,
}

impl ShowConfigController {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self { cfg }
    }

    /// The node secret and the daemon password never leave the process.
    pub fn redacted(cfg: &Config) -> Config {
        let mut shown = cfg.clone();
        if shown.node.identity.secret.is_some() {
            shown.node.identity.secret = Some(MASK.to_string());
        }
        if shown.node.daemon.password.is_some() {
            shown.node.daemon.password = Some(MASK.to_string());
        }
        shown
    }

    async fn show_config(State(c): State<Self>) -> ApiResult {
        Ok(ok(Self::redacted(&c.cfg)))
    }
}

impl Controller for ShowConfigController {
    fn add_route(&self, router: Router) -> Router {
        let routes: Router = Router::new()
            .route("/node/config", get(Self::show_config))
            .with_state(self.clone());
        router.merge(routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::new_test_config;

    #[test]
    fn secrets_are_masked() {
        let cfg = new_test_config();
        assert!(cfg.node.identity.secret.is_some());
        let shown = ShowConfigController::redacted(&cfg);
        assert_eq!(shown.node.identity.secret.as_deref(), Some(MASK));
        assert_eq!(shown.node.daemon.password.as_deref(), Some(MASK));
        assert_eq!(shown.node.daemon.user, cfg.node.daemon.user);
    }
}
