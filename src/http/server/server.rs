//! HTTP server implementation.

use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

use crate::config::{Config, ConfigTrait};
use crate::controller::controller::Controller;
use crate::middleware::middleware::Middleware;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Node API server: user API, peer endpoints and node administration.
pub struct HttpServer {
    shutdown_token: CancellationToken,
    config: Arc<Config>,
    router: Router,
}

impl HttpServer {
    pub fn new(
        shutdown_token: CancellationToken,
        config: Arc<Config>,
        controllers: Vec<Box<dyn Controller>>,
        middlewares: Vec<Box<dyn Middleware>>,
    ) -> Result<Arc<Self>> {
        let timeout = config
            .api()
            .and_then(|a| a.timeout)
            .unwrap_or(DEFAULT_TIMEOUT);
        let router = Self::build_router(controllers);
        let router = Self::merge_middlewares(router, middlewares, timeout);

        Ok(Arc::new(Self {
            shutdown_token,
            config,
            router,
        }))
    }

    /// Router with every controller and middleware applied, for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    fn name(&self) -> &str {
        self.config
            .api()
            .and_then(|a| a.name.as_deref())
            .unwrap_or("fleetd")
    }

    /// Serves on `0.0.0.0:{api_port}` until the shutdown token fires.
    pub async fn listen_and_serve(&self) -> Result<()> {
        let name = self.name();
        let port = self.config.identity().api_port;
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("bind api listener on {addr}"))?;

        info!(component = "server", event = "started", name, port, "server started");

        let shutdown_token = self.shutdown_token.clone();
        let serve_future =
            axum::serve(listener, self.router.clone()).with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            });

        if let Err(e) = serve_future.await {
            error!(
                component = "server",
                event = "listen_and_serve_failed",
                name,
                port,
                error = %e,
                "server failed to listen and serve"
            );
            return Err(e.into());
        }

        info!(component = "server", event = "stopped", name, port, "server stopped");
        Ok(())
    }

    fn build_router(controllers: Vec<Box<dyn Controller>>) -> Router {
        let mut router = Router::new();
        for controller in controllers {
            router = controller.add_route(router);
        }
        router
    }

    /// Applies middlewares in reverse order so the first listed wraps outermost.
    fn merge_middlewares(router: Router, middlewares: Vec<Box<dyn Middleware>>, timeout: Duration) -> Router {
        let mut result = router.layer(TimeoutLayer::new(timeout));
        for middleware in middlewares.iter().rev() {
            result = middleware.apply(result);
        }
        result
    }
}
