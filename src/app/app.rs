// Node application: builds the components, serves the API and drives the loops.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigTrait};
use crate::governor::Governor;
use crate::shutdown::GracefulShutdown;

use super::components::{Adapters, Components};
use super::server::NodeServer;

/// Encapsulates the entire node state.
#[derive(Clone)]
pub struct App {
    shutdown_token: CancellationToken,
    components: Arc<Components>,
    server: Arc<NodeServer>,
}

impl App {
    /// Node on the host adapters.
    pub fn new(shutdown_token: CancellationToken, cfg: Config) -> Result<Self> {
        let adapters = Adapters::host(&cfg);
        Self::with_adapters(shutdown_token, cfg, adapters)
    }

    pub fn with_adapters(shutdown_token: CancellationToken, cfg: Config, adapters: Adapters) -> Result<Self> {
        let components = Arc::new(Components::build(shutdown_token.clone(), Arc::new(cfg), adapters)?);
        let server = Arc::new(NodeServer::new(shutdown_token.clone(), &components)?);
        Ok(Self {
            shutdown_token,
            components,
            server,
        })
    }

    pub fn components(&self) -> &Arc<Components> {
        &self.components
    }

    pub fn server(&self) -> &Arc<NodeServer> {
        &self.server
    }

    /// Restores the store, re-arms monitoring and starts every loop.
    pub async fn start(&self) {
        if let Some(dumper) = &self.components.dumper {
            if let Err(e) = dumper.load().await {
                warn!(component = "app", scope = "store", event = "load_failed", error = %format!("{e:#}"), "starting with an empty store");
            }
        }
        match self.components.lifecycle.resume_monitoring().await {
            Ok(count) => info!(component = "app", event = "monitoring_resumed", count, "monitoring re-armed"),
            Err(e) => warn!(component = "app", event = "monitoring_failed", error = %e, "cannot re-arm monitoring"),
        }
        self.components.start_loops();
    }

    /// Starts the node and serves the API in the background; `gsh` is released once closed.
    pub async fn serve(&self, gsh: Arc<GracefulShutdown>) -> Result<()> {
        self.start().await;

        let app = self.clone();
        tokio::task::spawn(async move {
            if let Err(e) = app.server.listen_and_serve().await {
                error!(component = "app", scope = "server", event = "serve_failed", error = %format!("{e:#}"), "server failed to serve");
            }
            if let Err(e) = app.close().await {
                error!(component = "app", scope = "shutdown", event = "close_failed", error = %format!("{e:#}"), "application close failed");
            }
            gsh.done();
        });

        info!(
            component = "app",
            event = "started",
            endpoint = %self.components.cfg.identity().endpoint(),
            "application lifecycle"
        );
        Ok(())
    }

    /// Stops the loops, waits for them (the snapshot loop dumps on exit) and stops monitoring.
    pub async fn close(&self) -> Result<()> {
        self.server.mark_down();
        self.components.governor.stop();
        self.components.governor.join().await;
        self.components.lifecycle.stop_monitoring();
        self.shutdown_token.cancel();

        info!(component = "app", event = "stopped", "application lifecycle");
        Ok(())
    }
}
