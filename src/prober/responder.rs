// Peer side of the availability probe: dial back the requester's ports.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::daemon::{self, Daemon};
use crate::model::{FleetError, ProbeRequest, ProbeResponse};

const COMPONENT: &str = "responder";

pub struct ProbeResponder {
    daemon: Arc<dyn Daemon>,
    dial_timeout: Duration,
}

impl ProbeResponder {
    pub fn new(daemon: Arc<dyn Daemon>, dial_timeout: Duration) -> Self {
        Self {
            daemon,
            dial_timeout,
        }
    }

    /// The requester must be a listed node and must have signed the request.
    async fn authenticate(&self, req: &ProbeRequest) -> Result<(), FleetError> {
        let nodes = self.daemon.node_list().await?;
        if daemon::find_node(&nodes, &req.ip, &req.pub_key).is_none() {
            return Err(FleetError::Signature(format!(
                "{}:{} is not in the node list",
                req.ip, req.port
            )));
        }
        req.verify()
    }

    /// Answers `success` only when every requested port accepted a connection.
    pub async fn respond(&self, req: &ProbeRequest) -> Result<ProbeResponse, FleetError> {
        self.authenticate(req).await?;
        if req.ports.is_empty() {
            return Ok(ProbeResponse::error("no ports to check"));
        }
        for &port in &req.ports {
            if let Err(reason) = self.dial(&req.ip, port).await {
                debug!(
                    component = COMPONENT,
                    event = "closed",
                    ip = %req.ip,
                    port,
                    app = %req.appname,
                    reason = %reason,
                    "requested port not reachable"
                );
                return Ok(ProbeResponse::error(format!(
                    "port {port} of {} is not reachable: {reason}",
                    req.ip
                )));
            }
        }
        Ok(ProbeResponse::success(format!(
            "{} reachable on {} port(s)",
            req.ip,
            req.ports.len()
        )))
    }

    async fn dial(&self, ip: &str, port: u16) -> Result<(), String> {
        match timeout(self.dial_timeout, TcpStream::connect((ip, port))).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("timed out".to_string()),
        }
    }
}
