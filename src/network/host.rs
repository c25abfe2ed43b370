// ufw and upnpc driven through child processes.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::Firewall;
use crate::config::{Ports, Upnp};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HostFirewall {
    upnp: bool,
    banned: HashSet<u16>,
    user_blocked: HashSet<u16>,
    upnp_banned: HashSet<u16>,
}

impl HostFirewall {
    pub fn new(ports: &Ports, upnp: &Upnp) -> Self {
        Self {
            upnp: upnp.enabled,
            banned: ports.banned.iter().copied().collect(),
            user_blocked: ports.user_blocked.iter().copied().collect(),
            upnp_banned: ports.upnp_banned.iter().copied().collect(),
        }
    }
}

/// Runs a command and returns its stdout, failing on a non-zero exit.
pub(crate) async fn run(program: &str, args: &[&str]) -> Result<String> {
    let output = timeout(COMMAND_TIMEOUT, Command::new(program).args(args).output())
        .await
        .map_err(|_| anyhow::anyhow!("{program} timed out"))?
        .with_context(|| format!("spawn {program}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "{program} {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    debug!(component = "network", event = "command_ok", program, args = %args.join(" "), "command finished");
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait::async_trait]
impl Firewall for HostFirewall {
    async fn is_active(&self) -> Result<bool> {
        let out = run("sudo", &["ufw", "status"]).await?;
        Ok(out.contains("Status: active"))
    }

    async fn allow(&self, port: u16) -> Result<()> {
        let port = port.to_string();
        run("sudo", &["ufw", "allow", &port]).await?;
        run("sudo", &["ufw", "allow", "out", &port]).await?;
        Ok(())
    }

    async fn deny(&self, port: u16) -> Result<()> {
        let port = port.to_string();
        run("sudo", &["ufw", "delete", "allow", &port]).await?;
        run("sudo", &["ufw", "delete", "allow", "out", &port]).await?;
        Ok(())
    }

    fn upnp_enabled(&self) -> bool {
        self.upnp
    }

    async fn map_upnp(&self, port: u16, label: &str) -> Result<()> {
        let port = port.to_string();
        for proto in ["TCP", "UDP"] {
            run("upnpc", &["-e", label, "-a", "@", &port, &port, proto]).await?;
        }
        Ok(())
    }

    async fn unmap_upnp(&self, port: u16, _label: &str) -> Result<()> {
        let port = port.to_string();
        for proto in ["TCP", "UDP"] {
            run("upnpc", &["-d", &port, proto]).await?;
        }
        Ok(())
    }

    fn is_banned(&self, port: u16) -> bool {
        self.banned.contains(&port)
    }

    fn is_user_blocked(&self, port: u16) -> bool {
        self.user_blocked.contains(&port)
    }

    fn is_upnp_banned(&self, port: u16) -> bool {
        self.upnp && self.upnp_banned.contains(&port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upnp_ban_only_applies_with_upnp() {
        let ports = Ports {
            upnp_banned: vec![31005],
            banned: vec![31001],
            ..Ports::default()
        };
        let off = HostFirewall::new(&ports, &Upnp { enabled: false, firewall: true });
        let on = HostFirewall::new(&ports, &Upnp { enabled: true, firewall: true });
        assert!(!off.is_upnp_banned(31005));
        assert!(on.is_upnp_banned(31005));
        assert!(off.is_blocked(31001));
    }

    #[tokio::test]
    async fn run_reports_failures() {
        assert!(run("false", &[]).await.is_err());
        assert_eq!(run("echo", &["hi"]).await.unwrap().trim(), "hi");
    }
}
