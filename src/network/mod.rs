//! Host firewall and UPnP port mapping seam.

pub mod blocklist;
pub mod host;

use anyhow::Result;

pub use blocklist::PortBlocklist;
pub use host::HostFirewall;

#[async_trait::async_trait]
pub trait Firewall: Send + Sync {
    /// Whether the host firewall is enabled; rules are only managed when it is.
    async fn is_active(&self) -> Result<bool>;

    async fn allow(&self, port: u16) -> Result<()>;

    /// Removes the allow rule for `port`.
    async fn deny(&self, port: u16) -> Result<()>;

    fn upnp_enabled(&self) -> bool;

    async fn map_upnp(&self, port: u16, label: &str) -> Result<()>;

    async fn unmap_upnp(&self, port: u16, label: &str) -> Result<()>;

    fn is_banned(&self, port: u16) -> bool;

    fn is_user_blocked(&self, port: u16) -> bool;

    fn is_upnp_banned(&self, port: u16) -> bool;

    /// Any of the three block lists.
    fn is_blocked(&self, port: u16) -> bool {
        self.is_banned(port) || self.is_user_blocked(port) || self.is_upnp_banned(port)
    }
}
