// Ledger-facing and peer-facing node facts.

use serde::{Deserialize, Serialize};

use super::hardware::Tier;

/// Daemon sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncStatus {
    pub synced: bool,
    pub height: u64,
}

/// One confirmed node as listed by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub collateral: String,
    pub tier: Tier,
    pub pubkey: String,
    pub activation_height: u64,
    /// `ip` or `ip:apiport`.
    pub ip: String,
}

impl NodeInfo {
    /// Base URL of the node's api.
    pub fn base_url(&self, default_port: u16) -> String {
        if self.ip.contains(':') {
            format!("http://{}", self.ip)
        } else {
            format!("http://{}:{}", self.ip, default_port)
        }
    }
}

/// Benchmark verdict reported by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkStatus {
    Passed,
    Failed,
    Pending,
}

/// Snapshot of this node's standing, consulted before scheduling and probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStanding {
    pub sync: SyncStatus,
    pub confirmed: bool,
    pub benchmark: BenchmarkStatus,
    pub tier: Option<Tier>,
}

impl NodeStanding {
    pub fn is_eligible(&self) -> bool {
        self.sync.synced && self.confirmed && self.benchmark == BenchmarkStatus::Passed
    }
}
