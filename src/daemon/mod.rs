//! Ledger daemon seam: sync status, transactions, the node list and benchmark state.

pub mod rpc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::model::{BenchmarkStatus, NodeInfo, NodeStanding, SyncStatus, Tier};

pub use rpc::RpcDaemon;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Option<String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Total paid to `address` by this transaction.
    pub fn paid_to(&self, address: &str) -> f64 {
        self.outputs
            .iter()
            .filter(|o| o.address.as_deref() == Some(address))
            .map(|o| o.value)
            .sum()
    }
}

/// A transaction in a block that carries a message hash in its data output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppPayment {
    pub txid: String,
    pub hash: String,
}

#[async_trait::async_trait]
pub trait Daemon: Send + Sync {
    async fn sync_status(&self) -> Result<SyncStatus>;

    async fn raw_transaction(&self, txid: &str) -> Result<Transaction>;

    async fn node_list(&self) -> Result<Vec<NodeInfo>>;

    /// Payments to `address` found in the block at `height`.
    async fn block_payments(&self, height: u64, address: &str) -> Result<Vec<AppPayment>>;

    async fn benchmark(&self) -> Result<BenchmarkStatus>;
}

/// Gathers sync, confirmation and benchmark state for the node owning `pubkey`.
pub async fn standing(daemon: &dyn Daemon, pubkey: &str) -> Result<NodeStanding> {
    let sync = daemon.sync_status().await?;
    let nodes = daemon.node_list().await?;
    let me = nodes.iter().find(|n| n.pubkey == pubkey);
    let benchmark = daemon.benchmark().await?;
    Ok(NodeStanding {
        sync,
        confirmed: me.is_some(),
        benchmark,
        tier: me.map(|n| n.tier),
    })
}

/// Node-list entry for `ip`, falling back to the first entry for `pubkey`.
///
/// A node operator may run several nodes under one key; when the broadcast endpoint does not
/// match any of them the first one listed for the key is used.
pub fn find_node<'a>(nodes: &'a [NodeInfo], ip: &str, pubkey: &str) -> Option<&'a NodeInfo> {
    let host = crate::model::location::host_of(ip);
    nodes
        .iter()
        .find(|n| n.pubkey == pubkey && crate::model::location::host_of(&n.ip) == host)
        .or_else(|| nodes.iter().find(|n| n.pubkey == pubkey))
}

pub(crate) fn parse_tier(raw: &str) -> Option<Tier> {
    Tier::parse(raw)
}
