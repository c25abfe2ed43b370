// JSON-RPC daemon client with basic auth.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{parse_tier, AppPayment, Daemon, Transaction, TxOutput};
use crate::http::client::{self, HyperClient};
use crate::model::{BenchmarkStatus, NodeInfo, SyncStatus};

pub struct RpcDaemon {
    client: HyperClient,
    url: String,
    auth: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct RpcReply {
    result: Option<Value>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct RawNode {
    collateral: String,
    tier: String,
    pubkey: String,
    #[serde(default)]
    added_height: u64,
    ip: String,
}

impl RpcDaemon {
    pub fn new(
        client: HyperClient,
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
        timeout: Duration,
    ) -> Self {
        let auth = user.map(|u| {
            let token = STANDARD.encode(format!("{}:{}", u, password.unwrap_or_default()));
            format!("Basic {token}")
        });
        Self {
            client,
            url: url.to_string(),
            auth,
            timeout,
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let payload = json!({
            "jsonrpc": "1.0",
            "id": "fleetd",
            "method": method,
            "params": params,
        });
        let headers: Vec<(&str, &str)> = match &self.auth {
            Some(a) => vec![("authorization", a.as_str())],
            None => vec![],
        };
        let resp = client::post_json(&self.client, &self.url, &headers, &payload, self.timeout)
            .await
            .with_context(|| format!("daemon rpc {method}"))?;
        // The daemon reports rpc errors with status 500 and a json body.
        let reply: RpcReply = resp.json().with_context(|| format!("daemon rpc {method}"))?;
        if let Some(err) = reply.error.filter(|e| !e.is_null()) {
            anyhow::bail!("daemon rpc {method} failed: {err}");
        }
        let result = reply.result.unwrap_or(Value::Null);
        serde_json::from_value(result).with_context(|| format!("decode daemon rpc {method} result"))
    }
}

/// Extracts the text pushed by an `OP_RETURN <hex>` script.
fn op_return_text(asm: &str) -> Option<String> {
    let data = asm.strip_prefix("OP_RETURN ")?.trim();
    let bytes = hex::decode(data).ok()?;
    String::from_utf8(bytes).ok()
}

fn outputs_of(tx: &Value) -> Vec<TxOutput> {
    tx.get("vout")
        .and_then(Value::as_array)
        .map(|outs| {
            outs.iter()
                .map(|o| TxOutput {
                    address: o
                        .pointer("/scriptPubKey/addresses/0")
                        .or_else(|| o.pointer("/scriptPubKey/address"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    value: o.get("value").and_then(Value::as_f64).unwrap_or(0.0),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl Daemon for RpcDaemon {
    async fn sync_status(&self) -> Result<SyncStatus> {
        let info: Value = self.call("getblockchaininfo", json!([])).await?;
        let blocks = info.get("blocks").and_then(Value::as_u64).unwrap_or(0);
        let headers = info.get("headers").and_then(Value::as_u64).unwrap_or(0);
        Ok(SyncStatus {
            synced: headers > 0 && blocks + 1 >= headers,
            height: blocks,
        })
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Transaction> {
        let tx: Value = self.call("getrawtransaction", json!([txid, 1])).await?;
        Ok(Transaction {
            txid: txid.to_string(),
            outputs: outputs_of(&tx),
        })
    }

    async fn node_list(&self) -> Result<Vec<NodeInfo>> {
        let raw: Vec<RawNode> = self.call("listnodes", json!([])).await?;
        Ok(raw
            .into_iter()
            .filter_map(|n| {
                Some(NodeInfo {
                    tier: parse_tier(&n.tier)?,
                    collateral: n.collateral,
                    pubkey: n.pubkey,
                    activation_height: n.added_height,
                    ip: n.ip,
                })
            })
            .collect())
    }

    async fn block_payments(&self, height: u64, address: &str) -> Result<Vec<AppPayment>> {
        let hash: String = self.call("getblockhash", json!([height])).await?;
        let block: Value = self.call("getblock", json!([hash, 2])).await?;
        let txs = block.get("tx").and_then(Value::as_array).cloned().unwrap_or_default();

        let mut payments = Vec::new();
        for tx in &txs {
            let pays = outputs_of(tx).iter().any(|o| o.address.as_deref() == Some(address));
            if !pays {
                continue;
            }
            let memo = tx
                .get("vout")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|o| o.pointer("/scriptPubKey/asm").and_then(Value::as_str))
                .find_map(op_return_text);
            let (Some(hash), Some(txid)) = (memo, tx.get("txid").and_then(Value::as_str)) else {
                continue;
            };
            payments.push(AppPayment {
                txid: txid.to_string(),
                hash,
            });
        }
        Ok(payments)
    }

    async fn benchmark(&self) -> Result<BenchmarkStatus> {
        let v: Value = self.call("getbenchmarks", json!([])).await?;
        let status = v.get("status").and_then(Value::as_str).unwrap_or_default();
        Ok(if parse_tier(status).is_some() {
            BenchmarkStatus::Passed
        } else if status.eq_ignore_ascii_case("failed") {
            BenchmarkStatus::Failed
        } else {
            BenchmarkStatus::Pending
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_op_return_hash() {
        let asm = format!("OP_RETURN {}", hex::encode("abc123"));
        assert_eq!(op_return_text(&asm).as_deref(), Some("abc123"));
        assert!(op_return_text("OP_DUP OP_HASH160").is_none());
    }

    #[test]
    fn outputs_read_both_address_shapes() {
        let tx = json!({"vout": [
            {"value": 1.0, "scriptPubKey": {"addresses": ["a"]}},
            {"value": 2.0, "scriptPubKey": {"address": "b"}},
        ]});
        let outs = outputs_of(&tx);
        assert_eq!(outs[0].address.as_deref(), Some("a"));
        assert_eq!(outs[1].address.as_deref(), Some("b"));
    }
}
