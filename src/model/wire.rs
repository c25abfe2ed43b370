// Peer wire protocol: gossip envelopes and the availability probe exchange.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::error::FleetError;
use crate::crypto::{self, NodeKey};

pub const GOSSIP_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GossipKind {
    AppRunning,
    AppRegister,
    AppUpdate,
    AppRequest,
}

impl fmt::Display for GossipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GossipKind::AppRunning => "apprunning",
            GossipKind::AppRegister => "appregister",
            GossipKind::AppUpdate => "appupdate",
            GossipKind::AppRequest => "apprequest",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipEnvelope {
    #[serde(rename = "type")]
    pub kind: GossipKind,
    pub version: u8,
    pub hash: String,
    /// Sender endpoint as registered in the node list.
    pub ip: String,
    pub timestamp: i64,
    pub signature: String,
    pub payload: Value,
}

impl GossipEnvelope {
    fn signing_payload(kind: GossipKind, version: u8, ip: &str, timestamp: i64, payload: &Value) -> String {
        format!("{kind}{version}{ip}{timestamp}{payload}")
    }

    /// Builds and signs an envelope with this node's key.
    pub fn seal(kind: GossipKind, ip: &str, timestamp: i64, payload: Value, key: &NodeKey) -> Self {
        let data = Self::signing_payload(kind, GOSSIP_VERSION, ip, timestamp, &payload);
        GossipEnvelope {
            kind,
            version: GOSSIP_VERSION,
            hash: crypto::sha256_hex(data.as_bytes()),
            ip: ip.to_string(),
            timestamp,
            signature: key.sign(&data),
            payload,
        }
    }

    /// Checks the hash and the signature against the sender's public key.
    pub fn verify(&self, pubkey: &str) -> Result<(), FleetError> {
        let data = Self::signing_payload(self.kind, self.version, &self.ip, self.timestamp, &self.payload);
        if crypto::sha256_hex(data.as_bytes()) != self.hash {
            return Err(FleetError::Signature("gossip hash mismatch".to_string()));
        }
        crypto::verify(pubkey, &data, &self.signature)
    }
}

/// `POST /checkappavailability` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeRequest {
    /// Requesting node's public address (host only).
    pub ip: String,
    /// Requesting node's api port, used to locate it in the node list.
    pub port: u16,
    pub appname: String,
    pub ports: Vec<u16>,
    #[serde(rename = "pubKey")]
    pub pub_key: String,
    pub signature: String,
}

impl ProbeRequest {
    fn signing_payload(ip: &str, port: u16, appname: &str, ports: &[u16]) -> String {
        let ports = ports.iter().map(u16::to_string).collect::<Vec<_>>().join(",");
        format!("{ip}{port}{appname}{ports}")
    }

    pub fn signed(ip: &str, port: u16, appname: &str, ports: Vec<u16>, key: &NodeKey) -> Self {
        let signature = key.sign(&Self::signing_payload(ip, port, appname, &ports));
        ProbeRequest {
            ip: ip.to_string(),
            port,
            appname: appname.to_string(),
            ports,
            pub_key: key.public_hex(),
            signature,
        }
    }

    pub fn verify(&self) -> Result<(), FleetError> {
        let data = Self::signing_payload(&self.ip, self.port, &self.appname, &self.ports);
        crypto::verify(&self.pub_key, &data, &self.signature)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Success,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub status: ProbeStatus,
    #[serde(default)]
    pub message: String,
}

impl ProbeResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ProbeStatus::Error,
            message: message.into(),
        }
    }
}
