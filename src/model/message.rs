// Signed specification envelopes (provisional and permanent).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::spec::AppSpec;
use crate::crypto;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Register,
    Update,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Register => write!(f, "register"),
            MessageType::Update => write!(f, "update"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub version: u8,
    pub specification: AppSpec,
    pub hash: String,
    /// Unix milliseconds set by the author.
    pub timestamp: i64,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl SpecMessage {
    /// The string the owner signs.
    pub fn signing_payload(kind: MessageType, version: u8, spec: &AppSpec, timestamp: i64) -> String {
        format!("{kind}{version}{}{timestamp}", spec.canonical_json())
    }

    pub fn compute_hash(kind: MessageType, version: u8, spec: &AppSpec, timestamp: i64, signature: &str) -> String {
        let payload = Self::signing_payload(kind, version, spec, timestamp);
        crypto::sha256_hex(format!("{payload}{signature}").as_bytes())
    }

    /// Builds an unanchored message and fills in its hash.
    pub fn new(kind: MessageType, specification: AppSpec, timestamp: i64, signature: String) -> Self {
        let version = specification.version();
        let hash = Self::compute_hash(kind, version, &specification, timestamp, &signature);
        Self {
            kind,
            version,
            specification,
            hash,
            timestamp,
            signature,
            txid: None,
            height: None,
            value: None,
        }
    }

    pub fn payload(&self) -> String {
        Self::signing_payload(self.kind, self.version, &self.specification, self.timestamp)
    }

    /// True when `hash` matches the envelope content.
    pub fn hash_matches(&self) -> bool {
        Self::compute_hash(
            self.kind,
            self.version,
            &self.specification,
            self.timestamp,
            &self.signature,
        ) == self.hash
    }

    pub fn name(&self) -> &str {
        self.specification.name()
    }

    pub fn is_anchored(&self) -> bool {
        self.txid.is_some() && self.height.is_some()
    }

    /// Copy carrying ledger anchoring.
    pub fn anchored(&self, txid: &str, height: u64, value: f64) -> SpecMessage {
        let mut msg = self.clone();
        msg.txid = Some(txid.to_string());
        msg.height = Some(height);
        msg.value = Some(value);
        msg
    }
}

/// A message accepted by `register_provisional`, waiting for its payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionalMessage {
    pub message: SpecMessage,
    pub received_at: i64,
    pub expires_at: i64,
}
