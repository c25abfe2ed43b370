//! Node identity and message integrity.
//!
//! Keys and signatures travel as lowercase hex. Owners and nodes both sign with ed25519;
//! content hashes are SHA-256.

use anyhow::{Context, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::model::error::FleetError;

/// This node's signing identity.
#[derive(Clone)]
pub struct NodeKey {
    signing: SigningKey,
}

impl std::fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeKey")
            .field("public", &self.public_hex())
            .finish_non_exhaustive()
    }
}

impl NodeKey {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Parses a 32-byte hex secret.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(secret.trim()).context("node secret is not hex")?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("node secret must be 32 bytes"))?;
        Ok(Self::from_seed(seed))
    }

    /// Ephemeral identity for nodes started without a configured secret.
    pub fn generate() -> Self {
        Self::from_seed(rand::random::<[u8; 32]>())
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &str) -> String {
        hex::encode(self.signing.sign(message.as_bytes()).to_bytes())
    }
}

/// Verifies a hex signature of `message` by the hex public key `pubkey`.
pub fn verify(pubkey: &str, message: &str, signature: &str) -> Result<(), FleetError> {
    let key_bytes: [u8; 32] = hex::decode(pubkey)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| FleetError::Signature(format!("malformed public key {pubkey:?}")))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| FleetError::Signature(format!("invalid public key: {e}")))?;
    let sig_bytes = hex::decode(signature)
        .map_err(|_| FleetError::Signature("signature is not hex".to_string()))?;
    let sig = Signature::from_slice(&sig_bytes)
        .map_err(|e| FleetError::Signature(format!("malformed signature: {e}")))?;
    key.verify_strict(message.as_bytes(), &sig)
        .map_err(|_| FleetError::Signature("signature does not match".to_string()))
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = NodeKey::from_seed([1u8; 32]);
        let sig = key.sign("hello");
        assert!(verify(&key.public_hex(), "hello", &sig).is_ok());
        assert!(verify(&key.public_hex(), "hell0", &sig).is_err());
    }

    #[test]
    fn rejects_foreign_key() {
        let a = NodeKey::from_seed([1u8; 32]);
        let b = NodeKey::from_seed([2u8; 32]);
        let sig = a.sign("payload");
        assert!(matches!(
            verify(&b.public_hex(), "payload", &sig),
            Err(FleetError::Signature(_))
        ));
    }

    #[test]
    fn from_hex_roundtrips_public_key() {
        let key = NodeKey::from_seed([9u8; 32]);
        let same = NodeKey::from_hex(&hex::encode([9u8; 32])).unwrap();
        assert_eq!(key.public_hex(), same.public_hex());
        assert!(NodeKey::from_hex("abcd").is_err());
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
