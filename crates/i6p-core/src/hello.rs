//! The signed HELLO record, first frame on the control stream.
//!
//! HELLO binds the transport connection to an Ed25519 identity. The wire
//! payload is JSON with byte fields in base64 and the peer id in hex; the
//! signature however covers the canonical signing bytes, which are computed
//! from the logical fields and are independent of the wire encoding:
//!
//!   peer id(32, binary) || public key(32) || timestamp(u64 BE) || nonce
//!   then per capability, keys in lexicographic order:
//!   key len(u16 BE) || key || value len(u16 BE) || value

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{self, IdentityError, KeyPair, PeerId, PUBLIC_KEY_LEN};

/// HELLO nonce length.
pub const NONCE_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum HelloError {
    #[error("hello missing or malformed public key")]
    MissingKey,
    #[error("hello missing peer id")]
    MissingPeerId,
    #[error("hello peer id does not match public key")]
    PeerIdMismatch,
    #[error("hello signature verification failed")]
    BadSignature,
    #[error("hello encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// A session HELLO. Created at handshake start, signed once, sent once per
/// direction, discarded after verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    /// Hex form of the sender's PeerId.
    pub peer_id: String,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    pub timestamp_sec: i64,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    /// Ordered so the wire encoding and the signing bytes agree on key order.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capabilities: BTreeMap<String, String>,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl Hello {
    /// A fresh unsigned HELLO with a random nonce and the current time.
    pub fn new(keypair: &KeyPair, capabilities: &BTreeMap<String, String>) -> Self {
        let mut nonce = vec![0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        Self {
            peer_id: keypair.peer_id().to_string(),
            public_key: keypair.public_key().to_vec(),
            timestamp_sec: unix_now(),
            nonce,
            capabilities: capabilities.clone(),
            signature: Vec::new(),
        }
    }

    /// The canonical byte sequence the signature covers.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, HelloError> {
        if self.public_key.len() != PUBLIC_KEY_LEN {
            return Err(HelloError::MissingKey);
        }
        let id = PeerId::parse_hex(&self.peer_id)?;

        let mut out = Vec::with_capacity(32 + PUBLIC_KEY_LEN + 8 + self.nonce.len() + 64);
        out.extend_from_slice(id.as_bytes());
        out.extend_from_slice(&self.public_key);
        out.extend_from_slice(&(self.timestamp_sec as u64).to_be_bytes());
        out.extend_from_slice(&self.nonce);
        for (key, value) in &self.capabilities {
            out.extend_from_slice(&(key.len() as u16).to_be_bytes());
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(&(value.len() as u16).to_be_bytes());
            out.extend_from_slice(value.as_bytes());
        }
        Ok(out)
    }

    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), HelloError> {
        let bytes = self.signing_bytes()?;
        self.signature = keypair.sign(&bytes).to_vec();
        Ok(())
    }

    /// Full verification: the public key is well-formed, it hashes to the
    /// claimed peer id, and the signature covers the signing bytes.
    pub fn verify(&self) -> Result<(), HelloError> {
        if self.public_key.len() != PUBLIC_KEY_LEN {
            return Err(HelloError::MissingKey);
        }
        let claimed = PeerId::parse_hex(&self.peer_id)?;
        if PeerId::from_public_key(&self.public_key) != claimed {
            return Err(HelloError::PeerIdMismatch);
        }
        let bytes = self.signing_bytes()?;
        if !identity::verify(&self.public_key, &bytes, &self.signature) {
            return Err(HelloError::BadSignature);
        }
        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, HelloError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, HelloError> {
        let hello: Hello = serde_json::from_slice(data)?;
        if hello.peer_id.is_empty() {
            return Err(HelloError::MissingPeerId);
        }
        Ok(hello)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
