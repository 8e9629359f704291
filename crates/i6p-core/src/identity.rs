//! Peer identity: Ed25519 keypairs and the self-certifying PeerId.
//!
//! There is no PKI anchor. A peer's identifier is `SHA-256(public key)`, so
//! whoever holds the private key can prove ownership of the id and nobody
//! can claim an id they cannot sign for.

use core::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

/// Ed25519 public key length.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Canonical Ed25519 keypair encoding: seed followed by the public key.
pub const PRIVATE_KEY_LEN: usize = 64;
/// Ed25519 signature length.
pub const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid ed25519 key size")]
    InvalidKeySize,
    #[error("peer id must be exactly 64 hex characters")]
    InvalidPeerId,
}

// ── PeerId ────────────────────────────────────────────────────────────────────

/// Stable identifier for a peer: `SHA-256(public key)`.
///
/// The textual form is 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self(Sha256::digest(public_key).into())
    }

    /// Parses the hex form. Anything other than exactly 64 hex characters is
    /// rejected.
    pub fn parse_hex(s: &str) -> Result<Self, IdentityError> {
        if s.len() != 64 {
            return Err(IdentityError::InvalidPeerId);
        }
        let mut id = [0u8; 32];
        hex::decode_to_slice(s, &mut id).map_err(|_| IdentityError::InvalidPeerId)?;
        Ok(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", hex::encode(self.0))
    }
}

// ── KeyPair ───────────────────────────────────────────────────────────────────

/// A peer's long-term Ed25519 keypair.
///
/// Value semantics: cloning copies the signing key. The private key never
/// leaves the struct except through [`KeyPair::private_key_bytes`].
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generates a fresh keypair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstructs a keypair from the canonical 64-byte private encoding.
    /// The public key argument must match the embedded one.
    pub fn from_bytes(public_key: &[u8], private_key: &[u8]) -> Result<Self, IdentityError> {
        if public_key.len() != PUBLIC_KEY_LEN || private_key.len() != PRIVATE_KEY_LEN {
            return Err(IdentityError::InvalidKeySize);
        }
        let mut keypair_bytes = [0u8; PRIVATE_KEY_LEN];
        keypair_bytes.copy_from_slice(private_key);
        let signing = SigningKey::from_keypair_bytes(&keypair_bytes)
            .map_err(|_| IdentityError::InvalidKeySize)?;
        if signing.verifying_key().to_bytes() != public_key {
            return Err(IdentityError::InvalidKeySize);
        }
        Ok(Self { signing })
    }

    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signing.verifying_key().to_bytes()
    }

    /// The canonical 64-byte keypair encoding, for persistent storage.
    /// Store securely; the buffer is wiped when dropped.
    pub fn private_key_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_LEN]> {
        Zeroizing::new(self.signing.to_keypair_bytes())
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.public_key())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.signing.sign(message).to_bytes()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", self.peer_id())
    }
}

/// Verifies an Ed25519 signature. Malformed keys or signatures verify false.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(pk_bytes) = <[u8; PUBLIC_KEY_LEN]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying) = VerifyingKey::from_bytes(&pk_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; SIGNATURE_LEN]>::try_from(signature) else {
        return false;
    };
    verifying
        .verify(message, &Signature::from_bytes(&sig_bytes))
        .is_ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
