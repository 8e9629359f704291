//! ChaCha20-Poly1305 with managed nonces.
//!
//! Each instance carries a 4-byte random prefix and a 64-bit counter; the
//! 12-byte nonce is `prefix || counter (BE)`. That allows up to 2^64 seals
//! per key with no nonce reuse, and `seal` stays safe under concurrent
//! callers because the counter is an atomic.
//!
//! Wire layout of every sealed message: `nonce(12) || ciphertext || tag(16)`.

use std::sync::atomic::{AtomicU64, Ordering};

use chacha20poly1305::aead::{Aead as _, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// ChaCha20-Poly1305 key length.
pub const KEY_LEN: usize = 32;
/// Nonce length: 4-byte prefix plus a 64-bit counter.
pub const NONCE_LEN: usize = 12;
/// Poly1305 tag length.
pub const TAG_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key size for chacha20-poly1305")]
    InvalidKeySize,
    #[error("invalid x25519 public key")]
    InvalidPublicKey,
    #[error("ciphertext too short")]
    CiphertextTooShort,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("nonce counter exhausted, instance must be re-keyed")]
    NonceExhausted,
}

/// ChaCha20-Poly1305 instance with automatic nonce management.
///
/// `seal` is safe to call from many tasks at once; `open` is stateless.
pub struct Aead {
    cipher: ChaCha20Poly1305,
    prefix: [u8; 4],
    seq: AtomicU64,
}

impl std::fmt::Debug for Aead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aead").finish_non_exhaustive()
    }
}

impl Aead {
    /// Builds an instance from a 32-byte key and a fresh random nonce prefix.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeySize);
        }
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let mut prefix = [0u8; 4];
        OsRng.fill_bytes(&mut prefix);
        Ok(Self {
            cipher,
            prefix,
            seq: AtomicU64::new(0),
        })
    }

    fn next_nonce(&self) -> Result<[u8; NONCE_LEN], CryptoError> {
        let prev = self.seq.fetch_add(1, Ordering::Relaxed);
        if prev == u64::MAX {
            // Counter wrap would reuse a nonce. Not reachable in practice.
            self.seq.store(u64::MAX, Ordering::Relaxed);
            return Err(CryptoError::NonceExhausted);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce[..4].copy_from_slice(&self.prefix);
        nonce[4..].copy_from_slice(&(prev + 1).to_be_bytes());
        Ok(nonce)
    }

    /// Encrypts and authenticates. Output: `nonce(12) || ciphertext || tag(16)`.
    pub fn seal(&self, plaintext: &[u8], additional_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = self.next_nonce()?;
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: additional_data,
                },
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;
        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts and verifies `nonce(12) || ciphertext || tag(16)`.
    pub fn open(&self, wire: &[u8], additional_data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if wire.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::CiphertextTooShort);
        }
        let (nonce, ciphertext) = wire.split_at(NONCE_LEN);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: additional_data,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)
    }

    /// Authentication tag overhead per message.
    pub const fn overhead() -> usize {
        TAG_LEN
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
