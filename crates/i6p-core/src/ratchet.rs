//! Symmetric message-key ratchet.
//!
//! Each step hashes the chain key forward and derives a one-shot message
//! key, so compromising the current state never reveals earlier messages.
//! The derivation is fixed and must match on both ends:
//!
//!   message key    = SHA-256(chain key || 0x01)
//!   next chain key = SHA-256(chain key || 0x02)
//!
//! The receiver tolerates reordering by caching the chain keys of skipped
//! generations, bounded by `max_skip`.

use std::collections::HashMap;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::aead::{Aead, CryptoError};

/// Ratchet steps allowed per chain before an external re-key is required.
pub const MAX_GENERATION: u64 = 1 << 32;
/// Default out-of-order tolerance for receivers.
pub const DEFAULT_MAX_SKIP: u64 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RatchetError {
    #[error("maximum generation reached, re-key required")]
    Exhausted,
    #[error("invalid generation number")]
    InvalidGeneration,
    #[error("encrypted message too short")]
    MessageTooShort,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

fn derive_keys(chain_key: &[u8; 32]) -> (Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>) {
    let mut hasher = Sha256::new();
    hasher.update(chain_key);
    hasher.update([0x01]);
    let message_key = Zeroizing::new(hasher.finalize().into());

    let mut hasher = Sha256::new();
    hasher.update(chain_key);
    hasher.update([0x02]);
    let next_chain_key = Zeroizing::new(hasher.finalize().into());

    (next_chain_key, message_key)
}

// ── EncryptedMessage ──────────────────────────────────────────────────────────

/// A ratcheted message. Wire: `generation(u64 BE) || aead output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub generation: u64,
    pub ciphertext: Vec<u8>,
}

impl EncryptedMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.ciphertext.len());
        out.extend_from_slice(&self.generation.to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, RatchetError> {
        if data.len() < 8 {
            return Err(RatchetError::MessageTooShort);
        }
        let generation = u64::from_be_bytes(
            data[..8]
                .try_into()
                .map_err(|_| RatchetError::MessageTooShort)?,
        );
        Ok(Self {
            generation,
            ciphertext: data[8..].to_vec(),
        })
    }
}

// ── Send chain ────────────────────────────────────────────────────────────────

struct ChainState {
    chain_key: Zeroizing<[u8; 32]>,
    generation: u64,
}

/// The sending half of the ratchet.
pub struct Chain {
    state: Mutex<ChainState>,
}

impl Chain {
    pub fn new(initial_key: &[u8]) -> Result<Self, RatchetError> {
        if initial_key.len() != 32 {
            return Err(CryptoError::InvalidKeySize.into());
        }
        let mut chain_key = Zeroizing::new([0u8; 32]);
        chain_key.copy_from_slice(initial_key);
        Ok(Self {
            state: Mutex::new(ChainState {
                chain_key,
                generation: 0,
            }),
        })
    }

    /// Advances the chain and returns the AEAD for this step together with
    /// the generation the message belongs to. The previous chain key is
    /// overwritten before this returns; that is the forward-secrecy step.
    fn step(&self) -> Result<(Aead, u64), RatchetError> {
        let message_key;
        let generation;
        {
            let mut state = self.state.lock();
            if state.generation >= MAX_GENERATION {
                return Err(RatchetError::Exhausted);
            }
            let (next_chain_key, key) = derive_keys(&state.chain_key);
            generation = state.generation;
            state.chain_key = next_chain_key;
            state.generation += 1;
            message_key = key;
        }
        Ok((Aead::new(&message_key[..])?, generation))
    }

    /// Encrypts one message and advances the chain.
    pub fn seal(&self, plaintext: &[u8], ad: &[u8]) -> Result<EncryptedMessage, RatchetError> {
        let (aead, generation) = self.step()?;
        let ciphertext = aead.seal(plaintext, ad)?;
        Ok(EncryptedMessage {
            generation,
            ciphertext,
        })
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Snapshot of the chain state for persistence or resumption.
    /// This is live keying material; handle accordingly.
    pub fn export(&self) -> (Zeroizing<[u8; 32]>, u64) {
        let state = self.state.lock();
        (state.chain_key.clone(), state.generation)
    }
}

// ── Receiver ──────────────────────────────────────────────────────────────────

struct ReceiverState {
    current: Zeroizing<[u8; 32]>,
    current_generation: u64,
    skipped: HashMap<u64, Zeroizing<[u8; 32]>>,
}

/// The receiving half of the ratchet, tolerant of out-of-order delivery up
/// to `max_skip` generations.
pub struct Receiver {
    state: Mutex<ReceiverState>,
    max_skip: u64,
}

impl Receiver {
    pub fn new(initial_key: &[u8], max_skip: u64) -> Result<Self, RatchetError> {
        if initial_key.len() != 32 {
            return Err(CryptoError::InvalidKeySize.into());
        }
        let mut current = Zeroizing::new([0u8; 32]);
        current.copy_from_slice(initial_key);
        Ok(Self {
            state: Mutex::new(ReceiverState {
                current,
                current_generation: 0,
                skipped: HashMap::new(),
            }),
            max_skip,
        })
    }

    /// Decrypts a message at any generation within the skip window.
    ///
    /// A generation below the current one must have a cached skipped key;
    /// otherwise it is a replay or an ancient message and fails with
    /// `InvalidGeneration`. A cached key is consumed even if decryption
    /// fails, so a given generation can only be attempted once.
    pub fn open(&self, message: &EncryptedMessage, ad: &[u8]) -> Result<Vec<u8>, RatchetError> {
        let mut state = self.state.lock();
        let generation = message.generation;

        // The expected in-order message.
        if generation == state.current_generation {
            let (next_chain_key, message_key) = derive_keys(&state.current);
            let aead = Aead::new(&message_key[..])?;
            let plaintext = aead.open(&message.ciphertext, ad)?;
            state.current = next_chain_key;
            state.current_generation += 1;
            return Ok(plaintext);
        }

        // A previously skipped generation.
        if let Some(cached) = state.skipped.remove(&generation) {
            let (_, message_key) = derive_keys(&cached);
            let aead = Aead::new(&message_key[..])?;
            return Ok(aead.open(&message.ciphertext, ad)?);
        }

        // A message from the future: cache the intermediate chain keys.
        if generation > state.current_generation {
            let skip = generation - state.current_generation;
            if skip > self.max_skip {
                return Err(RatchetError::InvalidGeneration);
            }
            let mut chain_key = state.current.clone();
            for gen in state.current_generation..generation {
                let (next_chain_key, _) = derive_keys(&chain_key);
                state.skipped.insert(gen, chain_key);
                chain_key = next_chain_key;
            }
            let (next_chain_key, message_key) = derive_keys(&chain_key);
            state.current = next_chain_key;
            state.current_generation = generation + 1;

            let aead = Aead::new(&message_key[..])?;
            return Ok(aead.open(&message.ciphertext, ad)?);
        }

        Err(RatchetError::InvalidGeneration)
    }

    pub fn current_generation(&self) -> u64 {
        self.state.lock().current_generation
    }

    /// Number of cached skipped-generation keys.
    pub fn skipped_len(&self) -> usize {
        self.state.lock().skipped.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
