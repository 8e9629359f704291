//! Forward-secret secure channel.
//!
//! An ephemeral X25519 exchange seeds two independent ratchet chains, one
//! per direction. The initiator sends on the first derived key and receives
//! on the second; the responder swaps. After `complete` both sides hold a
//! send chain and a receive chain and the ephemeral secret is gone.

use parking_lot::Mutex;
use thiserror::Error;

use crate::aead::CryptoError;
use crate::kx::{derive_session_keys, X25519KeyPair};
use crate::ratchet::{Chain, EncryptedMessage, RatchetError, Receiver, DEFAULT_MAX_SKIP};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("secure channel not established")]
    NotEstablished,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Ratchet(#[from] RatchetError),
}

struct ChannelState {
    remote_ephemeral: Option<[u8; 32]>,
    send_chain: Option<Chain>,
    recv_chain: Option<Receiver>,
}

/// End-to-end encrypted channel with per-message forward secrecy.
pub struct SecureChannel {
    role: Role,
    max_skip: u64,
    local_ephemeral: X25519KeyPair,
    state: Mutex<ChannelState>,
}

impl SecureChannel {
    pub fn initiator() -> Self {
        Self::new(Role::Initiator, DEFAULT_MAX_SKIP)
    }

    pub fn responder() -> Self {
        Self::new(Role::Responder, DEFAULT_MAX_SKIP)
    }

    /// A channel with a non-default out-of-order window.
    pub fn with_max_skip(role: Role, max_skip: u64) -> Self {
        Self::new(role, max_skip)
    }

    fn new(role: Role, max_skip: u64) -> Self {
        Self {
            role,
            max_skip,
            local_ephemeral: X25519KeyPair::generate(),
            state: Mutex::new(ChannelState {
                remote_ephemeral: None,
                send_chain: None,
                recv_chain: None,
            }),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The local ephemeral public key, to hand to the peer.
    pub fn local_ephemeral_public(&self) -> [u8; 32] {
        self.local_ephemeral.public()
    }

    /// The peer's ephemeral public key, once the exchange has completed.
    pub fn remote_ephemeral_public(&self) -> Option<[u8; 32]> {
        self.state.lock().remote_ephemeral
    }

    /// Completes the key exchange with the peer's ephemeral public key.
    /// Idempotent: once established, further calls are no-ops.
    pub fn complete(&self, peer_ephemeral: &[u8; 32]) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if state.send_chain.is_some() {
            return Ok(());
        }

        let shared = self.local_ephemeral.ecdh(peer_ephemeral)?;
        let (initiator_public, responder_public) = match self.role {
            Role::Initiator => (self.local_ephemeral.public(), *peer_ephemeral),
            Role::Responder => (*peer_ephemeral, self.local_ephemeral.public()),
        };
        let (initiator_key, responder_key) =
            derive_session_keys(&shared[..], &initiator_public, &responder_public)?;

        let (send_key, recv_key) = match self.role {
            Role::Initiator => (initiator_key, responder_key),
            Role::Responder => (responder_key, initiator_key),
        };

        state.send_chain = Some(Chain::new(&send_key[..])?);
        state.recv_chain = Some(Receiver::new(&recv_key[..], self.max_skip)?);
        state.remote_ephemeral = Some(*peer_ephemeral);
        Ok(())
    }

    pub fn is_established(&self) -> bool {
        self.state.lock().send_chain.is_some()
    }

    /// Encrypts one message. Output: `generation(u64 BE) || aead output`.
    pub fn encrypt(&self, plaintext: &[u8], ad: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let state = self.state.lock();
        let chain = state.send_chain.as_ref().ok_or(ChannelError::NotEstablished)?;
        Ok(chain.seal(plaintext, ad)?.encode())
    }

    /// Decrypts one message produced by the peer's `encrypt`.
    pub fn decrypt(&self, wire: &[u8], ad: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let state = self.state.lock();
        let receiver = state.recv_chain.as_ref().ok_or(ChannelError::NotEstablished)?;
        let message = EncryptedMessage::decode(wire)?;
        Ok(receiver.open(&message, ad)?)
    }

    /// Current send-chain generation; zero before establishment.
    pub fn send_generation(&self) -> u64 {
        self.state
            .lock()
            .send_chain
            .as_ref()
            .map_or(0, Chain::generation)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn established_pair() -> (SecureChannel, SecureChannel) {
        let initiator = SecureChannel::initiator();
        let responder = SecureChannel::responder();
        initiator
            .complete(&responder.local_ephemeral_public())
            .unwrap();
        responder
            .complete(&initiator.local_ephemeral_public())
            .unwrap();
        (initiator, responder)
    }

    #[test]
    fn round_trip_both_directions() {
        let (initiator, responder) = established_pair();

        let messages: &[&[u8]] = &[
            b"hello from initiator",
            b"hello from responder",
            b"another message",
        ];
        for msg in messages {
            let wire = initiator.encrypt(msg, b"").unwrap();
            assert_eq!(responder.decrypt(&wire, b"").unwrap(), *msg);
        }
        for msg in messages {
            let wire = responder.encrypt(msg, b"").unwrap();
            assert_eq!(initiator.decrypt(&wire, b"").unwrap(), *msg);
        }
    }

    #[test]
    fn out_of_order_delivery() {
        let (initiator, responder) = established_pair();

        let ct0 = initiator.encrypt(b"msg0", b"").unwrap();
        let ct1 = initiator.encrypt(b"msg1", b"").unwrap();
        let ct2 = initiator.encrypt(b"msg2", b"").unwrap();

        assert_eq!(responder.decrypt(&ct2, b"").unwrap(), b"msg2");
        assert_eq!(responder.decrypt(&ct0, b"").unwrap(), b"msg0");
        assert_eq!(responder.decrypt(&ct1, b"").unwrap(), b"msg1");

        let ct3 = initiator.encrypt(b"msg3", b"").unwrap();
        assert_eq!(responder.decrypt(&ct3, b"").unwrap(), b"msg3");
    }

    #[test]
    fn shuffled_burst_decrypts() {
        let (initiator, responder) = established_pair();
        let count = 50usize;
        let mut wires: Vec<(usize, Vec<u8>)> = (0..count)
            .map(|i| (i, initiator.encrypt(format!("m{i}").as_bytes(), b"").unwrap()))
            .collect();
        // Deterministic permutation: odd indices first, reversed, then evens.
        wires.sort_by_key(|(i, _)| (i % 2 == 0, count - i));
        for (i, wire) in wires {
            assert_eq!(
                responder.decrypt(&wire, b"").unwrap(),
                format!("m{i}").as_bytes()
            );
        }
    }

    #[test]
    fn gap_beyond_skip_window_fails() {
        let (initiator, responder) = established_pair();
        // Seal and discard a window's worth of messages, then one more.
        for _ in 0..=DEFAULT_MAX_SKIP {
            let _ = initiator.encrypt(b"lost", b"").unwrap();
        }
        let beyond = initiator.encrypt(b"too far ahead", b"").unwrap();
        assert_eq!(
            responder.decrypt(&beyond, b"").unwrap_err(),
            ChannelError::Ratchet(RatchetError::InvalidGeneration)
        );
    }

    #[test]
    fn not_established_errors() {
        let channel = SecureChannel::initiator();
        assert_eq!(
            channel.encrypt(b"x", b"").unwrap_err(),
            ChannelError::NotEstablished
        );
        assert_eq!(
            channel.decrypt(&[0u8; 16], b"").unwrap_err(),
            ChannelError::NotEstablished
        );
        assert!(!channel.is_established());
    }

    #[test]
    fn complete_is_idempotent() {
        let (initiator, responder) = established_pair();
        let remote = responder.local_ephemeral_public();
        assert_eq!(initiator.remote_ephemeral_public(), Some(remote));

        let other = X25519KeyPair::generate();
        // A second complete with a different key changes nothing.
        initiator.complete(&other.public()).unwrap();
        assert_eq!(initiator.remote_ephemeral_public(), Some(remote));
        let wire = initiator.encrypt(b"still paired", b"").unwrap();
        assert_eq!(responder.decrypt(&wire, b"").unwrap(), b"still paired");
    }

    #[test]
    fn send_generation_advances() {
        let (initiator, _responder) = established_pair();
        assert_eq!(initiator.send_generation(), 0);
        let _ = initiator.encrypt(b"one", b"").unwrap();
        let _ = initiator.encrypt(b"two", b"").unwrap();
        assert_eq!(initiator.send_generation(), 2);
    }

    #[test]
    fn tampered_wire_fails() {
        let (initiator, responder) = established_pair();
        let mut wire = initiator.encrypt(b"payload", b"").unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0xff;
        assert!(matches!(
            responder.decrypt(&wire, b"").unwrap_err(),
            ChannelError::Ratchet(RatchetError::Crypto(CryptoError::DecryptionFailed))
        ));
    }
}
