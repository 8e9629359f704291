//! Session resumption tickets.
//!
//! A ticket carries a previously derived session key, encrypted under the
//! store's key so only the issuer (or a cluster sharing the key) can read
//! it back. Wire layout: `id(16) || nonce(12) || ct(80) || tag(16)`, where
//! the nonce is the AEAD output's embedded prefix and the ticket id is the
//! associated data.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use static_assertions::const_assert_eq;
use thiserror::Error;
use zeroize::Zeroizing;

use i6p_core::aead::{Aead, NONCE_LEN, TAG_LEN};
use i6p_core::identity::PeerId;

pub const TICKET_ID_LEN: usize = 16;
pub const TICKET_KEY_LEN: usize = 32;
/// Default ticket lifetime.
pub const TICKET_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

// peer id (32) + issued_at (8) + expires_at (8) + session key (32)
const TICKET_PLAINTEXT_LEN: usize = 80;
const_assert_eq!(TICKET_PLAINTEXT_LEN, 32 + 8 + 8 + 32);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("ticket not found")]
    NotFound,
    #[error("ticket expired")]
    Expired,
    #[error("ticket invalid")]
    Invalid,
}

/// A resumption record. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: [u8; TICKET_ID_LEN],
    pub issued_at: i64,
    pub expires_at: i64,
    pub peer_id: PeerId,
    pub session_key: [u8; 32],
}

/// Issues, validates, and serializes tickets. Lookups take a read lock;
/// mutations take the write lock.
pub struct TicketStore {
    key: Zeroizing<[u8; TICKET_KEY_LEN]>,
    lifetime: Duration,
    tickets: RwLock<HashMap<[u8; TICKET_ID_LEN], Ticket>>,
}

impl TicketStore {
    /// A store with a random key. Tickets from this store cannot be decoded
    /// anywhere else.
    pub fn new() -> Self {
        let mut key = Zeroizing::new([0u8; TICKET_KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        Self {
            key,
            lifetime: TICKET_LIFETIME,
            tickets: RwLock::new(HashMap::new()),
        }
    }

    /// A store with an explicit key, for clustered resumption across
    /// servers sharing it.
    pub fn with_key(key: [u8; TICKET_KEY_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
            lifetime: TICKET_LIFETIME,
            tickets: RwLock::new(HashMap::new()),
        }
    }

    /// Overrides the default 24 hour lifetime for subsequently issued
    /// tickets.
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Creates and stores a ticket for the peer.
    pub fn issue(&self, peer_id: PeerId, session_key: [u8; 32]) -> Ticket {
        let now = unix_now();
        let mut id = [0u8; TICKET_ID_LEN];
        OsRng.fill_bytes(&mut id);
        let ticket = Ticket {
            id,
            issued_at: now,
            expires_at: now + self.lifetime.as_secs() as i64,
            peer_id,
            session_key,
        };
        self.tickets.write().insert(id, ticket.clone());
        tracing::debug!(peer = %peer_id, "session ticket issued");
        ticket
    }

    /// Fetches a ticket. An expired entry stays in the store (cleanup is
    /// separate) but reports `Expired` so the caller can tell the cases
    /// apart.
    pub fn lookup(&self, id: &[u8; TICKET_ID_LEN]) -> Result<Ticket, TicketError> {
        let tickets = self.tickets.read();
        let ticket = tickets.get(id).ok_or(TicketError::NotFound)?;
        if unix_now() > ticket.expires_at {
            return Err(TicketError::Expired);
        }
        Ok(ticket.clone())
    }

    pub fn revoke(&self, id: &[u8; TICKET_ID_LEN]) {
        self.tickets.write().remove(id);
    }

    /// Removes expired tickets, returning how many were dropped.
    pub fn cleanup(&self) -> usize {
        let now = unix_now();
        let mut tickets = self.tickets.write();
        let before = tickets.len();
        tickets.retain(|_, ticket| now <= ticket.expires_at);
        let removed = before - tickets.len();
        if removed > 0 {
            tracing::debug!(removed, "expired session tickets removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.tickets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.read().is_empty()
    }

    /// Encrypts a ticket for the wire.
    pub fn encode_ticket(&self, ticket: &Ticket) -> Result<Vec<u8>, TicketError> {
        let mut plaintext = Zeroizing::new([0u8; TICKET_PLAINTEXT_LEN]);
        plaintext[..32].copy_from_slice(ticket.peer_id.as_bytes());
        plaintext[32..40].copy_from_slice(&(ticket.issued_at as u64).to_be_bytes());
        plaintext[40..48].copy_from_slice(&(ticket.expires_at as u64).to_be_bytes());
        plaintext[48..80].copy_from_slice(&ticket.session_key);

        let aead = Aead::new(&self.key[..]).map_err(|_| TicketError::Invalid)?;
        let sealed = aead
            .seal(&plaintext[..], &ticket.id)
            .map_err(|_| TicketError::Invalid)?;

        let mut out = Vec::with_capacity(TICKET_ID_LEN + sealed.len());
        out.extend_from_slice(&ticket.id);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Decrypts and validates a wire-form ticket. Tampering of any byte
    /// fails authentication; an authentic but stale ticket is `Expired`.
    pub fn decode_ticket(&self, data: &[u8]) -> Result<Ticket, TicketError> {
        if data.len() < TICKET_ID_LEN + NONCE_LEN + TICKET_PLAINTEXT_LEN + TAG_LEN {
            return Err(TicketError::Invalid);
        }
        let mut id = [0u8; TICKET_ID_LEN];
        id.copy_from_slice(&data[..TICKET_ID_LEN]);

        let aead = Aead::new(&self.key[..]).map_err(|_| TicketError::Invalid)?;
        let plaintext = Zeroizing::new(
            aead.open(&data[TICKET_ID_LEN..], &id)
                .map_err(|_| TicketError::Invalid)?,
        );
        if plaintext.len() != TICKET_PLAINTEXT_LEN {
            return Err(TicketError::Invalid);
        }

        let mut peer_id = [0u8; 32];
        peer_id.copy_from_slice(&plaintext[..32]);
        let issued_at = u64::from_be_bytes(
            plaintext[32..40]
                .try_into()
                .map_err(|_| TicketError::Invalid)?,
        ) as i64;
        let expires_at = u64::from_be_bytes(
            plaintext[40..48]
                .try_into()
                .map_err(|_| TicketError::Invalid)?,
        ) as i64;
        let mut session_key = [0u8; 32];
        session_key.copy_from_slice(&plaintext[48..80]);

        if unix_now() > expires_at {
            return Err(TicketError::Expired);
        }

        Ok(Ticket {
            id,
            issued_at,
            expires_at,
            peer_id: PeerId(peer_id),
            session_key,
        })
    }
}

impl Default for TicketStore {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> PeerId {
        PeerId([0x42; 32])
    }

    #[test]
    fn issue_and_lookup() {
        let store = TicketStore::new();
        let ticket = store.issue(peer(), [7u8; 32]);
        assert_eq!(store.len(), 1);

        let found = store.lookup(&ticket.id).unwrap();
        assert_eq!(found, ticket);
        assert_eq!(found.expires_at - found.issued_at, TICKET_LIFETIME.as_secs() as i64);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = TicketStore::new();
        assert_eq!(
            store.lookup(&[0u8; TICKET_ID_LEN]).unwrap_err(),
            TicketError::NotFound
        );
    }

    #[test]
    fn expired_then_revoked() {
        let store = TicketStore::new();
        let ticket = store.issue(peer(), [9u8; 32]);

        // Backdate the stored expiry by an hour.
        store
            .tickets
            .write()
            .get_mut(&ticket.id)
            .unwrap()
            .expires_at = unix_now() - 3600;

        assert_eq!(store.lookup(&ticket.id).unwrap_err(), TicketError::Expired);

        store.revoke(&ticket.id);
        assert_eq!(store.lookup(&ticket.id).unwrap_err(), TicketError::NotFound);
    }

    #[test]
    fn cleanup_counts_expired() {
        let store = TicketStore::new();
        let stale = store.issue(peer(), [1u8; 32]);
        let fresh = store.issue(peer(), [2u8; 32]);
        store.tickets.write().get_mut(&stale.id).unwrap().expires_at = unix_now() - 10;

        assert_eq!(store.cleanup(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.lookup(&fresh.id).is_ok());
    }

    #[test]
    fn encode_decode_round_trip() {
        let store = TicketStore::new();
        let ticket = store.issue(peer(), [0xEE; 32]);
        let wire = store.encode_ticket(&ticket).unwrap();
        assert_eq!(
            wire.len(),
            TICKET_ID_LEN + NONCE_LEN + TICKET_PLAINTEXT_LEN + TAG_LEN
        );
        assert_eq!(store.decode_ticket(&wire).unwrap(), ticket);
    }

    #[test]
    fn tampered_wire_is_invalid() {
        let store = TicketStore::new();
        let ticket = store.issue(peer(), [3u8; 32]);
        let wire = store.encode_ticket(&ticket).unwrap();
        for position in [0usize, TICKET_ID_LEN + 3, wire.len() - 1] {
            let mut mutated = wire.clone();
            mutated[position] ^= 0x01;
            assert_eq!(
                store.decode_ticket(&mutated).unwrap_err(),
                TicketError::Invalid,
                "byte {position} flip must fail authentication"
            );
        }
    }

    #[test]
    fn short_wire_is_invalid() {
        let store = TicketStore::new();
        assert_eq!(
            store.decode_ticket(&[0u8; 20]).unwrap_err(),
            TicketError::Invalid
        );
    }

    #[test]
    fn wrong_store_key_cannot_decode() {
        let issuing = TicketStore::with_key([1u8; TICKET_KEY_LEN]);
        let other = TicketStore::with_key([2u8; TICKET_KEY_LEN]);
        let ticket = issuing.issue(peer(), [5u8; 32]);
        let wire = issuing.encode_ticket(&ticket).unwrap();
        assert_eq!(other.decode_ticket(&wire).unwrap_err(), TicketError::Invalid);
    }

    #[test]
    fn shared_key_decodes_across_stores() {
        let key = [0xCD; TICKET_KEY_LEN];
        let issuing = TicketStore::with_key(key);
        let sibling = TicketStore::with_key(key);
        let ticket = issuing.issue(peer(), [6u8; 32]);
        let wire = issuing.encode_ticket(&ticket).unwrap();
        assert_eq!(sibling.decode_ticket(&wire).unwrap(), ticket);
    }

    #[test]
    fn expired_wire_ticket_rejected() {
        let store = TicketStore::new().with_lifetime(Duration::ZERO);
        let mut ticket = store.issue(peer(), [8u8; 32]);
        ticket.expires_at = unix_now() - 5;
        let wire = store.encode_ticket(&ticket).unwrap();
        assert_eq!(store.decode_ticket(&wire).unwrap_err(), TicketError::Expired);
    }
}
