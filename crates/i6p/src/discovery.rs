//! Pluggable peer discovery.
//!
//! Discovery only answers "where is this peer"; deciding what to do with
//! the capabilities is the application's business. Implementations can be
//! backed by a DHT, mDNS/DNS-SD, bootstrap lists, or anything else that
//! satisfies [`Resolver`].

use std::collections::BTreeMap;
use std::net::Ipv6Addr;

use dashmap::DashMap;
use thiserror::Error;

use i6p_core::identity::PeerId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("peer not found")]
    NotFound,
}

/// The minimal facts discovery hands out about a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrInfo {
    pub peer_id: PeerId,
    pub addr: Ipv6Addr,
    pub port: u16,
    pub capabilities: BTreeMap<String, String>,
}

pub trait Resolver: Send + Sync {
    fn announce(&self, info: AddrInfo) -> Result<(), DiscoveryError>;
    fn lookup(&self, peer_id: &PeerId) -> Result<AddrInfo, DiscoveryError>;
    fn list(&self) -> Result<Vec<AddrInfo>, DiscoveryError>;
}

/// In-memory resolver for tests, demos, and embedding in applications.
/// Lookups return copies; the table is safe for concurrent use.
#[derive(Default)]
pub struct MemoryResolver {
    peers: DashMap<PeerId, AddrInfo>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Resolver for MemoryResolver {
    fn announce(&self, info: AddrInfo) -> Result<(), DiscoveryError> {
        self.peers.insert(info.peer_id, info);
        Ok(())
    }

    fn lookup(&self, peer_id: &PeerId) -> Result<AddrInfo, DiscoveryError> {
        self.peers
            .get(peer_id)
            .map(|entry| entry.value().clone())
            .ok_or(DiscoveryError::NotFound)
    }

    fn list(&self) -> Result<Vec<AddrInfo>, DiscoveryError> {
        Ok(self.peers.iter().map(|entry| entry.value().clone()).collect())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
