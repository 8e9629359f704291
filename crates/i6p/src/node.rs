//! Node: the high-level listen/dial surface.
//!
//! Deliberately small. A node owns a keypair, a capability map, and at most
//! one listener; everything else (discovery, channels, transfers) composes
//! on top of the sessions it hands out.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use i6p_core::identity::{KeyPair, PeerId};

use crate::handshake::{handshake_client, handshake_server, HandshakeError, HandshakeOptions};
use crate::session::Session;
use crate::transport::quic::{self, QuicConnection, QuicListener};
use crate::transport::Listener;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node is not listening")]
    NotListening,
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct Node {
    keypair: KeyPair,
    capabilities: BTreeMap<String, String>,
    listener: Option<QuicListener>,
}

impl Node {
    pub fn new(keypair: KeyPair, capabilities: BTreeMap<String, String>) -> Self {
        Self {
            keypair,
            capabilities,
            listener: None,
        }
    }

    /// Binds the QUIC listener on an IPv6 address.
    pub fn listen(&mut self, addr: SocketAddr) -> Result<(), NodeError> {
        let listener = QuicListener::bind(addr)?;
        tracing::info!(
            addr = %listener.local_addr()?,
            peer = %self.keypair.peer_id(),
            "node listening"
        );
        self.listener = Some(listener);
        Ok(())
    }

    /// The bound listen address, once listening.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
    }

    pub fn close(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.close();
        }
    }

    pub fn id(&self) -> PeerId {
        self.keypair.peer_id()
    }

    pub fn capabilities(&self) -> BTreeMap<String, String> {
        self.capabilities.clone()
    }

    /// Accepts one connection and runs the server handshake on it.
    pub async fn accept(&self) -> Result<Session<QuicConnection>, NodeError> {
        let listener = self.listener.as_ref().ok_or(NodeError::NotListening)?;
        let conn = listener.accept().await?;
        let session = handshake_server(
            conn,
            &self.keypair,
            HandshakeOptions {
                capabilities: self.capabilities.clone(),
            },
        )
        .await?;
        Ok(session)
    }

    /// Dials a peer and runs the client handshake.
    pub async fn dial(&self, addr: SocketAddr) -> Result<Session<QuicConnection>, NodeError> {
        let conn = quic::dial(addr).await?;
        let session = handshake_client(
            conn,
            &self.keypair,
            HandshakeOptions {
                capabilities: self.capabilities.clone(),
            },
        )
        .await?;
        Ok(session)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
