//! i6p — an IPv6-only peer-to-peer connectivity substrate.
//!
//! Sessions ride on QUIC/TLS 1.3 (or any transport satisfying the traits in
//! [`transport`]); identity is self-certifying, bound by a signed HELLO on a
//! dedicated control stream rather than by PKI. On top of an established
//! session sit the forward-secret secure channel (`i6p_core::channel`) and
//! the parallel bulk transfer pipeline (`i6p_transfer`).
//!
//! The usual entry point is [`Node`]: generate a keypair, listen on an IPv6
//! address, and `dial`/`accept` authenticated sessions.

pub mod config;
pub mod discovery;
pub mod handshake;
pub mod node;
pub mod session;
pub mod ticket;
pub mod transport;

pub use i6p_core::channel::{ChannelError, Role, SecureChannel};
pub use i6p_core::identity::{KeyPair, PeerId};
pub use i6p_transfer::bulk::{BulkReceiver, BulkSender, TransferConfig};

pub use config::NodeConfig;
pub use handshake::{handshake_client, handshake_server, HandshakeError, HandshakeOptions};
pub use node::{Node, NodeError};
pub use session::{Session, SessionOpener};
pub use ticket::{Ticket, TicketError, TicketStore};
