//! Abstract transport contracts.
//!
//! The session layer never names a concrete transport. Anything providing
//! TLS 1.3 encryption and multiplexed bidirectional streams through these
//! traits can carry I6P; the reference wiring in [`quic`] does so with
//! quinn.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};

pub mod quic;

/// A single bidirectional stream with a transport-stable id.
///
/// The id only has to be stable and unique within one connection; the
/// session layer uses it to keep the control stream out of the application
/// stream path.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync {
    fn stream_id(&self) -> u64;
}

/// A multiplexed connection to one peer.
pub trait Connection: Send + Sync {
    type Stream: Stream + 'static;

    /// Opens a new bidirectional stream, synchronously with respect to the
    /// peer accepting it.
    fn open_stream(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Accepts the next inbound bidirectional stream.
    fn accept_stream(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Closes the connection with an application error code and reason.
    fn close(&self, code: u64, reason: &[u8]);
}

/// Accepts inbound connections.
pub trait Listener: Send + Sync {
    type Connection: Connection;

    fn accept(&self) -> impl Future<Output = io::Result<Self::Connection>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;

    fn close(&self);
}
