//! Authenticated I6P session.
//!
//! The transport already encrypts; what the session adds is identity. A
//! session only exists after the HELLO exchange has verified both peers, so
//! holding a `Session` is the proof that the remote end controls the key
//! behind its PeerId. The control stream stays reserved for protocol frames
//! for the whole session lifetime.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use i6p_core::identity::PeerId;
use i6p_transfer::pool::StreamOpener;

use crate::transport::{Connection, Stream};

pub struct Session<C: Connection> {
    conn: C,
    control: C::Stream,
    control_id: u64,
    local_peer_id: PeerId,
    remote_peer_id: PeerId,
    capabilities: BTreeMap<String, String>,
}

impl<C: Connection> std::fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("control_id", &self.control_id)
            .field("local_peer_id", &self.local_peer_id)
            .field("remote_peer_id", &self.remote_peer_id)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl<C: Connection> Session<C> {
    pub(crate) fn new(
        conn: C,
        control: C::Stream,
        local_peer_id: PeerId,
        remote_peer_id: PeerId,
        capabilities: BTreeMap<String, String>,
    ) -> Self {
        let control_id = control.stream_id();
        Self {
            conn,
            control,
            control_id,
            local_peer_id,
            remote_peer_id,
            capabilities,
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    pub fn remote_peer_id(&self) -> PeerId {
        self.remote_peer_id
    }

    /// The capability map the remote peer advertised in its HELLO.
    /// Returns a fresh copy; the session's own view stays immutable.
    pub fn remote_capabilities(&self) -> BTreeMap<String, String> {
        self.capabilities.clone()
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Id of the reserved control stream.
    pub fn control_stream_id(&self) -> u64 {
        self.control_id
    }

    /// The control stream itself, for protocol frames beyond the handshake.
    pub fn control_stream_mut(&mut self) -> &mut C::Stream {
        &mut self.control
    }

    /// Opens an application data stream.
    pub async fn open_stream(&self) -> io::Result<C::Stream> {
        self.conn.open_stream().await
    }

    /// Accepts an application data stream. If the transport surfaces the
    /// reserved control stream here it is dropped and the accept retried.
    pub async fn accept_stream(&self) -> io::Result<C::Stream> {
        loop {
            let stream = self.conn.accept_stream().await?;
            if stream.stream_id() == self.control_id {
                continue;
            }
            return Ok(stream);
        }
    }

    /// Closes the underlying connection cleanly.
    pub fn close(&self) {
        self.conn.close(0, b"");
    }

    pub fn close_with_error(&self, code: u64, reason: &str) {
        self.conn.close(code, reason.as_bytes());
    }
}

/// Adapter exposing a session's stream-opening side to the transfer pool,
/// so a `BulkSender` can fan out over a session's streams.
pub struct SessionOpener<C: Connection> {
    session: Arc<Session<C>>,
}

impl<C: Connection> SessionOpener<C> {
    pub fn new(session: Arc<Session<C>>) -> Self {
        Self { session }
    }
}

impl<C: Connection + 'static> StreamOpener for SessionOpener<C> {
    type Stream = C::Stream;

    async fn open_stream(&self) -> io::Result<C::Stream> {
        self.session.open_stream().await
    }
}
