//! The HELLO exchange.
//!
//! The client opens the dedicated control stream and both sides exchange
//! exactly one signed HELLO frame each. Any other first frame, any codec
//! error, or any verification failure aborts the handshake; closing the
//! connection afterwards is the caller's job.

use std::collections::BTreeMap;

use thiserror::Error;

use i6p_core::frame::{read_frame, write_frame, Frame, FrameError, MessageType};
use i6p_core::hello::{Hello, HelloError};
use i6p_core::identity::{IdentityError, KeyPair, PeerId};

use crate::session::Session;
use crate::transport::Connection;

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("handshake expected a HELLO frame")]
    ExpectedHello,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Hello(#[from] HelloError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("transport error during handshake: {0}")]
    Transport(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct HandshakeOptions {
    /// Capabilities to advertise in the local HELLO.
    pub capabilities: BTreeMap<String, String>,
}

/// Client side: open the control stream, send HELLO, verify the reply.
pub async fn handshake_client<C: Connection>(
    conn: C,
    keypair: &KeyPair,
    opts: HandshakeOptions,
) -> Result<Session<C>, HandshakeError> {
    let mut control = conn.open_stream().await?;
    tracing::debug!(local = %keypair.peer_id(), "control stream open, sending hello");

    send_hello(&mut control, keypair, &opts).await?;
    let remote = receive_hello(&mut control).await?;
    let remote_id = PeerId::parse_hex(&remote.peer_id)?;

    tracing::info!(local = %keypair.peer_id(), remote = %remote_id, "session established (client)");
    Ok(Session::new(
        conn,
        control,
        keypair.peer_id(),
        remote_id,
        remote.capabilities,
    ))
}

/// Server side: accept the control stream, verify the HELLO, reply.
pub async fn handshake_server<C: Connection>(
    conn: C,
    keypair: &KeyPair,
    opts: HandshakeOptions,
) -> Result<Session<C>, HandshakeError> {
    let mut control = conn.accept_stream().await?;
    tracing::debug!(local = %keypair.peer_id(), "control stream accepted, awaiting hello");

    let remote = receive_hello(&mut control).await?;
    let remote_id = PeerId::parse_hex(&remote.peer_id)?;
    send_hello(&mut control, keypair, &opts).await?;

    tracing::info!(local = %keypair.peer_id(), remote = %remote_id, "session established (server)");
    Ok(Session::new(
        conn,
        control,
        keypair.peer_id(),
        remote_id,
        remote.capabilities,
    ))
}

async fn send_hello<S>(
    control: &mut S,
    keypair: &KeyPair,
    opts: &HandshakeOptions,
) -> Result<(), HandshakeError>
where
    S: tokio::io::AsyncWrite + Unpin,
{
    let mut hello = Hello::new(keypair, &opts.capabilities);
    hello.sign(keypair)?;
    let payload = hello.encode()?;
    write_frame(control, &Frame::new(MessageType::Hello, payload)).await?;
    Ok(())
}

async fn receive_hello<S>(control: &mut S) -> Result<Hello, HandshakeError>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let frame = read_frame(control).await?;
    if frame.message_type() != Some(MessageType::Hello) {
        tracing::warn!(frame_type = frame.frame_type, "unexpected first frame, aborting handshake");
        return Err(HandshakeError::ExpectedHello);
    }
    let hello = Hello::decode(&frame.payload)?;
    hello.verify().inspect_err(|err| {
        tracing::warn!(error = %err, "hello verification failed");
    })?;
    Ok(hello)
}
