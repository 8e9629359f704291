//! QUIC transport wiring.
//!
//! quinn endpoints with ALPN `i6p/1`, TLS 1.3 only, and an ephemeral
//! self-signed certificate per endpoint. Certificate verification is
//! disabled on the client: peer identity is enforced by the signed HELLO at
//! the session layer, not by PKI. Sockets are bound IPv6-only
//! (`IPV6_V6ONLY`); there is no IPv4 path.

use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use quinn::crypto::rustls::{QuicClientConfig, QuicServerConfig};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::{Connection, Listener, Stream};

/// The I6P application protocol identifier.
pub const ALPN: &[u8] = b"i6p/1";

fn io_err(err: impl std::error::Error + Send + Sync + 'static) -> io::Error {
    io::Error::other(err)
}

fn require_v6(addr: SocketAddr) -> io::Result<SocketAddrV6> {
    match addr {
        SocketAddr::V6(v6) => Ok(v6),
        SocketAddr::V4(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "i6p requires an IPv6 address",
        )),
    }
}

/// Binds a UDP socket with IPV6_V6ONLY set.
fn bind_v6_only(addr: SocketAddrV6) -> io::Result<std::net::UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV6,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;
    socket.set_only_v6(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::V6(addr).into())?;
    Ok(socket.into())
}

// ── TLS setup ─────────────────────────────────────────────────────────────────

fn self_signed_identity() -> io::Result<(CertificateDer<'static>, PrivateKeyDer<'static>)> {
    let certified = rcgen::generate_simple_self_signed(vec!["i6p".to_string()]).map_err(io_err)?;
    let cert = certified.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        certified.key_pair.serialize_der(),
    ));
    Ok((cert, key))
}

fn server_config() -> io::Result<quinn::ServerConfig> {
    let (cert, key) = self_signed_identity()?;
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut tls = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(io_err)?
        .with_no_client_auth()
        .with_single_cert(vec![cert], key)
        .map_err(io_err)?;
    tls.alpn_protocols = vec![ALPN.to_vec()];
    let crypto = QuicServerConfig::try_from(tls).map_err(io_err)?;
    Ok(quinn::ServerConfig::with_crypto(Arc::new(crypto)))
}

/// Accepts any server certificate. Identity lives in the HELLO exchange;
/// TLS here only provides the encrypted channel.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<rustls::crypto::CryptoProvider>);

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn client_config() -> io::Result<quinn::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut tls = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(io_err)?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
        .with_no_client_auth();
    tls.alpn_protocols = vec![ALPN.to_vec()];
    let crypto = QuicClientConfig::try_from(tls).map_err(io_err)?;
    Ok(quinn::ClientConfig::new(Arc::new(crypto)))
}

// ── Stream ────────────────────────────────────────────────────────────────────

/// One bidirectional QUIC stream. Dropping it resets the stream; shut it
/// down for a clean FIN.
pub struct QuicStream {
    send: quinn::SendStream,
    recv: quinn::RecvStream,
    id: u64,
}

impl QuicStream {
    fn new(send: quinn::SendStream, recv: quinn::RecvStream) -> Self {
        let id = quinn::VarInt::from(send.id()).into_inner();
        Self { send, recv, id }
    }
}

impl AsyncRead for QuicStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.recv).poll_read(cx, buf)
    }
}

impl AsyncWrite for QuicStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        AsyncWrite::poll_write(Pin::new(&mut self.send), cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncWrite::poll_flush(Pin::new(&mut self.send), cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        AsyncWrite::poll_shutdown(Pin::new(&mut self.send), cx)
    }
}

impl Stream for QuicStream {
    fn stream_id(&self) -> u64 {
        self.id
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

pub struct QuicConnection {
    inner: quinn::Connection,
    // Dial-side endpoint, kept so the io driver outlives the connection.
    endpoint: Option<quinn::Endpoint>,
}

impl QuicConnection {
    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_address()
    }
}

impl Connection for QuicConnection {
    type Stream = QuicStream;

    async fn open_stream(&self) -> io::Result<QuicStream> {
        let (send, recv) = self.inner.open_bi().await.map_err(io_err)?;
        Ok(QuicStream::new(send, recv))
    }

    async fn accept_stream(&self) -> io::Result<QuicStream> {
        let (send, recv) = self.inner.accept_bi().await.map_err(io_err)?;
        Ok(QuicStream::new(send, recv))
    }

    fn close(&self, code: u64, reason: &[u8]) {
        let code = quinn::VarInt::from_u64(code).unwrap_or(quinn::VarInt::MAX);
        self.inner.close(code, reason);
        if let Some(endpoint) = &self.endpoint {
            endpoint.close(quinn::VarInt::from_u32(0), b"");
        }
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

pub struct QuicListener {
    endpoint: quinn::Endpoint,
}

impl QuicListener {
    /// Binds an IPv6-only endpoint and starts serving the I6P ALPN.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let addr = require_v6(addr)?;
        let socket = bind_v6_only(addr)?;
        let endpoint = quinn::Endpoint::new(
            quinn::EndpointConfig::default(),
            Some(server_config()?),
            socket,
            Arc::new(quinn::TokioRuntime),
        )?;
        Ok(Self { endpoint })
    }
}

impl Listener for QuicListener {
    type Connection = QuicConnection;

    async fn accept(&self) -> io::Result<QuicConnection> {
        let incoming = self.endpoint.accept().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "listener endpoint closed")
        })?;
        let connection = incoming.await.map_err(io_err)?;
        tracing::debug!(remote = %connection.remote_address(), "inbound quic connection");
        Ok(QuicConnection {
            inner: connection,
            endpoint: None,
        })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    fn close(&self) {
        self.endpoint.close(quinn::VarInt::from_u32(0), b"listener closed");
    }
}

/// Dials a remote I6P endpoint from an ephemeral IPv6 socket.
pub async fn dial(addr: SocketAddr) -> io::Result<QuicConnection> {
    let addr = require_v6(addr)?;
    let bind = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0);
    let socket = bind_v6_only(bind)?;
    let mut endpoint = quinn::Endpoint::new(
        quinn::EndpointConfig::default(),
        None,
        socket,
        Arc::new(quinn::TokioRuntime),
    )?;
    endpoint.set_default_client_config(client_config()?);

    // The server name is irrelevant; certificate checks are disabled.
    let connecting = endpoint
        .connect(SocketAddr::V6(addr), "i6p")
        .map_err(io_err)?;
    let connection = connecting.await.map_err(io_err)?;
    tracing::debug!(remote = %connection.remote_address(), "outbound quic connection");
    Ok(QuicConnection {
        inner: connection,
        endpoint: Some(endpoint),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_addresses_are_rejected() {
        let v4: SocketAddr = "127.0.0.1:0".parse().unwrap();
        assert!(QuicListener::bind(v4).is_err());
    }

    #[tokio::test]
    async fn dial_rejects_ipv4() {
        let v4: SocketAddr = "127.0.0.1:4433".parse().unwrap();
        assert!(dial(v4).await.is_err());
    }

    #[tokio::test]
    async fn listener_reports_bound_port() {
        let listener =
            QuicListener::bind("[::1]:0".parse().unwrap()).expect("loopback bind should work");
        let addr = listener.local_addr().unwrap();
        assert!(addr.is_ipv6());
        assert_ne!(addr.port(), 0);
    }
}
