//! Plain or TLS byte stream under the WebSocket layer.
//!
//! [`Transport`] is a tagged variant: one socket, optionally wrapped in
//! TLS, chosen once when the connection is established. Both variants
//! implement the same `AsyncRead + AsyncWrite` surface so the handshake
//! and frame layers never branch on it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::tls::{TlsOptions, server_name};

// ============================================================================
// TransportMode
// ============================================================================

/// Which transport variant is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportMode {
    /// Unencrypted TCP.
    Plain,
    /// TLS over TCP.
    Tls,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("plain"),
            Self::Tls => f.write_str("TLS"),
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Established byte stream, exclusively owned by one connection.
pub enum Transport {
    /// Plain TCP socket.
    Plain(TcpStream),
    /// TLS-wrapped TCP socket.
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// Returns the variant in use.
    #[inline]
    #[must_use]
    pub const fn mode(&self) -> TransportMode {
        match self {
            Self::Plain(_) => TransportMode::Plain,
            Self::Tls(_) => TransportMode::Tls,
        }
    }

    /// Returns the remote address of the underlying socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the socket is no longer connected.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        let addr = match self {
            Self::Plain(socket) => socket.peer_addr()?,
            Self::Tls(stream) => stream.get_ref().0.peer_addr()?,
        };
        Ok(addr)
    }

    /// Shuts the write side down (TLS `close_notify` first when secure).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the shutdown fails; the socket is released
    /// when the transport is dropped either way.
    pub async fn close(&mut self) -> Result<()> {
        self.shutdown().await?;
        trace!(mode = %self.mode(), "Transport shut down");
        Ok(())
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("mode", &self.mode())
            .field("peer", &self.peer_addr().ok())
            .finish()
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(socket) => Pin::new(socket).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(socket) => Pin::new(socket).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(socket) => Pin::new(socket).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(socket) => Pin::new(socket).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Opens [`Transport`]s for one endpoint.
///
/// Construction only prepares the TLS context (when secure); sockets are
/// opened by [`Connector::connect_socket`].
pub struct Connector {
    /// TLS context, present only for secure endpoints.
    tls: Option<TlsConnector>,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("secure", &self.is_secure())
            .finish()
    }
}

impl Connector {
    /// Creates a connector; builds the TLS context only when `secure`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the TLS context cannot be built.
    pub fn new(secure: bool, tls: &TlsOptions) -> Result<Self> {
        let tls = if secure {
            Some(tls.build_connector()?)
        } else {
            None
        };
        Ok(Self { tls })
    }

    /// Returns `true` if [`Connector::establish`] performs a TLS handshake.
    #[inline]
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.tls.is_some()
    }

    /// Connects to the first reachable address, in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] with the last OS error if every
    /// candidate fails, or if `addresses` is empty.
    pub async fn connect_socket(&self, addresses: &[SocketAddr]) -> Result<TcpStream> {
        let mut last_error = None;

        for addr in addresses {
            match TcpStream::connect(addr).await {
                Ok(socket) => {
                    if let Err(e) = socket.set_nodelay(true) {
                        warn!(error = %e, "Failed to set TCP_NODELAY");
                    }
                    debug!(%addr, "Socket connected");
                    return Ok(socket);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "Connect attempt failed");
                    last_error = Some(Error::transport_io(&format!("connect {addr}"), &e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::transport("no candidate addresses")))
    }

    /// Runs the TLS client handshake over `socket`, or wraps it as plain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the server name is invalid or the
    /// TLS handshake (including certificate verification) fails.
    pub async fn secure(&self, socket: TcpStream, host: &str) -> Result<Transport> {
        let Some(tls) = &self.tls else {
            return Ok(Transport::Plain(socket));
        };

        let name = server_name(host)?;
        let stream = tls
            .connect(name, socket)
            .await
            .map_err(|e| Error::transport_io("TLS handshake", &e))?;

        debug!(host, "TLS handshake completed");
        Ok(Transport::Tls(Box::new(stream)))
    }

    /// Connects a socket and, when secure, completes the TLS handshake.
    ///
    /// # Errors
    ///
    /// See [`Connector::connect_socket`] and [`Connector::secure`].
    pub async fn establish(&self, addresses: &[SocketAddr], host: &str) -> Result<Transport> {
        let socket = self.connect_socket(addresses).await?;
        self.secure(socket, host).await
    }
}

// ============================================================================
// Tests
// ============================================================================
