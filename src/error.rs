//! Error types for wsline.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use wsline::{Client, Result};
//!
//! fn example(client: &Client) -> Result<()> {
//!     client.connect()?;
//!     client.send("hello")?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Caller | [`Error::InvalidUrl`], [`Error::Config`], [`Error::InvalidArgument`], [`Error::InvalidState`] |
//! | Connect | [`Error::Resolution`], [`Error::Transport`], [`Error::Handshake`] |
//! | Session | [`Error::Send`], [`Error::Receive`], [`Error::Close`] |
//! | Runtime | [`Error::EventLoop`], [`Error::Io`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::client::ConnectionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Caller Errors
    // ========================================================================
    /// URL is not a usable `ws://` or `wss://` URL.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    /// Client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Argument rejected before anything reached the wire.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Operation is not valid in the current connection state.
    #[error("Cannot {operation} while connection is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// State at the time of the call.
        state: ConnectionState,
    },

    // ========================================================================
    // Connect Errors
    // ========================================================================
    /// Host could not be resolved.
    #[error("Resolution failed for {host}: {message}")]
    Resolution {
        /// Host that failed to resolve.
        host: String,
        /// Resolver message.
        message: String,
    },

    /// Socket connect or TLS handshake failed.
    #[error("Transport error: {message}{}", os_code(.code))]
    Transport {
        /// Description of the transport failure.
        message: String,
        /// OS error code, when the failure came from the OS.
        code: Option<i32>,
    },

    /// WebSocket upgrade rejected or malformed.
    #[error("Handshake failed: {message}{}", http_status(.status))]
    Handshake {
        /// Description of the handshake failure.
        message: String,
        /// HTTP status returned instead of 101, if any.
        status: Option<u16>,
        /// OS error code of the underlying transport error, if any.
        code: Option<i32>,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Write failed on an open connection.
    #[error("Send failed: {message}")]
    Send {
        /// Description of the write failure.
        message: String,
    },

    /// Read failed or the peer went away.
    #[error("Receive failed: {message}")]
    Receive {
        /// Description of the read failure.
        message: String,
    },

    /// Graceful shutdown failed.
    #[error("Close failed: {message}")]
    Close {
        /// Description of the close failure.
        message: String,
    },

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// Event loop could not be created or a task on it died.
    #[error("Event loop error: {message}")]
    EventLoop {
        /// Description of the event loop failure.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

fn os_code(code: &Option<i32>) -> String {
    code.map(|c| format!(" (os error {c})")).unwrap_or_default()
}

fn http_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

// ============================================================================
// ErrorKind
// ============================================================================

/// Copyable discriminant of [`Error`], carried by status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// [`Error::InvalidUrl`]
    InvalidUrl,
    /// [`Error::Config`]
    Config,
    /// [`Error::InvalidArgument`]
    InvalidArgument,
    /// [`Error::InvalidState`]
    InvalidState,
    /// [`Error::Resolution`]
    Resolution,
    /// [`Error::Transport`]
    Transport,
    /// [`Error::Handshake`]
    Handshake,
    /// [`Error::Send`]
    Send,
    /// [`Error::Receive`]
    Receive,
    /// [`Error::Close`]
    Close,
    /// [`Error::EventLoop`]
    EventLoop,
    /// [`Error::Io`]
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidUrl => "InvalidUrl",
            Self::Config => "ConfigError",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidState => "InvalidState",
            Self::Resolution => "ResolutionError",
            Self::Transport => "TransportError",
            Self::Handshake => "HandshakeError",
            Self::Send => "SendError",
            Self::Receive => "ReceiveError",
            Self::Close => "CloseError",
            Self::EventLoop => "EventLoopError",
            Self::Io => "IoError",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(operation: &'static str, state: ConnectionState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Creates a resolution error.
    #[inline]
    pub fn resolution(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Creates a transport error without an OS code.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            code: None,
        }
    }

    /// Creates a transport error from an IO error, keeping its OS code.
    #[inline]
    pub fn transport_io(context: &str, err: &IoError) -> Self {
        Self::Transport {
            message: format!("{context}: {err}"),
            code: err.raw_os_error(),
        }
    }

    /// Creates a handshake error from a WebSocket protocol error.
    pub fn handshake(err: WsError) -> Self {
        match err {
            WsError::Http(response) => Self::Handshake {
                message: "server rejected the upgrade".to_string(),
                status: Some(response.status().as_u16()),
                code: None,
            },
            WsError::Io(io) => Self::Handshake {
                code: io.raw_os_error(),
                message: io.to_string(),
                status: None,
            },
            other => Self::Handshake {
                message: other.to_string(),
                status: None,
                code: None,
            },
        }
    }

    /// Creates a send error.
    #[inline]
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
        }
    }

    /// Creates a receive error.
    #[inline]
    pub fn receive(message: impl Into<String>) -> Self {
        Self::Receive {
            message: message.into(),
        }
    }

    /// Creates a close error.
    #[inline]
    pub fn close(message: impl Into<String>) -> Self {
        Self::Close {
            message: message.into(),
        }
    }

    /// Creates an event loop error.
    #[inline]
    pub fn event_loop(message: impl Into<String>) -> Self {
        Self::EventLoop {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns the copyable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::Config { .. } => ErrorKind::Config,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::Resolution { .. } => ErrorKind::Resolution,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Handshake { .. } => ErrorKind::Handshake,
            Self::Send { .. } => ErrorKind::Send,
            Self::Receive { .. } => ErrorKind::Receive,
            Self::Close { .. } => ErrorKind::Close,
            Self::EventLoop { .. } => ErrorKind::EventLoop,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns `true` if this error aborted a connect attempt.
    #[inline]
    #[must_use]
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            Self::Resolution { .. } | Self::Transport { .. } | Self::Handshake { .. }
        )
    }

    /// Returns `true` if a fresh `connect` may succeed after this error.
    ///
    /// Everything network-originated is recoverable; a broken event loop is not.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::EventLoop { .. } | Self::Config { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
