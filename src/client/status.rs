//! Status reporting to the embedding application.
//!
//! The core never prints. Every state change, confirmation and error is
//! handed to a [`StatusSink`]; presentation is the sink's business.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;

use crate::error::ErrorKind;
use crate::protocol::InboundMessage;
use crate::transport::TransportMode;

use super::state::ConnectionState;

// ============================================================================
// StatusEvent
// ============================================================================

/// Something the connection wants the caller to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Connection moved between states.
    StateChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },

    /// Host resolved.
    Resolved {
        /// Resolved host.
        host: String,
        /// Number of candidate addresses.
        count: usize,
    },

    /// Socket (and TLS, when secure) established.
    TransportReady {
        /// Transport variant in use.
        mode: TransportMode,
        /// Remote address.
        peer: Option<SocketAddr>,
    },

    /// WebSocket upgrade completed.
    Connected {
        /// URL as given by the caller.
        url: String,
    },

    /// A data frame was written.
    Sent {
        /// Payload bytes written.
        bytes: usize,
    },

    /// A ping frame was written.
    PingSent {
        /// Payload bytes written.
        bytes: usize,
    },

    /// A complete message arrived.
    Received(InboundMessage),

    /// The receive loop ended; no further reads are issued.
    ReceiveTerminated {
        /// Why it ended.
        reason: String,
    },

    /// An operation failed.
    Error {
        /// Error category.
        kind: ErrorKind,
        /// Rendered error.
        message: String,
    },
}

impl StatusEvent {
    /// Creates an error event from a crate error.
    #[must_use]
    pub fn error(err: &crate::Error) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Returns `true` for [`StatusEvent::Error`].
    #[inline]
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateChanged { from, to } => write!(f, "State: {from} -> {to}"),
            Self::Resolved { host, count } => write!(f, "Resolved {host}: {count} address(es)"),
            Self::TransportReady { mode, peer } => match (mode, peer) {
                (TransportMode::Tls, Some(peer)) => write!(f, "SSL is used ({peer})"),
                (TransportMode::Tls, None) => f.write_str("SSL is used"),
                (TransportMode::Plain, Some(peer)) => write!(f, "SSL is not used ({peer})"),
                (TransportMode::Plain, None) => f.write_str("SSL is not used"),
            },
            Self::Connected { url } => write!(f, "Connected to {url}"),
            Self::Sent { bytes } => write!(f, "Sent message: {bytes} bytes"),
            Self::PingSent { bytes } => write!(f, "Sent ping: {bytes} bytes"),
            Self::Received(message) => write!(f, "Received message: {message}"),
            Self::ReceiveTerminated { reason } => write!(f, "Receive loop ended: {reason}"),
            Self::Error { kind, message } => write!(f, "{kind}: {message}"),
        }
    }
}

// ============================================================================
// StatusSink
// ============================================================================

/// Receiver of [`StatusEvent`]s.
///
/// Called from both the caller's thread and the event loop thread, never
/// while the connection's internal locks are held.
pub trait StatusSink: Send + Sync {
    /// Handles one event.
    fn report(&self, event: &StatusEvent);
}

impl<F> StatusSink for F
where
    F: Fn(&StatusEvent) + Send + Sync,
{
    fn report(&self, event: &StatusEvent) {
        self(event);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use parking_lot::Mutex;

    #[test]
    fn test_console_lines() {
        assert_eq!(
            StatusEvent::Sent { bytes: 5 }.to_string(),
            "Sent message: 5 bytes"
        );
        assert_eq!(
            StatusEvent::Received(InboundMessage::Text("hello".into())).to_string(),
            "Received message: hello"
        );
        assert_eq!(
            StatusEvent::Connected {
                url: "ws://example.test".into()
            }
            .to_string(),
            "Connected to ws://example.test"
        );
    }

    #[test]
    fn test_error_event() {
        let event = StatusEvent::error(&crate::Error::close("already closed"));
        assert!(event.is_error());
        assert_eq!(event.to_string(), "CloseError: Close failed: already closed");
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = move |event: &StatusEvent| seen_clone.lock().push(event.clone());

        sink.report(&StatusEvent::Sent { bytes: 1 });
        assert_eq!(seen.lock().len(), 1);
    }
}
