//! Connection state machine.
//!
//! ```text
//! Disconnected ─► Resolving ─► Connecting ─┬─────────────────► WsHandshaking ─► Open ─► Closing ─► Closed
//!       ▲                                  └─► TlsHandshaking ─┘                  │
//!       │                                                                         │
//!   (connect)◄── Failed ◄──────────── any non-terminal state on error ────────────┘
//! ```
//!
//! `Failed` absorbs errors; only an explicit `connect` leaves it.
//! `Closed` is terminal.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Error;

use super::status::{StatusEvent, StatusSink};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, never connected.
    Disconnected,
    /// Resolving the host.
    Resolving,
    /// Opening the TCP socket.
    Connecting,
    /// TLS handshake in progress.
    TlsHandshaking,
    /// WebSocket upgrade in progress.
    WsHandshaking,
    /// Frames may be exchanged.
    Open,
    /// Close frame sent, waiting for the peer or the transport.
    Closing,
    /// Shut down cleanly.
    Closed,
    /// Unrecoverable error on this attempt.
    Failed,
}

impl ConnectionState {
    /// Returns `true` if `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{
            Closed, Closing, Connecting, Disconnected, Failed, Open, Resolving, TlsHandshaking,
            WsHandshaking,
        };

        match (self, next) {
            (Disconnected | Failed, Resolving) => true,
            (Resolving, Connecting) => true,
            (Connecting, TlsHandshaking | WsHandshaking) => true,
            (TlsHandshaking, WsHandshaking) => true,
            (WsHandshaking, Open) => true,
            (Open, Closing) => true,
            (Closing, Closed) => true,
            (Resolving | Connecting | TlsHandshaking | WsHandshaking | Open | Closing, Failed) => {
                true
            }
            _ => false,
        }
    }

    /// Returns `true` for states no further I/O happens in.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Resolving => "Resolving",
            Self::Connecting => "Connecting",
            Self::TlsHandshaking => "TlsHandshaking",
            Self::WsHandshaking => "WsHandshaking",
            Self::Open => "Open",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// State cell plus status sink, shared by the controller and the session
/// task.
///
/// The sink is always called after the state lock is released.
pub(crate) struct Lifecycle {
    state: Mutex<ConnectionState>,
    receiving: AtomicBool,
    sink: Arc<dyn StatusSink>,
}

impl Lifecycle {
    pub(crate) fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            receiving: AtomicBool::new(false),
            sink,
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Moves to `next` if that is legal from the current state.
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        let from = {
            let mut state = self.state.lock();
            let from = *state;
            if !from.can_transition_to(next) {
                drop(state);
                warn!(%from, to = %next, "Ignoring illegal state transition");
                return false;
            }
            *state = next;
            from
        };

        debug!(%from, to = %next, "State changed");
        self.report(&StatusEvent::StateChanged { from, to: next });
        true
    }

    /// Moves to `next` only when the current state is one of `expected`.
    ///
    /// Returns the state observed when the move is refused.
    pub(crate) fn advance(
        &self,
        expected: &[ConnectionState],
        next: ConnectionState,
    ) -> Result<(), ConnectionState> {
        let from = {
            let mut state = self.state.lock();
            let from = *state;
            if !expected.contains(&from) || !from.can_transition_to(next) {
                return Err(from);
            }
            *state = next;
            from
        };

        debug!(%from, to = %next, "State changed");
        self.report(&StatusEvent::StateChanged { from, to: next });
        Ok(())
    }

    /// Reports `err` and moves to `Failed` if not already terminal.
    pub(crate) fn fail(&self, err: &Error) {
        self.report_error(err);
        if !self.state().is_terminal() {
            self.transition(ConnectionState::Failed);
        }
    }

    /// Drives the state to `Closed`, passing through `Closing` if needed.
    pub(crate) fn finish_close(&self) {
        if self.state() == ConnectionState::Open {
            self.transition(ConnectionState::Closing);
        }
        if self.state() == ConnectionState::Closing {
            self.transition(ConnectionState::Closed);
        }
    }

    /// Marks the receive loop as armed; `false` if it already was.
    pub(crate) fn arm_receiving(&self) -> bool {
        !self.receiving.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn reset_receiving(&self) {
        self.receiving.store(false, Ordering::Release);
    }

    #[inline]
    pub(crate) fn report(&self, event: &StatusEvent) {
        self.sink.report(event);
    }

    pub(crate) fn report_error(&self, err: &Error) {
        debug!(error = %err, "Reporting error");
        self.report(&StatusEvent::error(err));
    }
}

// ============================================================================
// Tests
// ============================================================================
