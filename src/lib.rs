//! wsline - single-connection WebSocket client.
//!
//! Opens one `ws://` or `wss://` connection, exchanges text and binary
//! frames, sends pings, and closes cleanly. All I/O runs on a dedicated
//! event loop; the caller reports nothing itself but receives every state
//! change, confirmation and error through a [`StatusSink`].
//!
//! # Architecture
//!
//! ```text
//! Endpoint ──► Resolve ──► Connector ──► negotiate ──► Session task
//!                          (TCP/TLS)     (HTTP 101)    (frames, close)
//!                                                          │
//!           Client ── commands ──────────────────────────►│
//!           StatusSink ◄── StatusEvent ────────────────────┘
//! ```
//!
//! Key design principles:
//!
//! - One connection per [`Client`], one state machine ([`ConnectionState`])
//! - Writes are serialized through the session task; frames never interleave
//! - TLS certificates are verified unless explicitly disabled
//! - Failures are reported and returned, never panicked on
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use wsline::{Client, ClientOptions, Endpoint, Result, StatusEvent};
//!
//! fn main() -> Result<()> {
//!     let endpoint = Endpoint::parse("wss://example.test/chat")?;
//!     let sink = Arc::new(|event: &StatusEvent| println!("{event}"));
//!     let client = Client::new(endpoint, ClientOptions::new(), sink)?;
//!
//!     client.connect()?;
//!     client.receive_loop()?;
//!
//!     std::thread::scope(|scope| {
//!         scope.spawn(|| client.run());
//!         client.send("hello")?;
//!         client.close()
//!     })
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], [`EventLoop`], state machine, status events |
//! | [`endpoint`] | URL parsing into host, port, path |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | Upgrade handshake and message types |
//! | [`transport`] | Resolution, TCP and TLS |

// ============================================================================
// Modules
// ============================================================================

/// Connection controller, event loop and status reporting.
pub mod client;

/// Target URL parsing.
pub mod endpoint;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// WebSocket upgrade and message types.
pub mod protocol;

/// Byte transport: resolution, TCP and TLS.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    Client, ClientOptions, ConnectionState, DEFAULT_CLOSE_TIMEOUT, EventLoop, MAX_CLOSE_TIMEOUT,
    StatusEvent, StatusSink,
};

// Endpoint
pub use endpoint::{DEFAULT_PLAIN_PORT, DEFAULT_SECURE_PORT, Endpoint};

// Error types
pub use error::{Error, ErrorKind, Result};

// Protocol types
pub use protocol::{InboundMessage, Outbound};

// Transport types
pub use transport::{Resolve, StaticResolver, SystemResolver, TlsOptions, TransportMode};
