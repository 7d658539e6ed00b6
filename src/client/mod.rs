//! Connection controller and event loop.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Owns the connection; connect, send, ping, close |
//! | [`EventLoop`] | Runtime that performs all I/O |
//! | [`ConnectionState`] | Lifecycle state machine |
//! | [`StatusSink`] | Receives every [`StatusEvent`] |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wsline::{Client, ClientOptions, Endpoint, StatusEvent};
//!
//! # fn example() -> wsline::Result<()> {
//! let client = Client::new(
//!     Endpoint::parse("wss://example.test/chat")?,
//!     ClientOptions::new(),
//!     Arc::new(|event: &StatusEvent| println!("{event}")),
//! )?;
//! client.connect()?;
//! client.send("hello")?;
//! client.close()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Connection controller.
pub mod core;

/// Event loop driver.
pub mod event_loop;

/// Client configuration.
pub mod options;

/// Frame I/O task.
pub(crate) mod session;

/// Connection state machine.
pub mod state;

/// Status events and sinks.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::Client;
pub use event_loop::EventLoop;
pub use options::{ClientOptions, DEFAULT_CLOSE_TIMEOUT, MAX_CLOSE_TIMEOUT};
pub use state::ConnectionState;
pub use status::{StatusEvent, StatusSink};
