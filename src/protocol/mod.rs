//! WebSocket protocol layer.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `handshake` | HTTP upgrade over an established transport |
//! | `message` | Outbound and inbound frame payloads |

// ============================================================================
// Submodules
// ============================================================================

/// HTTP upgrade over an established transport.
pub mod handshake;

/// Outbound and inbound frame payloads.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use handshake::{DEFAULT_USER_AGENT, HandshakeOptions, negotiate};
pub use message::{InboundMessage, MAX_CONTROL_PAYLOAD, Outbound};
