//! Byte transport under the WebSocket layer.
//!
//! # Architecture
//!
//! ```text
//! host:port ──► Resolve ──► [SocketAddr] ──► Connector ──► Transport
//!                                              │             ├─ Plain(TcpStream)
//!                                              └─ TLS ctx ──►└─ Tls(TlsStream)
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `resolver` | Host name resolution |
//! | `stream` | Plain/TLS transport and connector |
//! | `tls` | TLS client configuration |

// ============================================================================
// Submodules
// ============================================================================

/// Host name resolution.
pub mod resolver;

/// Plain/TLS transport and connector.
pub mod stream;

/// TLS client configuration.
pub mod tls;

// ============================================================================
// Re-exports
// ============================================================================

pub use resolver::{Resolve, StaticResolver, SystemResolver};
pub use stream::{Connector, Transport, TransportMode};
pub use tls::TlsOptions;
