//! Client configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use wsline::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_user_agent("my-tool/1.0")
//!     .with_close_timeout(Duration::from_secs(2));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio_rustls::rustls::pki_types::CertificateDer;

use crate::error::{Error, Result};
use crate::protocol::{DEFAULT_USER_AGENT, HandshakeOptions};
use crate::transport::TlsOptions;

// ============================================================================
// Constants
// ============================================================================

/// Default bound on waiting for the peer's close acknowledgement.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest accepted close timeout.
pub const MAX_CLOSE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

// ============================================================================
// ClientOptions
// ============================================================================

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// `User-Agent` sent with the upgrade request.
    pub user_agent: String,

    /// How long `close` waits for the peer before releasing the transport.
    pub close_timeout: Duration,

    /// TLS settings, used for `wss://` only.
    pub tls: TlsOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            tls: TlsOptions::new(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the `User-Agent` header.
    #[inline]
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the close acknowledgement timeout.
    #[inline]
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Replaces the TLS settings.
    #[inline]
    #[must_use]
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Trusts an additional root certificate for `wss://`.
    #[inline]
    #[must_use]
    pub fn with_root_certificate(mut self, certificate: CertificateDer<'static>) -> Self {
        self.tls = self.tls.with_root_certificate(certificate);
        self
    }

    /// Accepts any server certificate for `wss://`. See
    /// [`TlsOptions::danger_accept_invalid_certs`].
    #[inline]
    #[must_use]
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.tls = self.tls.danger_accept_invalid_certs(accept);
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl ClientOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty or multi-line user agent, or a
    /// close timeout that is zero or above [`MAX_CLOSE_TIMEOUT`].
    pub fn validate(&self) -> Result<()> {
        if self.user_agent.trim().is_empty() {
            return Err(Error::config("user agent must not be empty"));
        }
        if self.user_agent.contains(['\r', '\n']) {
            return Err(Error::config("user agent must be a single line"));
        }
        if self.close_timeout.is_zero() {
            return Err(Error::config("close timeout must be greater than zero"));
        }
        if self.close_timeout > MAX_CLOSE_TIMEOUT {
            return Err(Error::config(format!(
                "close timeout must not exceed {}s",
                MAX_CLOSE_TIMEOUT.as_secs()
            )));
        }
        Ok(())
    }

    /// Returns the handshake decorations.
    #[must_use]
    pub fn handshake(&self) -> HandshakeOptions {
        HandshakeOptions {
            user_agent: self.user_agent.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::new();
        assert_eq!(options.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(options.close_timeout, DEFAULT_CLOSE_TIMEOUT);
        assert!(!options.tls.accept_invalid_certs);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = ClientOptions::new()
            .with_user_agent("agent/2")
            .with_close_timeout(Duration::from_millis(250))
            .danger_accept_invalid_certs(true);

        assert_eq!(options.handshake().user_agent, "agent/2");
        assert_eq!(options.close_timeout, Duration::from_millis(250));
        assert!(options.tls.accept_invalid_certs);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientOptions::new().with_user_agent("  ").validate().is_err());
        assert!(ClientOptions::new().with_user_agent("a\nb").validate().is_err());
        assert!(
            ClientOptions::new()
                .with_close_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_bounds_close_timeout() {
        assert!(
            ClientOptions::new()
                .with_close_timeout(MAX_CLOSE_TIMEOUT)
                .validate()
                .is_ok()
        );
        let err = ClientOptions::new()
            .with_close_timeout(Duration::MAX)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
