//! Connection target derived from a `ws://` or `wss://` URL.
//!
//! # Example
//!
//! ```
//! use wsline::Endpoint;
//!
//! let endpoint = Endpoint::parse("wss://example.com/chat?room=1").unwrap();
//! assert!(endpoint.is_secure());
//! assert_eq!(endpoint.host(), "example.com");
//! assert_eq!(endpoint.port(), 443);
//! assert_eq!(endpoint.path(), "/chat?room=1");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default port for `ws://`.
pub const DEFAULT_PLAIN_PORT: u16 = 80;

/// Default port for `wss://`.
pub const DEFAULT_SECURE_PORT: u16 = 443;

// ============================================================================
// Endpoint
// ============================================================================

/// Immutable connection target.
///
/// `secure` follows the scheme, never the port. Without an explicit port
/// the scheme default applies ([`DEFAULT_PLAIN_PORT`] or
/// [`DEFAULT_SECURE_PORT`]), so `secure == (port == 443)` holds only for
/// default ports. An explicit port is always honoured: `wss://host:8443`
/// is secure on 8443 and `ws://host:443` is plain on 443.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// URL as given by the caller.
    url: String,
    /// Host name or IP literal (IPv6 in brackets).
    host: String,
    /// Explicit or scheme-default port.
    port: u16,
    /// `true` for `wss://`.
    secure: bool,
    /// Resource path sent in the upgrade request.
    path: String,
}

impl Endpoint {
    /// Parses a `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the URL does not parse, uses another
    /// scheme, or has no host.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let parsed = Url::parse(trimmed).map_err(|e| Error::invalid_url(trimmed, e.to_string()))?;

        let (secure, default_port) = match parsed.scheme() {
            "ws" => (false, DEFAULT_PLAIN_PORT),
            "wss" => (true, DEFAULT_SECURE_PORT),
            other => {
                return Err(Error::invalid_url(
                    trimmed,
                    format!("unsupported scheme '{other}', expected ws or wss"),
                ));
            }
        };

        let host = match parsed.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(Error::invalid_url(trimmed, "missing host")),
        };

        let mut path = match parsed.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        };
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            url: trimmed.to_string(),
            host,
            port: parsed.port().unwrap_or(default_port),
            secure,
            path,
        })
    }

    /// Returns the URL as given.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the host (IPv6 literals keep their brackets).
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the host without IPv6 brackets, as used for resolution and SNI.
    #[must_use]
    pub fn bare_host(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }

    /// Returns the port.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns `true` if the transport must be TLS.
    #[inline]
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    /// Returns the resource path, `/` when the URL has none.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the URL used for the upgrade request.
    #[must_use]
    pub fn request_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{}", self.host, self.port, self.path)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_plain_defaults() {
        let endpoint = Endpoint::parse("ws://example.test").expect("valid url");
        assert!(!endpoint.is_secure());
        assert_eq!(endpoint.port(), DEFAULT_PLAIN_PORT);
        assert_eq!(endpoint.path(), "/");
        assert_eq!(endpoint.host(), "example.test");
    }

    #[test]
    fn test_secure_defaults() {
        let endpoint = Endpoint::parse("wss://example.test/chat").expect("valid url");
        assert!(endpoint.is_secure());
        assert_eq!(endpoint.port(), DEFAULT_SECURE_PORT);
        assert_eq!(endpoint.path(), "/chat");
    }

    #[test]
    fn test_explicit_port_does_not_pick_security() {
        let secure = Endpoint::parse("wss://example.test:8443/").expect("valid url");
        assert!(secure.is_secure());
        assert_eq!(secure.port(), 8443);

        let plain = Endpoint::parse("ws://example.test:443/").expect("valid url");
        assert!(!plain.is_secure());
        assert_eq!(plain.port(), DEFAULT_SECURE_PORT);
    }

    #[test]
    fn test_explicit_port_and_query() {
        let endpoint = Endpoint::parse("ws://127.0.0.1:9001/a/b?x=1").expect("valid url");
        assert_eq!(endpoint.port(), 9001);
        assert_eq!(endpoint.path(), "/a/b?x=1");
        assert_eq!(endpoint.request_url(), "ws://127.0.0.1:9001/a/b?x=1");
    }

    #[test]
    fn test_uppercase_scheme() {
        let endpoint = Endpoint::parse("WSS://Example.Test").expect("valid url");
        assert!(endpoint.is_secure());
        assert_eq!(endpoint.host(), "example.test");
    }

    #[test]
    fn test_ipv6_host() {
        let endpoint = Endpoint::parse("ws://[::1]:8080/").expect("valid url");
        assert_eq!(endpoint.host(), "[::1]");
        assert_eq!(endpoint.bare_host(), "::1");
    }

    #[test]
    fn test_rejects_other_schemes() {
        let err = Endpoint::parse("http://example.test").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(Endpoint::parse("not a url").is_err());
        assert!(Endpoint::parse("").is_err());
    }

    #[test]
    fn test_display() {
        let endpoint = Endpoint::parse("ws://example.test/chat").expect("valid url");
        assert_eq!(endpoint.to_string(), "example.test:80/chat");
    }

    proptest! {
        #[test]
        fn prop_scheme_decides_security_and_port(
            host in "[a-z][a-z0-9]{0,10}(\\.[a-z]{2,5}){1,2}",
            secure in any::<bool>(),
        ) {
            let scheme = if secure { "wss" } else { "ws" };
            let endpoint = Endpoint::parse(&format!("{scheme}://{host}")).unwrap();
            prop_assert_eq!(endpoint.is_secure(), secure);
            prop_assert_eq!(endpoint.is_secure(), endpoint.port() == 443);
            prop_assert_eq!(endpoint.path(), "/");
            prop_assert_eq!(endpoint.host(), host.as_str());
        }

        #[test]
        fn prop_path_is_everything_after_host(
            host in "[a-z]{1,10}\\.test",
            segments in prop::collection::vec("[a-z0-9_-]{1,8}", 1..4),
        ) {
            let path = format!("/{}", segments.join("/"));
            let endpoint = Endpoint::parse(&format!("ws://{host}{path}")).unwrap();
            prop_assert_eq!(endpoint.path(), path.as_str());
        }
    }
}
