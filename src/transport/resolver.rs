//! Host name resolution.
//!
//! Resolution is synchronous: it runs on the thread that calls
//! `connect`, before any socket is opened.

// ============================================================================
// Imports
// ============================================================================

use std::net::{SocketAddr, ToSocketAddrs};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Resolve
// ============================================================================

/// Turns `host` + `port` into candidate addresses, in connect order.
pub trait Resolve: Send + Sync {
    /// Resolves `host` against `port`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] when no address is found.
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>>;
}

// ============================================================================
// SystemResolver
// ============================================================================

/// OS resolver (`getaddrinfo`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>> {
        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        let addresses: Vec<SocketAddr> = (bare, port)
            .to_socket_addrs()
            .map_err(|e| Error::resolution(host, e.to_string()))?
            .collect();

        if addresses.is_empty() {
            return Err(Error::resolution(host, "no addresses returned"));
        }

        debug!(host, port, count = addresses.len(), "Host resolved");
        Ok(addresses)
    }
}

// ============================================================================
// StaticResolver
// ============================================================================

/// Fixed host table; addresses are returned verbatim.
///
/// Useful for tests and for pinning a host to a known address.
#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: RwLock<Vec<(String, Vec<SocketAddr>)>>,
}

impl StaticResolver {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the addresses for `host`.
    #[must_use]
    pub fn with_host(self, host: impl Into<String>, addresses: Vec<SocketAddr>) -> Self {
        self.insert(host, addresses);
        self
    }

    /// Adds or replaces the addresses for `host`.
    pub fn insert(&self, host: impl Into<String>, addresses: Vec<SocketAddr>) {
        let host = host.into().to_ascii_lowercase();
        let mut entries = self.entries.write();
        entries.retain(|(name, _)| *name != host);
        entries.push((host, addresses));
    }
}

impl Resolve for StaticResolver {
    fn resolve(&self, host: &str, _port: u16) -> Result<Vec<SocketAddr>> {
        let host_lower = host.to_ascii_lowercase();
        let entries = self.entries.read();
        match entries.iter().find(|(name, _)| *name == host_lower) {
            Some((_, addresses)) if !addresses.is_empty() => Ok(addresses.clone()),
            Some(_) => Err(Error::resolution(host, "no addresses returned")),
            None => Err(Error::resolution(host, "host not found")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};

    fn local(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    #[test]
    fn test_system_resolves_ip_literal() {
        let addresses = SystemResolver.resolve("127.0.0.1", 8080).expect("literal resolves");
        assert_eq!(addresses, vec![local(8080)]);
    }

    #[test]
    fn test_system_strips_ipv6_brackets() {
        let addresses = SystemResolver.resolve("[::1]", 80).expect("literal resolves");
        assert_eq!(addresses.len(), 1);
        assert!(addresses[0].is_ipv6());
    }

    #[test]
    fn test_static_returns_addresses_verbatim() {
        let resolver = StaticResolver::new().with_host("Example.Test", vec![local(9001)]);
        let addresses = resolver.resolve("example.test", 80).expect("known host");
        assert_eq!(addresses, vec![local(9001)]);
    }

    #[test]
    fn test_static_unknown_host() {
        let err = StaticResolver::new().resolve("missing.test", 80).unwrap_err();
        assert!(matches!(err, Error::Resolution { .. }));
    }

    #[test]
    fn test_static_empty_entry_is_error() {
        let resolver = StaticResolver::new().with_host("empty.test", Vec::new());
        assert!(resolver.resolve("empty.test", 80).is_err());
    }

    #[test]
    fn test_static_insert_replaces() {
        let resolver = StaticResolver::new().with_host("a.test", vec![local(1)]);
        resolver.insert("a.test", vec![local(2)]);
        assert_eq!(resolver.resolve("a.test", 0).unwrap(), vec![local(2)]);
    }
}
