//! TLS client configuration.
//!
//! Certificate verification is on by default against the bundled Mozilla
//! roots plus any roots added through [`TlsOptions::with_root_certificate`].
//! [`TlsOptions::danger_accept_invalid_certs`] turns verification off and
//! must be chosen explicitly by the operator.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{
    CryptoProvider, ring, verify_tls12_signature, verify_tls13_signature,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    ClientConfig, DigitallySignedStruct, Error as RustlsError, RootCertStore, SignatureScheme,
};
use tracing::warn;

use crate::error::{Error, Result};

// ============================================================================
// TlsOptions
// ============================================================================

/// TLS settings for `wss://` endpoints.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Extra trust anchors (DER), added to the bundled roots.
    pub extra_roots: Vec<CertificateDer<'static>>,

    /// Skip certificate chain and hostname verification.
    pub accept_invalid_certs: bool,
}

impl TlsOptions {
    /// Creates options with verification enabled and no extra roots.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trusts an additional root certificate.
    #[inline]
    #[must_use]
    pub fn with_root_certificate(mut self, certificate: CertificateDer<'static>) -> Self {
        self.extra_roots.push(certificate);
        self
    }

    /// Disables certificate verification entirely.
    ///
    /// Any server certificate is accepted, so the connection is open to
    /// interception. Only for test servers and trusted networks.
    #[inline]
    #[must_use]
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Builds a connector from these options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the protocol versions or a root
    /// certificate are rejected by rustls.
    pub fn build_connector(&self) -> Result<TlsConnector> {
        let provider = Arc::new(ring::default_provider());
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::config(format!("TLS protocol versions: {e}")))?;

        let config = if self.accept_invalid_certs {
            warn!("TLS certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
                .with_no_client_auth()
        } else {
            let mut roots = RootCertStore::empty();
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            for certificate in &self.extra_roots {
                roots
                    .add(certificate.clone())
                    .map_err(|e| Error::config(format!("invalid root certificate: {e}")))?;
            }
            builder.with_root_certificates(roots).with_no_client_auth()
        };

        Ok(TlsConnector::from(Arc::new(config)))
    }
}

// ============================================================================
// AcceptAnyCertificate
// ============================================================================

/// Verifier that trusts every certificate but still checks handshake
/// signatures, so the session keys belong to whoever presented the cert.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, RustlsError> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, RustlsError> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Parses `host` into a TLS server name (DNS name or IP literal).
///
/// # Errors
///
/// Returns [`Error::Transport`] if `host` is neither.
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| Error::transport(format!("invalid TLS server name '{host}': {e}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_verify() {
        let options = TlsOptions::new();
        assert!(!options.accept_invalid_certs);
        assert!(options.extra_roots.is_empty());
    }

    #[test]
    fn test_build_verifying_connector() {
        assert!(TlsOptions::new().build_connector().is_ok());
    }

    #[test]
    fn test_build_insecure_connector() {
        let options = TlsOptions::new().danger_accept_invalid_certs(true);
        assert!(options.build_connector().is_ok());
    }

    #[test]
    fn test_garbage_root_rejected() {
        let options =
            TlsOptions::new().with_root_certificate(CertificateDer::from(vec![0u8, 1, 2, 3]));
        let Err(err) = options.build_connector() else {
            panic!("garbage root certificate accepted");
        };
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_server_name() {
        assert!(server_name("example.test").is_ok());
        assert!(server_name("127.0.0.1").is_ok());
        assert!(server_name("::1").is_ok());
        assert!(server_name("bad host name").is_err());
    }
}
