//! WebSocket upgrade over an established [`Transport`].
//!
//! The transport must already be fully established: for `wss://` the TLS
//! handshake has completed before the HTTP upgrade request is written.

// ============================================================================
// Imports
// ============================================================================

use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::client_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{CONNECTION, USER_AGENT};
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::transport::Transport;

// ============================================================================
// Constants
// ============================================================================

/// Default `User-Agent` for the upgrade request.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "wsline/",
    env!("CARGO_PKG_VERSION"),
    " websocket-client"
);

// ============================================================================
// HandshakeOptions
// ============================================================================

/// Decorations applied to the upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOptions {
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

// ============================================================================
// Negotiation
// ============================================================================

/// Builds the upgrade request for `endpoint`.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if the URL cannot form a request, or
/// [`Error::Config`] if the user agent is not a valid header value.
pub fn build_request(endpoint: &Endpoint, options: &HandshakeOptions) -> Result<Request> {
    let url = endpoint.request_url();
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| Error::invalid_url(&url, e.to_string()))?;

    let user_agent = HeaderValue::from_str(&options.user_agent)
        .map_err(|e| Error::config(format!("invalid user agent: {e}")))?;

    let headers = request.headers_mut();
    headers.insert(USER_AGENT, user_agent);
    headers.insert(CONNECTION, HeaderValue::from_static("upgrade"));

    Ok(request)
}

/// Performs the upgrade and returns the open WebSocket stream.
///
/// # Errors
///
/// Returns [`Error::Handshake`] if the server does not answer `101
/// Switching Protocols` or the transport fails mid-handshake.
pub async fn negotiate(
    transport: Transport,
    endpoint: &Endpoint,
    options: &HandshakeOptions,
) -> Result<WebSocketStream<Transport>> {
    let request = build_request(endpoint, options)?;

    debug!(host = endpoint.host(), path = endpoint.path(), "Sending upgrade request");

    let (stream, response) = client_async(request, transport)
        .await
        .map_err(Error::handshake)?;

    debug!(status = %response.status(), "WebSocket handshake completed");
    Ok(stream)
}

// ============================================================================
// Tests
// ============================================================================
