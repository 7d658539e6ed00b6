//! In-process peers and a recording sink for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Condvar, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::runtime::{Builder, Runtime};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use wsline::{
    Client, ClientOptions, ConnectionState, Endpoint, ErrorKind, InboundMessage, StaticResolver,
    StatusEvent, StatusSink,
};

/// Host name every test URL uses; mapped to the peer by `StaticResolver`.
pub const TEST_HOST: &str = "example.test";

/// Default wait for asynchronous outcomes.
pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Recording Sink
// ============================================================================

/// Collects every status event and lets tests wait for conditions.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<StatusEvent>>,
    changed: Condvar,
}

impl StatusSink for RecordingSink {
    fn report(&self, event: &StatusEvent) {
        self.events.lock().push(event.clone());
        self.changed.notify_all();
    }
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Blocks until `predicate` holds over the recorded events or `timeout`
    /// passes; returns whether it held.
    pub fn wait_for(&self, predicate: impl Fn(&[StatusEvent]) -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        while !predicate(&events) {
            if self.changed.wait_until(&mut events, deadline).timed_out() {
                return predicate(&events);
            }
        }
        true
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().clone()
    }

    /// Target states of every recorded transition, in order.
    pub fn states(&self) -> Vec<ConnectionState> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StatusEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect()
    }

    pub fn received(&self) -> Vec<InboundMessage> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StatusEvent::Received(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&StatusEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                StatusEvent::Error { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect()
    }
}

pub fn is_terminated(event: &StatusEvent) -> bool {
    matches!(event, StatusEvent::ReceiveTerminated { .. })
}

// ============================================================================
// Client Helper
// ============================================================================

/// Builds a client whose `example.test` resolves to `peer`.
pub fn client_for(
    url: &str,
    peer: SocketAddr,
    sink: Arc<RecordingSink>,
    options: ClientOptions,
) -> Client {
    let resolver = StaticResolver::new().with_host(TEST_HOST, vec![peer]);
    Client::with_resolver(
        Endpoint::parse(url).unwrap(),
        options,
        sink,
        Arc::new(resolver),
    )
    .unwrap()
}

// ============================================================================
// Peers
// ============================================================================

/// What the peer does after accepting the upgrade.
#[derive(Debug, Clone)]
pub enum Script {
    /// Echo data frames until the client closes.
    Echo,
    /// Send these frames, then a close frame, then drain.
    SendThenClose(Vec<String>),
    /// Drop the connection without a close frame.
    Drop,
    /// Accept the upgrade, then never read again.
    Stall,
    /// Refuse the upgrade with 403.
    Reject,
}

/// Upgrade details and data frames seen by a peer.
#[derive(Debug, Default)]
pub struct PeerLog {
    pub path: Option<String>,
    pub user_agent: Option<String>,
    pub frames: Vec<Message>,
}

/// WebSocket server on its own runtime; serves one connection.
pub struct Peer {
    pub addr: SocketAddr,
    pub log: Arc<Mutex<PeerLog>>,
    _runtime: Runtime,
}

impl Peer {
    pub fn plain(script: Script) -> Self {
        Self::start(script, None)
    }

    pub fn tls(script: Script, cert: &TestCert) -> Self {
        let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![cert.der.clone()], cert.key.clone_key())
            .unwrap();
        Self::start(script, Some(TlsAcceptor::from(Arc::new(config))))
    }

    fn start(script: Script, tls: Option<TlsAcceptor>) -> Self {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(PeerLog::default()));

        let log_clone = Arc::clone(&log);
        runtime.spawn(async move {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            match tls {
                Some(acceptor) => {
                    // Handshake failures are expected in verification tests.
                    if let Ok(stream) = acceptor.accept(socket).await {
                        serve(stream, script, log_clone).await;
                    }
                }
                None => serve(socket, script, log_clone).await,
            }
        });

        Self {
            addr,
            log,
            _runtime: runtime,
        }
    }

    /// Data frames received so far.
    pub fn frames(&self) -> Vec<Message> {
        self.log.lock().frames.clone()
    }

    /// Waits until the peer has received `count` data frames.
    pub fn wait_for_frames(&self, count: usize, timeout: Duration) -> Vec<Message> {
        let deadline = Instant::now() + timeout;
        while self.log.lock().frames.len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        self.frames()
    }
}

async fn serve<S>(stream: S, script: Script, log: Arc<Mutex<PeerLog>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reject = matches!(script, Script::Reject);
    let header_log = Arc::clone(&log);
    let callback = move |request: &Request, response: Response| {
        let mut log = header_log.lock();
        log.path = request.uri().path_and_query().map(|p| p.as_str().to_owned());
        log.user_agent = request
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        if reject {
            let mut refusal = ErrorResponse::new(Some("forbidden".to_owned()));
            *refusal.status_mut() = StatusCode::FORBIDDEN;
            Err(refusal)
        } else {
            Ok(response)
        }
    };

    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };

    match script {
        Script::Echo => echo(ws, log).await,
        Script::SendThenClose(frames) => {
            let mut ws = ws;
            for frame in frames {
                if ws.send(Message::text(frame)).await.is_err() {
                    return;
                }
            }
            let _ = ws.close(None).await;
            while let Some(Ok(_)) = ws.next().await {}
        }
        Script::Stall => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(ws);
        }
        Script::Drop | Script::Reject => drop(ws),
    }
}

async fn echo<S>(mut ws: WebSocketStream<S>, log: Arc<Mutex<PeerLog>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(Ok(message)) = ws.next().await {
        if message.is_text() || message.is_binary() {
            log.lock().frames.push(message.clone());
            if ws.send(message).await.is_err() {
                break;
            }
        }
    }
}

// ============================================================================
// Certificates
// ============================================================================

/// Self-signed certificate for `example.test`.
pub struct TestCert {
    pub der: CertificateDer<'static>,
    pub key: PrivateKeyDer<'static>,
}

impl TestCert {
    pub fn generate() -> Self {
        let certified = rcgen::generate_simple_self_signed(vec![TEST_HOST.to_owned()]).unwrap();
        Self {
            der: certified.cert.der().clone(),
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
                certified.key_pair.serialize_der(),
            )),
        }
    }
}
