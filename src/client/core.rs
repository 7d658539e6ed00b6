//! Connection controller.
//!
//! [`Client`] is the only type the embedding application needs: it
//! resolves, connects, upgrades, and then forwards `send` / `ping` /
//! `receive_loop` / `close` to the session task running on the event loop.
//!
//! Every failure is reported to the [`StatusSink`] and returned; nothing
//! panics on network errors.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::protocol::{MAX_CONTROL_PAYLOAD, Outbound, negotiate};
use crate::transport::{Connector, Resolve, SystemResolver, Transport};

use super::event_loop::EventLoop;
use super::options::ClientOptions;
use super::session::{Session, SessionCommand, SessionHandle};
use super::state::{ConnectionState, Lifecycle};
use super::status::{StatusEvent, StatusSink};

// ============================================================================
// Constants
// ============================================================================

/// Extra wait in [`Client::close`] beyond the session's own close deadline.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

// ============================================================================
// Client
// ============================================================================

/// Single WebSocket connection plus the event loop that drives it.
///
/// # Thread Safety
///
/// `Client` is `Send + Sync`. The intended split is one thread inside
/// [`Client::run`] and another issuing `send` / `ping` / `close`.
/// `connect` and `close` block the calling thread and must not be called
/// from inside an async context.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use wsline::{Client, ClientOptions, Endpoint, StatusEvent};
///
/// # fn main() -> wsline::Result<()> {
/// let endpoint = Endpoint::parse("ws://example.test/chat")?;
/// let sink = Arc::new(|event: &StatusEvent| println!("{event}"));
/// let client = Client::new(endpoint, ClientOptions::new(), sink)?;
///
/// client.connect()?;
/// client.receive_loop()?;
/// std::thread::scope(|scope| {
///     scope.spawn(|| client.run());
///     let _ = client.send("hello");
///     let _ = client.close();
/// });
/// # Ok(())
/// # }
/// ```
pub struct Client {
    /// Target, fixed for the client's lifetime.
    endpoint: Endpoint,
    /// Connection settings.
    options: ClientOptions,
    /// Host name resolution.
    resolver: Arc<dyn Resolve>,
    /// Socket and TLS setup.
    connector: Connector,
    /// State machine and status sink.
    lifecycle: Arc<Lifecycle>,
    /// Runtime for all asynchronous I/O.
    event_loop: EventLoop,
    /// Queue into the running session, if any.
    session: Mutex<Option<SessionHandle>>,
    /// Cancels the running session task.
    task: Mutex<Option<AbortHandle>>,
}

impl Client {
    /// Creates a disconnected client using the system resolver.
    ///
    /// No socket is opened; the TLS context is prepared when the endpoint
    /// is secure.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `options` are invalid or TLS setup fails
    /// - [`Error::EventLoop`] if the runtime cannot be created
    pub fn new(
        endpoint: Endpoint,
        options: ClientOptions,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self> {
        Self::with_resolver(endpoint, options, sink, Arc::new(SystemResolver))
    }

    /// Creates a disconnected client with a custom resolver.
    ///
    /// # Errors
    ///
    /// See [`Client::new`].
    pub fn with_resolver(
        endpoint: Endpoint,
        options: ClientOptions,
        sink: Arc<dyn StatusSink>,
        resolver: Arc<dyn Resolve>,
    ) -> Result<Self> {
        options.validate()?;
        let connector = Connector::new(endpoint.is_secure(), &options.tls)?;
        let event_loop = EventLoop::new()?;

        debug!(
            host = endpoint.host(),
            port = endpoint.port(),
            path = endpoint.path(),
            secure = endpoint.is_secure(),
            "Client created"
        );

        Ok(Self {
            endpoint,
            options,
            resolver,
            connector,
            lifecycle: Arc::new(Lifecycle::new(sink)),
            event_loop,
            session: Mutex::new(None),
            task: Mutex::new(None),
        })
    }

    /// Returns the target endpoint.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the resource path used for the upgrade.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        self.endpoint.path()
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    // ========================================================================
    // Connect
    // ========================================================================

    /// Resolves, connects, (TLS-)handshakes and upgrades; blocks until the
    /// connection is `Open` or has `Failed`.
    ///
    /// Valid from `Disconnected` or `Failed`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] in any other state
    /// - [`Error::Resolution`], [`Error::Transport`], [`Error::Handshake`]
    ///   for the step that failed; the state is then `Failed`
    pub fn connect(&self) -> Result<()> {
        self.lifecycle
            .advance(
                &[ConnectionState::Disconnected, ConnectionState::Failed],
                ConnectionState::Resolving,
            )
            .map_err(|state| self.rejected(Error::invalid_state("connect", state)))?;

        let stream = match self.establish() {
            Ok(stream) => stream,
            Err(err) => {
                self.lifecycle.fail(&err);
                return Err(err);
            }
        };

        self.lifecycle.reset_receiving();
        let (session, handle) =
            Session::new(stream, Arc::clone(&self.lifecycle), self.options.close_timeout);
        *self.session.lock() = Some(handle);

        self.lifecycle.transition(ConnectionState::Open);

        let lifecycle = Arc::clone(&self.lifecycle);
        let task = self
            .event_loop
            .spawn_work(session.run(), move |err| lifecycle.fail(&err));
        *self.task.lock() = Some(task);

        info!(url = self.endpoint.url(), "Connected");
        self.lifecycle.report(&StatusEvent::Connected {
            url: self.endpoint.url().to_string(),
        });
        Ok(())
    }

    /// Runs resolve → connect → TLS → upgrade, moving through the states.
    fn establish(&self) -> Result<WebSocketStream<Transport>> {
        let host = self.endpoint.bare_host();
        let addresses = self.resolver.resolve(host, self.endpoint.port())?;
        self.lifecycle.report(&StatusEvent::Resolved {
            host: host.to_string(),
            count: addresses.len(),
        });

        self.lifecycle.transition(ConnectionState::Connecting);

        self.event_loop.block_on(async {
            let socket = self.connector.connect_socket(&addresses).await?;

            if self.connector.is_secure() {
                self.lifecycle.transition(ConnectionState::TlsHandshaking);
            }
            let transport = self.connector.secure(socket, host).await?;

            self.lifecycle.report(&StatusEvent::TransportReady {
                mode: transport.mode(),
                peer: transport.peer_addr().ok(),
            });

            self.lifecycle.transition(ConnectionState::WsHandshaking);
            negotiate(transport, &self.endpoint, &self.options.handshake()).await
        })
    }

    // ========================================================================
    // Frame I/O
    // ========================================================================

    /// Queues a text frame. Returns once queued; the write completion is
    /// reported as [`StatusEvent::Sent`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if not `Open` (nothing is written)
    /// - [`Error::Send`] if the session has already ended
    pub fn send(&self, message: impl Into<String>) -> Result<()> {
        self.dispatch("send", SessionCommand::Send(Outbound::Text(message.into())))
    }

    /// Queues a binary frame. See [`Client::send`].
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.dispatch("send", SessionCommand::Send(Outbound::Binary(data.into())))
    }

    /// Arms the receive loop: every inbound message is reported as
    /// [`StatusEvent::Received`] until the connection ends, which is
    /// reported once as [`StatusEvent::ReceiveTerminated`].
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if not `Open`
    /// - [`Error::Receive`] if the loop is already armed
    pub fn receive_loop(&self) -> Result<()> {
        self.ensure_open("receive")?;
        if !self.lifecycle.arm_receiving() {
            return Err(self.rejected(Error::receive("receive loop already running")));
        }
        self.dispatch("receive", SessionCommand::StartReceiving)
    }

    /// Queues one ping frame; completion is reported as
    /// [`StatusEvent::PingSent`]. Pongs are not tracked.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `payload` exceeds 125 bytes
    /// - [`Error::InvalidState`] if not `Open`
    pub fn ping(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(self.rejected(Error::invalid_argument(format!(
                "ping payload is {} bytes, limit is {MAX_CONTROL_PAYLOAD}",
                payload.len()
            ))));
        }
        self.dispatch("ping", SessionCommand::Ping(payload.to_vec()))
    }

    fn dispatch(&self, operation: &'static str, command: SessionCommand) -> Result<()> {
        self.ensure_open(operation)?;

        let submitted = match self.session.lock().as_ref() {
            Some(handle) => handle.submit(command).is_ok(),
            None => false,
        };

        if submitted {
            Ok(())
        } else {
            Err(self.rejected(Error::send(format!(
                "cannot {operation}: session has ended"
            ))))
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        match self.lifecycle.state() {
            ConnectionState::Open => Ok(()),
            state => Err(self.rejected(Error::invalid_state(operation, state))),
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Sends a close frame, waits for the peer (bounded by the close
    /// timeout), releases the transport and moves to `Closed`.
    ///
    /// Safe to call while [`Client::run`] is active on another thread, and
    /// safe to call repeatedly: later calls report a [`Error::Close`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Close`] if not `Open`, or if the close handshake
    /// did not complete cleanly (the transport is released regardless).
    pub fn close(&self) -> Result<()> {
        if let Err(state) = self
            .lifecycle
            .advance(&[ConnectionState::Open], ConnectionState::Closing)
        {
            return Err(self.rejected(Error::close(format!(
                "connection is {state}, nothing to close"
            ))));
        }

        let Some(handle) = self.session.lock().take() else {
            self.lifecycle.finish_close();
            return Err(self.rejected(Error::close("no session to close")));
        };

        // Arms the session's close deadline, also over a write in progress.
        handle.request_close();
        let (ack_tx, ack_rx) = oneshot::channel();
        if handle.submit(SessionCommand::Close(ack_tx)).is_err() {
            self.lifecycle.finish_close();
            return Err(self.rejected(Error::close("session already ended")));
        }
        drop(handle);

        // The session enforces `close_timeout`; this outer bound only
        // guards against a wedged task.
        let wait = self.options.close_timeout.saturating_add(CLOSE_GRACE);
        let outcome = self
            .event_loop
            .block_on(async { timeout(wait, ack_rx).await });
        match outcome {
            Ok(Ok(outcome)) => {
                if outcome.is_ok() {
                    info!("Connection closed");
                }
                outcome
            }
            Ok(Err(_)) => {
                self.lifecycle.finish_close();
                Err(self.rejected(Error::close("session ended before close completed")))
            }
            Err(_) => {
                // Cancelling the task drops the transport it owns.
                if let Some(task) = self.task.lock().take() {
                    warn!("Session task did not stop, aborting it");
                    task.abort();
                }
                self.lifecycle.finish_close();
                Err(self.rejected(Error::close(format!(
                    "close did not complete within {}ms",
                    wait.as_millis()
                ))))
            }
        }
    }

    // ========================================================================
    // Event Loop
    // ========================================================================

    /// Blocks until the connection has no outstanding work (closed or
    /// failed) or [`Client::stop`] is called. Meant for a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventLoop`] if the loop failed; it is also reported.
    pub fn run(&self) -> Result<()> {
        debug!("Running event loop");
        self.event_loop.run().map_err(|err| self.rejected(err))
    }

    /// Makes a blocked [`Client::run`] return without closing the
    /// connection.
    pub fn stop(&self) {
        self.event_loop.stop();
    }

    /// Reports `err` to the sink and hands it back.
    fn rejected(&self, err: Error) -> Error {
        self.lifecycle.report_error(&err);
        err
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("event_loop", &self.event_loop)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
