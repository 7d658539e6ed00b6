//! Frame I/O for one open connection.
//!
//! A single task owns the WebSocket stream. The controller talks to it
//! through an unbounded command queue plus a close signal, so:
//!
//! - writes (data, ping, close) leave in queue order, one at a time;
//! - at most one read is outstanding, re-armed only after it completes,
//!   and reads keep flowing while a write is pending;
//! - once close is requested, everything (pending write included) must
//!   finish within `close_timeout` or is abandoned;
//! - the transport is dropped by the task that owns it, before the final
//!   state is published.
//!
//! # Event Loop
//!
//! ```text
//! ┌────────────┐  SessionCommand   ┌──────────────────────────────┐
//! │ Client     │──────────────────►│ Session::run                 │
//! │ (any       │  close signal     │  select! {                   │
//! │  thread)   │──────────────────►│    command  → write frame    │
//! └────────────┘                   │    frame    → StatusSink     │
//!                                  │    signal   → arm deadline   │
//!                                  │    deadline → give up close  │
//!                                  │  }                           │
//!                                  └──────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::message::normal_close;
use crate::protocol::{InboundMessage, Outbound};
use crate::transport::Transport;

use super::state::{ConnectionState, Lifecycle};
use super::status::StatusEvent;

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<Transport>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type Frame = std::result::Result<Message, WsError>;

/// Completion channel for a local close.
pub(crate) type CloseAck = oneshot::Sender<Result<()>>;

// ============================================================================
// SessionCommand
// ============================================================================

/// Requests queued by the controller.
pub(crate) enum SessionCommand {
    /// Write one data frame.
    Send(Outbound),
    /// Write one ping frame.
    Ping(Vec<u8>),
    /// Start delivering inbound messages.
    StartReceiving,
    /// Send a close frame, wait for the peer, release the transport.
    Close(CloseAck),
}

// ============================================================================
// Termination
// ============================================================================

/// Why the session task stopped.
#[derive(Debug)]
enum Termination {
    /// Peer sent a close frame first.
    PeerClosed { code: u16, reason: String },
    /// Our close frame was acknowledged, or the transport ended after it.
    LocalClose,
    /// Close did not complete before the deadline.
    CloseTimedOut,
    /// Transport ended without a close handshake.
    StreamEnded,
    /// Read or write failed.
    Failed(Error),
    /// Every controller handle is gone.
    Abandoned,
}

impl Termination {
    /// Whether the stream is still fit for a close handshake.
    fn is_graceful(&self) -> bool {
        !matches!(self, Self::CloseTimedOut | Self::Failed(_))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed { code, reason } if reason.is_empty() => {
                write!(f, "peer closed the connection (code {code})")
            }
            Self::PeerClosed { code, reason } => {
                write!(f, "peer closed the connection (code {code}: {reason})")
            }
            Self::LocalClose => f.write_str("connection closed"),
            Self::CloseTimedOut => f.write_str("close handshake timed out"),
            Self::StreamEnded => f.write_str("connection ended without close handshake"),
            Self::Failed(err) => write!(f, "{err}"),
            Self::Abandoned => f.write_str("client dropped"),
        }
    }
}

/// Result of one frame write.
enum Written {
    /// Frame fully flushed.
    Done,
    /// Write refused; the connection is still usable.
    Rejected,
    /// The session must end.
    Ended(Termination),
}

// ============================================================================
// SessionHandle
// ============================================================================

/// Controller side of a running session.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    closing: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    /// Queues `command`.
    ///
    /// # Errors
    ///
    /// Returns the command back if the session task has ended.
    pub(crate) fn submit(&self, command: SessionCommand) -> std::result::Result<(), SessionCommand> {
        self.commands.send(command).map_err(|e| e.0)
    }

    /// Starts the close deadline, also for a write that is already pending.
    pub(crate) fn request_close(&self) {
        self.closing.send_replace(true);
    }
}

// ============================================================================
// Control
// ============================================================================

/// Read half plus the flags every select loop consults.
struct Control {
    read: WsSource,
    closing: watch::Receiver<bool>,
    lifecycle: Arc<Lifecycle>,
    close_timeout: Duration,
    /// The caller armed the receive loop.
    delivering: bool,
    /// A read is kept outstanding (also while draining a close).
    reading: bool,
    close_requested: bool,
    close_sent: bool,
    deadline: Option<Instant>,
}

impl Control {
    /// Arms the close deadline once.
    fn start_close(&mut self) {
        if self.close_requested {
            return;
        }
        self.close_requested = true;
        // `close_timeout` is bounded by `ClientOptions::validate`.
        self.deadline = Some(Instant::now() + self.close_timeout);
        debug!(close_timeout = ?self.close_timeout, "Close requested");
    }

    /// Handles one read result; returns why the session ends, if it does.
    fn on_frame(&mut self, frame: Option<Frame>) -> Option<Termination> {
        match frame {
            Some(Ok(Message::Close(frame))) => {
                if self.close_sent {
                    debug!("Close acknowledged by peer");
                    return Some(Termination::LocalClose);
                }
                let (code, reason) = frame
                    .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                    .unwrap_or((1005, String::new()));
                debug!(code, %reason, "Peer closed the connection");
                Some(Termination::PeerClosed { code, reason })
            }

            Some(Ok(message)) => {
                if let Some(inbound) = InboundMessage::from_message(message) {
                    trace!(bytes = inbound.len(), "Message received");
                    if self.delivering {
                        self.lifecycle.report(&StatusEvent::Received(inbound));
                    }
                }
                None
            }

            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) if self.close_sent => {
                Some(Termination::LocalClose)
            }

            Some(Err(e)) => Some(Termination::Failed(Error::receive(e.to_string()))),

            None if self.close_sent => Some(Termination::LocalClose),

            None => Some(Termination::StreamEnded),
        }
    }

    /// Reports a write failure and decides whether the session survives it.
    fn write_failed(&self, e: WsError) -> Written {
        let fatal = matches!(
            e,
            WsError::Io(_) | WsError::ConnectionClosed | WsError::AlreadyClosed
        );
        let err = Error::send(e.to_string());
        warn!(error = %err, fatal, "Write failed");
        self.lifecycle.report_error(&err);
        if fatal {
            Written::Ended(Termination::Failed(err))
        } else {
            Written::Rejected
        }
    }
}

/// Writes one frame while still serving reads and the close deadline.
async fn write_frame(write: &mut WsSink, ctl: &mut Control, message: Message) -> Written {
    let send = write.send(message);
    tokio::pin!(send);

    loop {
        let deadline = ctl.deadline;
        tokio::select! {
            result = &mut send => {
                return match result {
                    Ok(()) => Written::Done,
                    Err(e) => ctl.write_failed(e),
                };
            }

            _ = ctl.closing.changed(), if !ctl.close_requested => ctl.start_close(),

            frame = ctl.read.next(), if ctl.reading => {
                if let Some(termination) = ctl.on_frame(frame) {
                    return Written::Ended(termination);
                }
            }

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                warn!("Write still pending at close deadline, abandoning it");
                return Written::Ended(Termination::CloseTimedOut);
            }
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Task side of an open connection.
pub(crate) struct Session {
    stream: WsStream,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    closing: watch::Receiver<bool>,
    lifecycle: Arc<Lifecycle>,
    close_timeout: Duration,
}

impl Session {
    pub(crate) fn new(
        stream: WsStream,
        lifecycle: Arc<Lifecycle>,
        close_timeout: Duration,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (closing_tx, closing_rx) = watch::channel(false);
        let session = Self {
            stream,
            commands: commands_rx,
            closing: closing_rx,
            lifecycle,
            close_timeout,
        };
        (
            session,
            SessionHandle {
                commands: commands_tx,
                closing: Arc::new(closing_tx),
            },
        )
    }

    /// Runs until the connection closes or fails.
    pub(crate) async fn run(self) {
        let Self {
            stream,
            mut commands,
            closing,
            lifecycle,
            close_timeout,
        } = self;

        let (mut write, read) = stream.split();
        let mut ctl = Control {
            read,
            closing,
            lifecycle,
            close_timeout,
            delivering: false,
            reading: false,
            close_requested: false,
            close_sent: false,
            deadline: None,
        };
        let mut close_ack: Option<CloseAck> = None;

        let termination = loop {
            let deadline = ctl.deadline;
            tokio::select! {
                _ = ctl.closing.changed(), if !ctl.close_requested => ctl.start_close(),

                command = commands.recv(), if !ctl.close_sent => {
                    match command {
                        Some(SessionCommand::Send(outbound)) => {
                            let bytes = outbound.len();
                            match write_frame(&mut write, &mut ctl, outbound.into_message()).await {
                                Written::Done => {
                                    trace!(bytes, "Frame written");
                                    ctl.lifecycle.report(&StatusEvent::Sent { bytes });
                                }
                                Written::Rejected => {}
                                Written::Ended(termination) => break termination,
                            }
                        }

                        Some(SessionCommand::Ping(payload)) => {
                            let bytes = payload.len();
                            match write_frame(&mut write, &mut ctl, Message::Ping(payload.into())).await {
                                Written::Done => {
                                    trace!(bytes, "Ping written");
                                    ctl.lifecycle.report(&StatusEvent::PingSent { bytes });
                                }
                                Written::Rejected => {}
                                Written::Ended(termination) => break termination,
                            }
                        }

                        Some(SessionCommand::StartReceiving) => {
                            debug!("Receive loop armed");
                            ctl.delivering = true;
                            ctl.reading = true;
                        }

                        Some(SessionCommand::Close(ack)) => {
                            debug!("Sending close frame");
                            close_ack = Some(ack);
                            ctl.start_close();
                            match write_frame(&mut write, &mut ctl, normal_close()).await {
                                Written::Done => {
                                    ctl.close_sent = true;
                                    ctl.reading = true;
                                }
                                Written::Rejected => {
                                    break Termination::Failed(Error::close("close frame rejected"));
                                }
                                Written::Ended(termination) => break termination,
                            }
                        }

                        None => {
                            debug!("Command channel closed");
                            ctl.start_close();
                            match write_frame(&mut write, &mut ctl, normal_close()).await {
                                Written::Ended(termination) => break termination,
                                Written::Done | Written::Rejected => break Termination::Abandoned,
                            }
                        }
                    }
                }

                frame = ctl.read.next(), if ctl.reading => {
                    if let Some(termination) = ctl.on_frame(frame) {
                        break termination;
                    }
                }

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!(?close_timeout, "Close did not complete in time");
                    break Termination::CloseTimedOut;
                }
            }
        };

        let Control {
            read,
            lifecycle,
            delivering,
            ..
        } = ctl;

        // Release the transport before publishing the final state.
        match read.reunite(write) {
            Ok(mut stream) if termination.is_graceful() => {
                // Flushes a queued close reply; errors once the handshake is done.
                let released = timeout(close_timeout, async {
                    let _ = stream.close(None).await;
                    stream.get_mut().close().await
                })
                .await;
                match released {
                    Ok(Err(e)) => trace!(error = %e, "Transport shutdown failed"),
                    Err(_) => debug!("Transport shutdown timed out"),
                    Ok(Ok(())) => {}
                }
            }
            Ok(_) => debug!(%termination, "Dropping transport without close handshake"),
            Err(_) => warn!("Could not reunite stream halves"),
        }

        // Commands that never reached the wire.
        commands.close();
        let mut discarded = 0usize;
        while let Ok(command) = commands.try_recv() {
            match command {
                SessionCommand::Close(ack) => close_ack = Some(ack),
                SessionCommand::Send(_) | SessionCommand::Ping(_) => discarded += 1,
                SessionCommand::StartReceiving => {}
            }
        }
        if discarded > 0 {
            lifecycle.report_error(&Error::send(format!(
                "{discarded} queued frame(s) discarded, connection ended"
            )));
        }

        Self::finish(&lifecycle, delivering, termination, close_ack);
    }

    /// Publishes the termination and the final state, then answers `close`.
    fn finish(
        lifecycle: &Lifecycle,
        delivering: bool,
        termination: Termination,
        close_ack: Option<CloseAck>,
    ) {
        debug!(%termination, "Session ended");

        if delivering {
            lifecycle.report(&StatusEvent::ReceiveTerminated {
                reason: termination.to_string(),
            });
        }

        let outcome = match termination {
            Termination::PeerClosed { .. } | Termination::LocalClose | Termination::Abandoned => {
                lifecycle.finish_close();
                Ok(())
            }
            Termination::CloseTimedOut => {
                let err = Error::close("close did not complete in time; transport released");
                lifecycle.report_error(&err);
                lifecycle.finish_close();
                Err(err)
            }
            Termination::StreamEnded => {
                let err = Error::receive("connection ended without close handshake");
                Self::end_failed(lifecycle, &err);
                Err(Error::close(err.to_string()))
            }
            Termination::Failed(err) => {
                Self::end_failed(lifecycle, &err);
                Err(Error::close(err.to_string()))
            }
        };

        lifecycle.reset_receiving();

        if let Some(ack) = close_ack {
            let _ = ack.send(outcome);
        }
    }

    /// Moves to `Failed`, or to `Closed` if a local close was under way.
    fn end_failed(lifecycle: &Lifecycle, err: &Error) {
        if lifecycle.state() == ConnectionState::Closing {
            lifecycle.report_error(err);
            lifecycle.transition(ConnectionState::Closed);
        } else {
            lifecycle.fail(err);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use tokio::net::TcpListener;

    use crate::client::status::StatusSink;
    use crate::endpoint::Endpoint;
    use crate::error::ErrorKind;
    use crate::protocol::{HandshakeOptions, negotiate};
    use crate::transport::{Connector, TlsOptions};

    type Events = Arc<Mutex<Vec<StatusEvent>>>;

    fn open_lifecycle() -> (Arc<Lifecycle>, Events) {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        let sink: Arc<dyn StatusSink> =
            Arc::new(move |event: &StatusEvent| events_clone.lock().push(event.clone()));
        let lifecycle = Arc::new(Lifecycle::new(sink));
        for state in [
            ConnectionState::Resolving,
            ConnectionState::Connecting,
            ConnectionState::WsHandshaking,
            ConnectionState::Open,
        ] {
            lifecycle.transition(state);
        }
        events.lock().clear();
        (lifecycle, events)
    }

    /// Starts a peer running `script` and returns a connected client stream.
    async fn connect_to<F, Fut>(script: F) -> WsStream
    where
        F: FnOnce(WebSocketStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            script(ws).await;
        });

        let endpoint = Endpoint::parse(&format!("ws://{addr}/")).unwrap();
        let connector = Connector::new(false, &TlsOptions::new()).unwrap();
        let transport = connector.establish(&[addr], "127.0.0.1").await.unwrap();
        negotiate(transport, &endpoint, &HandshakeOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_peer_close_ends_in_closed() {
        let stream = connect_to(|mut ws| async move {
            ws.send(Message::text("one")).await.unwrap();
            ws.close(None).await.unwrap();
            while ws.next().await.is_some() {}
        })
        .await;

        let (lifecycle, events) = open_lifecycle();
        let (session, handle) = Session::new(stream, Arc::clone(&lifecycle), Duration::from_secs(2));
        handle.submit(SessionCommand::StartReceiving).ok().unwrap();
        session.run().await;

        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        let events = events.lock();
        assert!(events.contains(&StatusEvent::Received(InboundMessage::Text("one".into()))));
        let terminations = events
            .iter()
            .filter(|e| matches!(e, StatusEvent::ReceiveTerminated { .. }))
            .count();
        assert_eq!(terminations, 1);
    }

    #[tokio::test]
    async fn test_local_close_is_acknowledged() {
        let stream = connect_to(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let (lifecycle, _events) = open_lifecycle();
        lifecycle.transition(ConnectionState::Closing);
        let (session, handle) = Session::new(stream, Arc::clone(&lifecycle), Duration::from_secs(2));
        let (ack_tx, ack_rx) = oneshot::channel();
        handle.submit(SessionCommand::Close(ack_tx)).ok().unwrap();
        session.run().await;

        assert!(ack_rx.await.unwrap().is_ok());
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_dropped_handle_closes_session() {
        let stream = connect_to(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let (lifecycle, _events) = open_lifecycle();
        let (session, handle) = Session::new(stream, Arc::clone(&lifecycle), Duration::from_secs(2));
        drop(handle);
        session.run().await;

        assert_eq!(lifecycle.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_abrupt_eof_fails_connection() {
        let stream = connect_to(|ws| async move {
            drop(ws);
        })
        .await;

        let (lifecycle, events) = open_lifecycle();
        let (session, handle) = Session::new(stream, Arc::clone(&lifecycle), Duration::from_secs(2));
        handle.submit(SessionCommand::StartReceiving).ok().unwrap();
        session.run().await;

        assert_eq!(lifecycle.state(), ConnectionState::Failed);
        assert!(events.lock().iter().any(StatusEvent::is_error));
    }

    #[tokio::test]
    async fn test_close_abandons_stalled_write() {
        // Upgrades, then never reads again.
        let stream = connect_to(|ws| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(ws);
        })
        .await;

        let (lifecycle, events) = open_lifecycle();
        let (session, handle) =
            Session::new(stream, Arc::clone(&lifecycle), Duration::from_millis(200));
        for _ in 0..32 {
            let frame = Outbound::Binary(vec![0u8; 1 << 20]);
            handle.submit(SessionCommand::Send(frame)).ok().unwrap();
        }
        lifecycle.transition(ConnectionState::Closing);
        handle.request_close();
        let (ack_tx, ack_rx) = oneshot::channel();
        handle.submit(SessionCommand::Close(ack_tx)).ok().unwrap();

        timeout(Duration::from_secs(5), session.run())
            .await
            .expect("session outlived the close deadline");

        let err = ack_rx.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Close);
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert!(events.lock().iter().any(StatusEvent::is_error));
        assert!(handle.submit(SessionCommand::StartReceiving).is_err());
    }

    #[test]
    fn test_termination_display() {
        let t = Termination::PeerClosed {
            code: 1000,
            reason: String::new(),
        };
        assert_eq!(t.to_string(), "peer closed the connection (code 1000)");
        assert_eq!(
            Termination::CloseTimedOut.to_string(),
            "close handshake timed out"
        );
    }
}
