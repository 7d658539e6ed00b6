//! Event loop driver.
//!
//! Owns the tokio runtime that performs all socket I/O. The runtime has
//! one I/O worker thread; [`EventLoop::run`] parks a caller-chosen thread
//! until the loop has no outstanding session or is stopped, mirroring a
//! reactor that returns once it runs out of work.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error};

use crate::error::{Error, Result};

// ============================================================================
// LoopSignal
// ============================================================================

/// Work observed by [`EventLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LoopSignal {
    /// Spawned tasks that have not finished yet.
    outstanding: usize,
    /// Bumped by every [`EventLoop::stop`].
    stops: u64,
}

// ============================================================================
// EventLoop
// ============================================================================

/// Reactor for connect, handshake, read and write completions.
pub struct EventLoop {
    /// Runtime executing every asynchronous operation.
    runtime: Runtime,
    /// Work signal observed by `run`.
    signal: Arc<watch::Sender<LoopSignal>>,
}

impl EventLoop {
    /// Creates the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventLoop`] if the runtime cannot be allocated.
    /// This is the one failure callers are expected to treat as fatal.
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("wsline-io")
            .enable_all()
            .build()
            .map_err(|e| Error::event_loop(format!("failed to build runtime: {e}")))?;

        let (signal, _) = watch::channel(LoopSignal::default());

        Ok(Self {
            runtime,
            signal: Arc::new(signal),
        })
    }

    /// Blocks the calling thread until there is no outstanding session or
    /// [`EventLoop::stop`] is called. Returns immediately when idle.
    ///
    /// Must not be called from inside the loop itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventLoop`] if the work signal is lost.
    pub fn run(&self) -> Result<()> {
        let mut signal = self.signal.subscribe();
        let stops = signal.borrow().stops;
        debug!("Event loop running");

        let outcome = self.runtime.block_on(async move {
            signal
                .wait_for(|state| state.outstanding == 0 || state.stops != stops)
                .await
                .map(|state| *state)
        });

        match outcome {
            Ok(state) => {
                debug!(?state, "Event loop returned");
                Ok(())
            }
            Err(_) => Err(Error::event_loop("work signal dropped")),
        }
    }

    /// Makes a blocked [`EventLoop::run`] return. Sessions keep running.
    pub fn stop(&self) {
        self.signal.send_modify(|state| state.stops = state.stops.wrapping_add(1));
    }

    /// Returns `true` while a session is outstanding.
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.signal.borrow().outstanding > 0
    }

    /// Runs `future` to completion on the loop, blocking the caller.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Spawns `task` as outstanding work and returns a handle that can
    /// cancel it.
    ///
    /// The loop is idle once every spawned task has finished. A panic inside
    /// `task` is turned into an [`Error::EventLoop`] passed to `on_panic`.
    pub(crate) fn spawn_work<F, P>(&self, task: F, on_panic: P) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
        P: FnOnce(Error) + Send + 'static,
    {
        self.signal.send_modify(|state| state.outstanding += 1);

        let handle = self.runtime.spawn(task);
        let abort = handle.abort_handle();
        let signal = Arc::clone(&self.signal);

        self.runtime.spawn(async move {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("Session task panicked");
                    on_panic(Error::event_loop("session task panicked"));
                } else {
                    debug!("Session task cancelled");
                }
            }
            signal.send_modify(|state| state.outstanding = state.outstanding.saturating_sub(1));
        });

        abort
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("signal", &*self.signal.borrow())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
