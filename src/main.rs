//! Interactive WebSocket client.
//!
//! Connects to `--url`, sends a ping, prints everything received, and
//! forwards each stdin line as a text message. EOF closes the connection.

use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use wsline::{Client, ClientOptions, Endpoint, ErrorKind, StatusEvent, StatusSink};

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "wsline", version, about = "WebSocket Client")]
struct Args {
    /// WebSocket server URL (ws:// or wss://).
    #[arg(short, long)]
    url: String,

    /// Accept any TLS certificate.
    #[arg(long)]
    insecure: bool,
}

// ============================================================================
// Console Sink
// ============================================================================

/// Prints status lines; errors go to stderr.
struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn report(&self, event: &StatusEvent) {
        match event {
            StatusEvent::StateChanged { .. } | StatusEvent::Resolved { .. } => {}
            StatusEvent::Error { .. } => eprintln!("{event}"),
            _ => println!("{event}"),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging();

    let endpoint = match Endpoint::parse(&args.url) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            eprintln!("{}: {e}", e.kind());
            return ExitCode::SUCCESS;
        }
    };

    let options = ClientOptions::new().danger_accept_invalid_certs(args.insecure);
    let client = match Client::new(endpoint, options, Arc::new(ConsoleSink)) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Cannot start client");
            eprintln!("{}: {e}", e.kind());
            return if e.kind() == ErrorKind::EventLoop {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Failures are already reported through the sink.
    if client.connect().is_err() {
        return ExitCode::SUCCESS;
    }
    let _ = client.ping(&[]);
    let _ = client.receive_loop();

    thread::scope(|scope| {
        let io_thread = scope.spawn(|| client.run());

        for line in io::stdin().lock().lines() {
            let Ok(message) = line else { break };
            if client.state().is_terminal() {
                break;
            }
            println!("Sending message: {message}");
            let _ = client.send(message);
        }

        let _ = client.close();
        client.stop();
        let _ = io_thread.join();
    });

    ExitCode::SUCCESS
}
