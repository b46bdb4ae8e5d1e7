//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT (Ctrl-C) or SIGTERM
//! - Report which one arrived so the caller can begin graceful shutdown
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A failure to register a handler is returned, not swallowed

use std::fmt;
use std::io;

use tokio::signal::unix::{signal, SignalKind};

/// Signal that requested shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Resolve when the process is asked to shut down.
pub async fn shutdown_signal() -> io::Result<ShutdownSignal> {
    let mut terminate = signal(SignalKind::terminate())?;

    let received = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            ShutdownSignal::Interrupt
        }
        _ = terminate.recv() => ShutdownSignal::Terminate,
    };

    tracing::info!(signal = %received, "Shutdown signal received");
    Ok(received)
}
