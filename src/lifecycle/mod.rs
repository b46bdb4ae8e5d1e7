//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Runner::setup → start_sites (in order, rollback on failure)
//!
//! Shutdown (shutdown.rs):
//!     Site::stop → Stop accepting → Drain in-flight work → Abort after grace
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → stop_sites → Runner::cleanup
//! ```
//!
//! # Design Decisions
//! - Ordered startup: hooks first, then application frozen, then sites
//! - Ordered shutdown: stop sites, shutdown hooks, cleanup hooks
//! - Shutdown has timeout: in-flight work aborted after the grace period

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use signals::{shutdown_signal, ShutdownSignal};
pub use startup::{start_sites, stop_sites};
