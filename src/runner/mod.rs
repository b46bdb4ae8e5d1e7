//! Runner subsystem.
//!
//! # Data Flow
//! ```text
//! Runner::setup()
//!     → startup hooks → Application frozen
//!     → Server built once (handler + application), shared by all sites
//!
//! Site::start()
//!     → server.rs spawns the accept / receive loop
//!     → each connection or datagram: own task → handler.rs Handler
//!
//! Site::stop(grace)
//!     → transport closed → in-flight tasks drained or aborted
//!
//! Runner::cleanup()
//!     → shutdown hooks → cleanup hooks
//! ```
//!
//! # Design Decisions
//! - One long-lived consumer factory, many short-lived per-connection tasks
//! - Sites keep only a weak reference to their runner
//! - Cleanup refuses to run while any site is still started

pub mod app_runner;
pub mod handler;
pub mod server;

pub use app_runner::{Runner, RunnerState};
pub use handler::{Connection, Datagram, Handler};
pub use server::ServerHandle;
