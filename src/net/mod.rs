//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Site::start()
//!     → bind.rs (socket options, bind, stale unix socket cleanup)
//!     → stream.rs / datagram.rs (one transport type per family)
//!     → connection.rs (per-unit tracking for graceful shutdown)
//!     → Hand off to runner server
//!
//! Site States:
//!     Unbound → Starting → Started → Stopping → Stopped
//! ```
//!
//! # Design Decisions
//! - Socket options are applied before bind through socket2
//! - Each connection or datagram tracked for graceful shutdown
//! - TCP and Unix streams are unified behind one `Stream` type

pub mod bind;
pub mod connection;
pub mod datagram;
pub mod site;
pub mod stream;

pub use site::{Site, SiteKind, SiteState, StdDatagram, StdListener, TransportKind};
pub use stream::{PeerAddr, Stream};
