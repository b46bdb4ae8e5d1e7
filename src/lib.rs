//! Async application lifecycle and multi-transport serving.
//!
//! # Architecture Overview
//!
//! ```text
//!   Application ──────────────── state (frozen after startup)
//!      │                          on_startup / on_shutdown / on_cleanup signals
//!      ▼
//!   Runner ── setup() ──▶ startup hooks ──▶ freeze ──▶ Server(handler, app)
//!      │                                                  │
//!      │   Site::tcp / unix / sock / udp / datagram_*     │
//!      └──▶ start() ─ bind ─▶ accept / receive loop ◀─────┘
//!                                  │
//!                                  ▼
//!                        one task per connection / datagram
//!
//!   stop(grace) ─▶ close transport ─▶ drain ─▶ abort stragglers
//!   cleanup()   ─▶ shutdown hooks ─▶ cleanup hooks
//! ```

// Core
pub mod app;
pub mod error;
pub mod net;
pub mod runner;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use app::{Application, ApplicationState, FrozenPolicy, Signal, StateValue};
pub use error::{Error, HookError, Phase, Result};
pub use net::{PeerAddr, Site, SiteKind, SiteState, Stream, TransportKind};
pub use runner::{Connection, Datagram, Handler, Runner, RunnerState};
