//! Application subsystem.
//!
//! # Data Flow
//! ```text
//! Application::new()
//!     → on_startup / on_shutdown / on_cleanup accept hooks (signal.rs)
//!     → state accepts inserts/removes (state.rs)
//!
//! Runner::setup()
//!     → on_startup frozen, startup hooks fired in order
//!     → Application::freeze() (all signals + state)
//!
//! Runner::cleanup()
//!     → shutdown hooks, then cleanup hooks
//! ```
//!
//! # Design Decisions
//! - Hooks run strictly one after another; the first failure stops the chain
//! - Freezing is one-way and idempotent
//! - Post-freeze state mutation is rejected unless the Warn policy is chosen
//! - Application equality is identity, never structural

pub mod application;
pub mod signal;
pub mod state;

pub use application::Application;
pub use signal::Signal;
pub use state::{ApplicationState, FrozenPolicy, StateValue};
