//! Error types shared by the application, site and runner layers.

use std::fmt;
use std::io;

use thiserror::Error;

/// Error returned by a lifecycle hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Lifecycle phase a hook chain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Startup,
    Shutdown,
    Cleanup,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Startup => "startup",
            Phase::Shutdown => "shutdown",
            Phase::Cleanup => "cleanup",
        };
        f.write_str(name)
    }
}

/// Errors raised by the binding and lifecycle API.
#[derive(Debug, Error)]
pub enum Error {
    /// Contradictory or missing binding parameters.
    #[error("invalid site configuration: {0}")]
    Configuration(String),

    /// The OS refused the requested address or path.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Registration or mutation attempted after the freeze point.
    #[error("{what} is frozen")]
    Frozen { what: &'static str },

    /// A lifecycle method was called out of sequence.
    #[error("lifecycle order violation: {0}")]
    LifecycleOrder(String),

    /// A hook failed; remaining hooks of that phase were skipped.
    #[error("{phase} hook failed: {source}")]
    Hook {
        phase: Phase,
        #[source]
        source: HookError,
    },

    /// One of several sites failed to start. Sites already started were stopped again.
    #[error("failed to start {failed} (rolled back: {rolled_back:?}): {source}")]
    Startup {
        failed: String,
        rolled_back: Vec<String>,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn bind(address: impl Into<String>, source: io::Error) -> Self {
        Error::Bind {
            address: address.into(),
            source,
        }
    }
}

/// Result type for lifecycle operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Startup.to_string(), "startup");
        assert_eq!(Phase::Cleanup.to_string(), "cleanup");
    }

    #[test]
    fn hook_error_keeps_source() {
        let err = Error::Hook {
            phase: Phase::Shutdown,
            source: "database still busy".into(),
        };
        assert_eq!(err.to_string(), "shutdown hook failed: database still busy");
        assert!(std::error::Error::source(&err).is_some());
    }
}
