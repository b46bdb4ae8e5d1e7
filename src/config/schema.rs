//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files. Every
//! section has defaults so a minimal file (or none) is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::app::FrozenPolicy;
use crate::net::site::TransportKind;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sites to start, in order.
    pub sites: Vec<SiteConfig>,

    /// Application lifecycle settings.
    pub lifecycle: LifecycleConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sites: vec![SiteConfig::default()],
            lifecycle: LifecycleConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// One site binding.
///
/// Either `path` or `host`/`port` may be given, never both. Unset
/// `host`/`port` fall back to all interfaces on port 8080.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SiteConfig {
    /// `stream` or `datagram`.
    pub transport: TransportKind,

    pub host: Option<String>,

    pub port: Option<u16>,

    /// Unix-domain socket path. A leading NUL byte selects the abstract namespace.
    pub path: Option<PathBuf>,

    /// SO_REUSEADDR (TCP/UDP only).
    pub reuse_address: Option<bool>,

    /// SO_REUSEPORT (TCP/UDP only).
    pub reuse_port: Option<bool>,

    /// Grace period for in-flight work on stop, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Stream,
            host: None,
            port: None,
            path: None,
            reuse_address: None,
            reuse_port: None,
            shutdown_timeout_secs: 60,
        }
    }
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// What to do when application state is mutated after freeze.
    pub frozen_state: FrozenPolicy,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level filter (trace, debug, info, warn, error). `RUST_LOG` wins.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
