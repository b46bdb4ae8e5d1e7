//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject contradictory binding parameters
//! - Validate value ranges

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{AppConfig, SiteConfig};

/// A semantic problem with one configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("path cannot be combined with host or port")]
    PathWithHostPort,

    #[error("reuse_address/reuse_port cannot be combined with path")]
    ReuseWithPath,

    #[error("path must not be empty")]
    EmptyPath,

    #[error("host must not be empty")]
    EmptyHost,

    #[error("site {index}: {source}")]
    Site {
        index: usize,
        #[source]
        source: Box<ValidationError>,
    },

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),
}

/// Check one site binding. Returns every problem found.
pub fn validate_site(site: &SiteConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(path) = &site.path {
        if site.host.is_some() || site.port.is_some() {
            errors.push(ValidationError::PathWithHostPort);
        }
        if site.reuse_address.is_some() || site.reuse_port.is_some() {
            errors.push(ValidationError::ReuseWithPath);
        }
        if path.as_os_str().is_empty() {
            errors.push(ValidationError::EmptyPath);
        }
    }

    if site.host.as_deref().is_some_and(str::is_empty) {
        errors.push(ValidationError::EmptyHost);
    }

    errors
}

/// Validate the whole configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors: Vec<ValidationError> = config
        .sites
        .iter()
        .enumerate()
        .flat_map(|(index, site)| {
            validate_site(site)
                .into_iter()
                .map(move |e| ValidationError::Site {
                    index,
                    source: Box::new(e),
                })
        })
        .collect();

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(obs.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
