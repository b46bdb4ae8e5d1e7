//! Startup and shutdown orchestration for a group of sites.
//!
//! # Responsibilities
//! - Start sites in order, only after the runner is set up
//! - Roll back already-started sites when a later one fails
//! - Stop every started site concurrently, each with its own grace period
//!
//! # Design Decisions
//! - Fail fast: the first start error aborts the remaining sites
//! - Rollback stops sites in reverse start order
//! - Shutdown is concurrent so one slow site does not delay the others' grace

use futures_util::future::join_all;

use crate::error::{Error, Result};
use crate::net::site::{Site, SiteState};

/// Start every site in order.
///
/// On failure the sites started so far are stopped again (newest first) and
/// [`Error::Startup`] names the failing site, the rolled back ones and the
/// underlying cause.
pub async fn start_sites(sites: &mut [Site]) -> Result<()> {
    for index in 0..sites.len() {
        if let Err(source) = sites[index].start().await {
            let failed = sites[index].name().to_string();
            let mut rolled_back = Vec::with_capacity(index);
            for site in sites[..index].iter_mut().rev() {
                site.stop().await;
                rolled_back.push(site.name().to_string());
            }

            tracing::error!(
                site = %failed,
                rolled_back = rolled_back.len(),
                error = %source,
                "Startup aborted"
            );
            return Err(Error::Startup {
                failed,
                rolled_back,
                source: Box::new(source),
            });
        }
    }

    tracing::info!(sites = sites.len(), "All sites started");
    Ok(())
}

/// Stop every started site concurrently. Sites in any other state are left alone.
pub async fn stop_sites(sites: &mut [Site]) {
    let started = sites
        .iter()
        .filter(|site| site.state() == SiteState::Started)
        .count();
    if started == 0 {
        return;
    }

    tracing::info!(sites = started, "Stopping sites");
    join_all(sites.iter_mut().map(|site| site.stop())).await;
}
