//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define serving metrics (accepted connections, datagrams, in-flight work, live sites)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-site and aggregate metrics
//!
//! # Metrics
//! - `asyncapp_connections_accepted_total` (counter): accepted stream connections by site
//! - `asyncapp_datagrams_received_total` (counter): received datagrams by site
//! - `asyncapp_in_flight` (gauge): connections/datagrams currently being handled, by site
//! - `asyncapp_sites_started` (gauge): sites currently started, by transport
//!
//! Recording is a no-op until a recorder is installed, so library users who
//! never call [`init_metrics`] pay only for the macro dispatch.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::net::site::TransportKind;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime; the HTTP listener is spawned
/// onto it.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection(site: &str) {
    ::metrics::counter!("asyncapp_connections_accepted_total", "site" => site.to_owned())
        .increment(1);
}

pub fn record_datagram(site: &str) {
    ::metrics::counter!("asyncapp_datagrams_received_total", "site" => site.to_owned())
        .increment(1);
}

/// Adjust the in-flight gauge of `site` by `delta`.
pub fn in_flight_changed(site: &str, delta: f64) {
    let gauge = ::metrics::gauge!("asyncapp_in_flight", "site" => site.to_owned());
    if delta >= 0.0 {
        gauge.increment(delta);
    } else {
        gauge.decrement(-delta);
    }
}

pub fn site_started(transport: TransportKind) {
    ::metrics::gauge!("asyncapp_sites_started", "transport" => transport_label(transport))
        .increment(1.0);
}

pub fn site_stopped(transport: TransportKind) {
    ::metrics::gauge!("asyncapp_sites_started", "transport" => transport_label(transport))
        .decrement(1.0);
}

fn transport_label(transport: TransportKind) -> &'static str {
    match transport {
        TransportKind::Stream => "stream",
        TransportKind::Datagram => "datagram",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_connection("tcp://127.0.0.1:1");
        record_datagram("udp://127.0.0.1:1");
        in_flight_changed("tcp://127.0.0.1:1", 1.0);
        in_flight_changed("tcp://127.0.0.1:1", -1.0);
        site_started(TransportKind::Stream);
        site_stopped(TransportKind::Stream);
    }

    #[test]
    fn transport_labels() {
        assert_eq!(transport_label(TransportKind::Stream), "stream");
        assert_eq!(transport_label(TransportKind::Datagram), "datagram");
    }
}
