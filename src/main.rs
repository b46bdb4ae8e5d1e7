//! `asyncapp` demo server.
//!
//! Binds every site from a TOML config file (or one TCP site on
//! `0.0.0.0:8080` without one), logs what arrives, and shuts down gracefully
//! on SIGINT/SIGTERM.

use std::path::PathBuf;

use async_trait::async_trait;
use clap::Parser;
use tokio::io::AsyncReadExt;

use asyncapp::config::{load_config, AppConfig};
use asyncapp::lifecycle::{shutdown_signal, start_sites, stop_sites};
use asyncapp::observability::{logging, metrics};
use asyncapp::{Application, Connection, Datagram, Handler, Runner, Site};

#[derive(Parser, Debug)]
#[command(name = "asyncapp", version, about = "Serve an application over TCP, UDP and Unix sockets")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Logs every chunk read from a connection and every datagram received.
struct LoggingHandler;

#[async_trait]
impl Handler for LoggingHandler {
    async fn on_connection(&self, _app: &Application, mut conn: Connection) {
        let mut buf = vec![0u8; 8 * 1024];
        loop {
            match conn.stream().read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => tracing::info!(conn = %conn.id(), peer = %conn.peer(), bytes = n, "Received"),
                Err(e) => {
                    tracing::warn!(conn = %conn.id(), error = %e, "Read failed");
                    break;
                }
            }
        }
        tracing::debug!(conn = %conn.id(), "Connection closed");
    }

    async fn on_datagram(&self, _app: &Application, datagram: Datagram) {
        tracing::info!(
            peer = %datagram.peer(),
            bytes = datagram.data().len(),
            "Datagram received"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init(&config.observability)?;
    tracing::info!("asyncapp v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        sites = config.sites.len(),
        frozen_state = ?config.lifecycle.frozen_state,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let app = Application::with_policy(config.lifecycle.frozen_state);
    let runner = Runner::new(app, LoggingHandler);
    runner.setup().await?;

    let mut sites = config
        .sites
        .iter()
        .map(|site| Site::from_config(&runner, site))
        .collect::<Result<Vec<_>, _>>()?;

    if let Err(e) = start_sites(&mut sites).await {
        runner.cleanup().await?;
        return Err(e.into());
    }

    let signal = shutdown_signal().await;
    if let Err(e) = &signal {
        tracing::error!(error = %e, "Signal handler failed; shutting down");
    }

    stop_sites(&mut sites).await;
    runner.cleanup().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
