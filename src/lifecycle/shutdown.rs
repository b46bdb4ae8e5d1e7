//! Shutdown coordination for a site's serving task.

use std::time::Duration;

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Carries the grace period to every subscribed task. Dropping the
/// coordinator closes the channel, which subscribers treat as an immediate
/// shutdown with no grace.
#[derive(Debug)]
pub struct Shutdown {
    tx: broadcast::Sender<Duration>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Duration> {
        self.tx.subscribe()
    }

    /// Trigger shutdown, allowing `grace` for in-flight work to finish.
    pub fn trigger(&self, grace: Duration) {
        let _ = self.tx.send(grace);
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for shutdown on `rx` and return the grace period to honour.
pub async fn recv_grace(rx: &mut broadcast::Receiver<Duration>) -> Duration {
    match rx.recv().await {
        Ok(grace) => grace,
        Err(_) => Duration::ZERO,
    }
}
