//! Serving loops that bridge a started site to the runner's handler.
//!
//! # Responsibilities
//! - Accept connections / receive datagrams until shutdown is triggered
//! - Spawn one task per connection or datagram
//! - Close the transport first, then drain in-flight tasks within the grace
//!   period and abort whatever is left

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};

use crate::app::Application;
use crate::lifecycle::shutdown::{recv_grace, Shutdown};
use crate::net::connection::ConnectionTracker;
use crate::net::datagram::{DatagramSocket, MAX_DATAGRAM_SIZE};
use crate::net::stream::Listener;
use crate::observability::metrics;
use crate::runner::handler::{Connection, Datagram, Handler};

/// Back-off after an accept or receive error, so a persistent error such as
/// descriptor exhaustion does not spin the loop.
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// The consumer factory built once by `Runner::setup` and shared read-only by
/// every site of that runner.
pub(crate) struct Server {
    app: Application,
    handler: Arc<dyn Handler>,
}

impl Server {
    pub(crate) fn new(app: Application, handler: Arc<dyn Handler>) -> Self {
        Self { app, handler }
    }

    /// Spawn the accept loop for a stream site.
    pub(crate) fn serve_stream(self: &Arc<Self>, listener: Listener, site: String) -> ServerHandle {
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        let tracker = ConnectionTracker::new(site.as_str());
        let task = tokio::spawn(accept_loop(
            Arc::clone(self),
            listener,
            site,
            rx,
            tracker.clone(),
        ));
        ServerHandle::new(shutdown, task, tracker)
    }

    /// Spawn the receive loop for a datagram site.
    pub(crate) fn serve_datagram(
        self: &Arc<Self>,
        socket: DatagramSocket,
        site: String,
    ) -> ServerHandle {
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        let tracker = ConnectionTracker::new(site.as_str());
        let task = tokio::spawn(receive_loop(
            Arc::clone(self),
            Arc::new(socket),
            site,
            rx,
            tracker.clone(),
        ));
        ServerHandle::new(shutdown, task, tracker)
    }
}

/// Uniform handle over a started site's transport, stream or datagram.
///
/// `close` is synchronous and only requests shutdown; `wait_closed` resolves
/// once the transport is released and in-flight work has drained or been
/// aborted. Dropping the handle closes with no grace period.
#[derive(Debug)]
pub struct ServerHandle {
    shutdown: Shutdown,
    task: Option<JoinHandle<()>>,
    tracker: ConnectionTracker,
}

impl ServerHandle {
    fn new(shutdown: Shutdown, task: JoinHandle<()>, tracker: ConnectionTracker) -> Self {
        Self {
            shutdown,
            task: Some(task),
            tracker,
        }
    }

    /// Stop accepting new work; allow `grace` for in-flight work.
    pub fn close(&self, grace: Duration) {
        self.shutdown.trigger(grace);
    }

    pub async fn wait_closed(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Serving task ended abnormally");
            }
        }
    }

    /// Connections or datagrams currently being handled.
    pub fn in_flight(&self) -> u64 {
        self.tracker.active_count()
    }
}

async fn accept_loop(
    server: Arc<Server>,
    listener: Listener,
    site: String,
    mut shutdown: broadcast::Receiver<Duration>,
    tracker: ConnectionTracker,
) {
    let mut tasks = JoinSet::new();

    let grace = loop {
        tokio::select! {
            grace = recv_grace(&mut shutdown) => break grace,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let guard = tracker.track();
                    tracing::debug!(site = %site, peer = %peer, connection_id = %guard.id(), "Connection accepted");
                    metrics::record_connection(&site);

                    let server = Arc::clone(&server);
                    let conn = Connection::new(guard.id(), peer, stream);
                    tasks.spawn(async move {
                        let _guard = guard;
                        server.handler.on_connection(&server.app, conn).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(site = %site, error = %e, "Accept failed");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(&site, joined),
        }
    };

    // Release the address before draining.
    drop(listener);
    drain(&mut tasks, grace, &site).await;
}

async fn receive_loop(
    server: Arc<Server>,
    socket: Arc<DatagramSocket>,
    site: String,
    mut shutdown: broadcast::Receiver<Duration>,
    tracker: ConnectionTracker,
) {
    let mut tasks = JoinSet::new();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    let grace = loop {
        tokio::select! {
            grace = recv_grace(&mut shutdown) => break grace,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    let guard = tracker.track();
                    tracing::trace!(site = %site, peer = %peer, len, "Datagram received");
                    metrics::record_datagram(&site);

                    let datagram = Datagram::new(
                        guard.id(),
                        Bytes::copy_from_slice(&buf[..len]),
                        peer,
                        Arc::downgrade(&socket),
                    );
                    let server = Arc::clone(&server);
                    tasks.spawn(async move {
                        let _guard = guard;
                        server.handler.on_datagram(&server.app, datagram).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(site = %site, error = %e, "Receive failed");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(&site, joined),
        }
    };

    // Only weak references remain in handlers, so this releases the address
    // now. Replies attempted during the grace period fail.
    drop(socket);
    drain(&mut tasks, grace, &site).await;
}

async fn drain(tasks: &mut JoinSet<()>, grace: Duration, site: &str) {
    if tasks.is_empty() {
        return;
    }

    tracing::debug!(site, in_flight = tasks.len(), grace = ?grace, "Draining in-flight work");
    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = tasks.join_next().await {
            log_join(site, joined);
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(site, aborted = tasks.len(), "Grace period elapsed, aborting in-flight work");
        tasks.shutdown().await;
    }
}

fn log_join(site: &str, joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(site, error = %e, "Handler panicked");
        }
    }
}
