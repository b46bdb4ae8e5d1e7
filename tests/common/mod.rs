//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use asyncapp::{Application, Connection, Datagram, Handler};

/// Echoes stream bytes back until EOF and replies to every datagram with its payload.
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn on_connection(&self, _app: &Application, mut conn: Connection) {
        let mut buf = [0u8; 1024];
        loop {
            match conn.stream().read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if conn.stream().write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    async fn on_datagram(&self, _app: &Application, datagram: Datagram) {
        let _ = datagram.reply(datagram.data()).await;
    }
}

/// Sleeps for `delay` on every connection or datagram and counts how many
/// calls started and how many ran to completion.
#[derive(Clone)]
pub struct SlowHandler {
    pub delay: Duration,
    pub started: Arc<AtomicUsize>,
    pub finished: Arc<AtomicUsize>,
}

impl SlowHandler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            started: Arc::new(AtomicUsize::new(0)),
            finished: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    async fn work(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Handler for SlowHandler {
    async fn on_connection(&self, _app: &Application, _conn: Connection) {
        self.work().await;
    }

    async fn on_datagram(&self, _app: &Application, _datagram: Datagram) {
        self.work().await;
    }
}

/// Ordered record of lifecycle events.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// An ephemeral TCP port that was free a moment ago.
pub fn free_tcp_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Send one datagram from a fresh client socket and wait for the reply.
pub async fn udp_round_trip(target: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let client = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(payload, target).await.unwrap();
    let mut buf = [0u8; 1024];
    let (n, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("no reply within 5s")
        .unwrap();
    buf[..n].to_vec()
}

/// Keeps every datagram it receives, outliving the handler call.
#[derive(Clone, Default)]
pub struct KeepingHandler {
    pub kept: Arc<Mutex<Vec<Datagram>>>,
}

impl KeepingHandler {
    pub fn kept(&self) -> usize {
        self.kept.lock().len()
    }

    pub fn first(&self) -> Option<Datagram> {
        self.kept.lock().first().cloned()
    }
}

#[async_trait]
impl Handler for KeepingHandler {
    async fn on_datagram(&self, _app: &Application, datagram: Datagram) {
        self.kept.lock().push(datagram);
    }
}
