//! Sites: one binding strategy per (transport style x address source).
//!
//! # Responsibilities
//! - Describe where to bind (host/port, filesystem path, or a supplied socket)
//! - Open exactly one transport on `start` and hand it to the runner's server
//! - Close it on `stop`, honouring the grace period
//!
//! # State Machine
//! ```text
//! Unbound → Starting → Started → Stopping → Stopped
//!              ↓
//!            Failed
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::schema::SiteConfig;
use crate::config::validation::validate_site;
use crate::error::{Error, Result};
use crate::net::bind::{self, ReuseOptions};
use crate::net::datagram::DatagramSocket;
use crate::net::stream::Listener;
use crate::observability::metrics;
use crate::runner::app_runner::{Runner, RunnerInner};
use crate::runner::server::{Server, ServerHandle};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

static SITE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Connection-oriented or connectionless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stream,
    Datagram,
}

impl TransportKind {
    /// Scheme used in site names.
    pub fn scheme(self) -> &'static str {
        match self {
            TransportKind::Stream => "tcp",
            TransportKind::Datagram => "udp",
        }
    }
}

/// The concrete binding strategy of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKind {
    Tcp,
    Unix,
    Sock,
    Udp,
    DatagramUnix,
    DatagramSock,
}

impl SiteKind {
    pub const fn transport(self) -> TransportKind {
        match self {
            SiteKind::Tcp | SiteKind::Unix | SiteKind::Sock => TransportKind::Stream,
            SiteKind::Udp | SiteKind::DatagramUnix | SiteKind::DatagramSock => {
                TransportKind::Datagram
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteState {
    Unbound,
    Starting,
    Started,
    Stopping,
    Stopped,
    /// `start` failed. Terminal; the site is never retried.
    Failed,
}

/// An already-bound, listening stream socket supplied by the caller.
#[derive(Debug)]
pub enum StdListener {
    Tcp(std::net::TcpListener),
    Unix(std::os::unix::net::UnixListener),
}

impl From<std::net::TcpListener> for StdListener {
    fn from(l: std::net::TcpListener) -> Self {
        StdListener::Tcp(l)
    }
}

impl From<std::os::unix::net::UnixListener> for StdListener {
    fn from(l: std::os::unix::net::UnixListener) -> Self {
        StdListener::Unix(l)
    }
}

/// An already-bound datagram socket supplied by the caller.
#[derive(Debug)]
pub enum StdDatagram {
    Udp(std::net::UdpSocket),
    Unix(std::os::unix::net::UnixDatagram),
}

impl From<std::net::UdpSocket> for StdDatagram {
    fn from(s: std::net::UdpSocket) -> Self {
        StdDatagram::Udp(s)
    }
}

impl From<std::os::unix::net::UnixDatagram> for StdDatagram {
    fn from(s: std::os::unix::net::UnixDatagram) -> Self {
        StdDatagram::Unix(s)
    }
}

#[derive(Debug)]
enum Binding {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
    Sock(Option<StdListener>),
    Udp { host: String, port: u16 },
    DatagramUnix(PathBuf),
    DatagramSock(Option<StdDatagram>),
}

impl Binding {
    fn kind(&self) -> SiteKind {
        match self {
            Binding::Tcp { .. } => SiteKind::Tcp,
            Binding::Unix(_) => SiteKind::Unix,
            Binding::Sock(_) => SiteKind::Sock,
            Binding::Udp { .. } => SiteKind::Udp,
            Binding::DatagramUnix(_) => SiteKind::DatagramUnix,
            Binding::DatagramSock(_) => SiteKind::DatagramSock,
        }
    }
}

/// A binding descriptor over a [`Runner`].
///
/// The site holds only a weak back-reference to its runner. Start it after
/// `Runner::setup` and stop it before `Runner::cleanup`. Dropping a started
/// site closes its transport without a grace period.
#[derive(Debug)]
pub struct Site {
    id: u64,
    runner: Weak<RunnerInner>,
    binding: Binding,
    reuse: ReuseOptions,
    shutdown_timeout: Duration,
    name: String,
    state: SiteState,
    server: Option<ServerHandle>,
    local_addr: Option<SocketAddr>,
    /// Socket file created by this site, unlinked again on stop.
    bound_path: Option<PathBuf>,
}

impl Site {
    fn new(runner: &Runner, binding: Binding, name: String) -> Self {
        Self {
            id: SITE_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            runner: runner.downgrade(),
            binding,
            reuse: ReuseOptions::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            name,
            state: SiteState::Unbound,
            server: None,
            local_addr: None,
            bound_path: None,
        }
    }

    /// Stream site on `host:port`.
    pub fn tcp(runner: &Runner, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let name = inet_name(TransportKind::Stream, &host, port);
        Self::new(runner, Binding::Tcp { host, port }, name)
    }

    /// Stream site on a Unix-domain path.
    pub fn unix(runner: &Runner, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = unix_name(TransportKind::Stream, Some(&path));
        Self::new(runner, Binding::Unix(path), name)
    }

    /// Stream site over a listening socket supplied by the caller.
    pub fn sock(runner: &Runner, listener: impl Into<StdListener>) -> Result<Self> {
        let listener = listener.into();
        let name = match &listener {
            StdListener::Tcp(l) => {
                let addr = l.local_addr().map_err(unreadable_socket)?;
                format!("{}://{}", TransportKind::Stream.scheme(), addr)
            }
            StdListener::Unix(l) => {
                let addr = l.local_addr().map_err(unreadable_socket)?;
                unix_addr_name(TransportKind::Stream, &addr)
            }
        };
        Ok(Self::new(runner, Binding::Sock(Some(listener)), name))
    }

    /// Datagram site on `host:port`.
    pub fn udp(runner: &Runner, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let name = inet_name(TransportKind::Datagram, &host, port);
        Self::new(runner, Binding::Udp { host, port }, name)
    }

    /// Datagram site on a Unix-domain path. A stale socket file at the path is
    /// removed before binding.
    pub fn datagram_unix(runner: &Runner, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = unix_name(TransportKind::Datagram, Some(&path));
        Self::new(runner, Binding::DatagramUnix(path), name)
    }

    /// Datagram site over a bound socket supplied by the caller.
    pub fn datagram_sock(runner: &Runner, socket: impl Into<StdDatagram>) -> Result<Self> {
        let socket = socket.into();
        let name = match &socket {
            StdDatagram::Udp(s) => {
                let addr = s.local_addr().map_err(unreadable_socket)?;
                format!("{}://{}", TransportKind::Datagram.scheme(), addr)
            }
            StdDatagram::Unix(s) => {
                let addr = s.local_addr().map_err(unreadable_socket)?;
                unix_addr_name(TransportKind::Datagram, &addr)
            }
        };
        Ok(Self::new(runner, Binding::DatagramSock(Some(socket)), name))
    }

    /// Build a site from configuration, rejecting contradictory parameters.
    pub fn from_config(runner: &Runner, config: &SiteConfig) -> Result<Self> {
        let errors = validate_site(config);
        if !errors.is_empty() {
            let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(Error::Configuration(joined.join("; ")));
        }

        let mut site = match (&config.path, config.transport) {
            (Some(path), TransportKind::Stream) => Self::unix(runner, path),
            (Some(path), TransportKind::Datagram) => Self::datagram_unix(runner, path),
            (None, transport) => {
                let host = config.host.as_deref().unwrap_or(DEFAULT_HOST);
                let port = config.port.unwrap_or(DEFAULT_PORT);
                match transport {
                    TransportKind::Stream => Self::tcp(runner, host, port),
                    TransportKind::Datagram => Self::udp(runner, host, port),
                }
            }
        };
        site.reuse = ReuseOptions {
            address: config.reuse_address,
            port: config.reuse_port,
        };
        site.shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
        Ok(site)
    }

    /// Set SO_REUSEADDR. Only valid for TCP and UDP sites.
    pub fn with_reuse_address(mut self, enabled: bool) -> Self {
        self.reuse.address = Some(enabled);
        self
    }

    /// Set SO_REUSEPORT. Only valid for TCP and UDP sites.
    pub fn with_reuse_port(mut self, enabled: bool) -> Self {
        self.reuse.port = Some(enabled);
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Human-readable endpoint, e.g. `tcp://127.0.0.1:8080` or
    /// `udp://unix:/run/app.sock`. Once started, an ephemeral port shows the
    /// port actually bound.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SiteKind {
        self.binding.kind()
    }

    pub fn transport(&self) -> TransportKind {
        self.kind().transport()
    }

    pub fn state(&self) -> SiteState {
        self.state
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Bound IP address, for started TCP/UDP sites.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Connections or datagrams currently being handled.
    pub fn in_flight(&self) -> u64 {
        self.server.as_ref().map_or(0, ServerHandle::in_flight)
    }

    /// Open the transport and start feeding the runner's handler.
    ///
    /// May be called once. Any failure leaves the site in
    /// [`SiteState::Failed`]; nothing is retried.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SiteState::Unbound {
            return Err(Error::LifecycleOrder(format!(
                "{} cannot be started from state {:?}",
                self.name, self.state
            )));
        }

        let result = self.try_start().await;
        if let Err(e) = &result {
            self.state = SiteState::Failed;
            tracing::error!(site = %self.name, error = %e, "Site failed to start");
        }
        result
    }

    async fn try_start(&mut self) -> Result<()> {
        self.check_options()?;

        let runner = self.runner.upgrade().ok_or_else(|| {
            Error::LifecycleOrder(format!("{}: runner has been dropped", self.name))
        })?;
        let server = runner.claim_server(self.id, &self.name)?;

        self.state = SiteState::Starting;
        match self.open(&server).await {
            Ok(handle) => {
                self.server = Some(handle);
                self.state = SiteState::Started;
                runner.register_site(self.id, &self.name);
                metrics::site_started(self.transport());
                tracing::info!(site = %self.name, "Listening on {}", self.name);
                Ok(())
            }
            Err(e) => {
                runner.release_site(self.id);
                Err(e)
            }
        }
    }

    fn check_options(&self) -> Result<()> {
        let inet = matches!(self.binding, Binding::Tcp { .. } | Binding::Udp { .. });
        if self.reuse.is_set() && !inet {
            return Err(Error::Configuration(format!(
                "{}: reuse_address/reuse_port apply only to TCP and UDP sites",
                self.name
            )));
        }
        Ok(())
    }

    async fn open(&mut self, server: &Arc<Server>) -> Result<ServerHandle> {
        let name = self.name.clone();
        let bind_err = |e| Error::bind(name.as_str(), e);

        match &mut self.binding {
            Binding::Tcp { host, port } => {
                let addr = bind::resolve(host, *port).await.map_err(bind_err)?;
                let listener = bind::tcp_listener(addr, self.reuse).map_err(bind_err)?;
                let local = listener.local_addr().map_err(bind_err)?;
                self.name = inet_name(TransportKind::Stream, host, local.port());
                self.local_addr = Some(local);
                Ok(server.serve_stream(Listener::Tcp(listener), self.name.clone()))
            }
            Binding::Unix(path) => {
                bind::clean_stale_unix_listener(path).map_err(bind_err)?;
                let listener = bind::unix_listener(path).map_err(bind_err)?;
                self.bound_path = Some(path.clone());
                Ok(server.serve_stream(Listener::Unix(listener), name.clone()))
            }
            Binding::Sock(slot) => {
                let listener = match slot.take().ok_or_else(consumed)? {
                    StdListener::Tcp(l) => Listener::Tcp(bind::adopt_tcp(l).map_err(bind_err)?),
                    StdListener::Unix(l) => {
                        Listener::Unix(bind::adopt_unix_listener(l).map_err(bind_err)?)
                    }
                };
                self.local_addr = listener.local_inet_addr();
                Ok(server.serve_stream(listener, name.clone()))
            }
            Binding::Udp { host, port } => {
                let addr = bind::resolve(host, *port).await.map_err(bind_err)?;
                let socket = bind::udp_socket(addr, self.reuse).map_err(bind_err)?;
                let local = socket.local_addr().map_err(bind_err)?;
                self.name = inet_name(TransportKind::Datagram, host, local.port());
                self.local_addr = Some(local);
                Ok(server.serve_datagram(DatagramSocket::Udp(socket), self.name.clone()))
            }
            Binding::DatagramUnix(path) => {
                bind::clean_stale_unix_socket(path).map_err(bind_err)?;
                let socket = bind::unix_datagram(path).map_err(bind_err)?;
                self.bound_path = Some(path.clone());
                Ok(server.serve_datagram(DatagramSocket::Unix(socket), name.clone()))
            }
            Binding::DatagramSock(slot) => {
                let socket = match slot.take().ok_or_else(consumed)? {
                    StdDatagram::Udp(s) => DatagramSocket::Udp(bind::adopt_udp(s).map_err(bind_err)?),
                    StdDatagram::Unix(s) => {
                        DatagramSocket::Unix(bind::adopt_unix_datagram(s).map_err(bind_err)?)
                    }
                };
                self.local_addr = socket.local_inet_addr();
                Ok(server.serve_datagram(socket, name.clone()))
            }
        }
    }

    /// Stop with the configured grace period. No-op unless started.
    pub async fn stop(&mut self) {
        let grace = self.shutdown_timeout;
        self.stop_with_grace(grace).await;
    }

    /// Stop, allowing `grace` for in-flight work before it is aborted.
    /// No-op unless started.
    pub async fn stop_with_grace(&mut self, grace: Duration) {
        if self.state != SiteState::Started {
            return;
        }

        self.state = SiteState::Stopping;
        if let Some(mut handle) = self.server.take() {
            handle.close(grace);
            handle.wait_closed().await;
        }
        if let Some(path) = self.bound_path.take() {
            bind::remove_socket_file(&path);
        }
        self.state = SiteState::Stopped;

        if let Some(runner) = self.runner.upgrade() {
            runner.release_site(self.id);
        }
        metrics::site_stopped(self.transport());
        tracing::info!(site = %self.name, "Site stopped");
    }
}

impl Drop for Site {
    fn drop(&mut self) {
        if self.state == SiteState::Started {
            if let Some(runner) = self.runner.upgrade() {
                runner.release_site(self.id);
            }
            if let Some(path) = self.bound_path.take() {
                bind::remove_socket_file(&path);
            }
            metrics::site_stopped(self.transport());
        }
    }
}

fn inet_name(transport: TransportKind, host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("{}://[{}]:{}", transport.scheme(), host, port)
    } else {
        format!("{}://{}:{}", transport.scheme(), host, port)
    }
}

fn unix_name(transport: TransportKind, path: Option<&Path>) -> String {
    let shown = match path {
        Some(p) if bind::is_abstract(p) => {
            use std::os::unix::ffi::OsStrExt;
            format!("@{}", String::from_utf8_lossy(&p.as_os_str().as_bytes()[1..]))
        }
        Some(p) => p.display().to_string(),
        None => "<unnamed>".to_string(),
    };
    format!("{}://unix:{}", transport.scheme(), shown)
}

/// Name for a supplied Unix socket, including abstract-namespace addresses.
fn unix_addr_name(transport: TransportKind, addr: &std::os::unix::net::SocketAddr) -> String {
    #[cfg(target_os = "linux")]
    {
        use std::os::linux::net::SocketAddrExt;
        if let Some(name) = addr.as_abstract_name() {
            return format!("{}://unix:@{}", transport.scheme(), String::from_utf8_lossy(name));
        }
    }
    unix_name(transport, addr.as_pathname())
}

fn unreadable_socket(e: std::io::Error) -> Error {
    Error::Configuration(format!("cannot read address of supplied socket: {e}"))
}

fn consumed() -> Error {
    Error::LifecycleOrder("supplied socket was already consumed".to_string())
}
