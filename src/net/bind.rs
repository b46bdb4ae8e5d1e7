//! Socket creation for every site variant.
//!
//! # Responsibilities
//! - Resolve `host:port` and apply SO_REUSEADDR / SO_REUSEPORT before bind
//! - Bind Unix-domain paths, including Linux abstract-namespace names
//! - Check and remove stale socket files, and unlink our own on stop
//! - Adopt externally supplied sockets into the runtime

use std::io;
use std::net::SocketAddr;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, UdpSocket, UnixDatagram, UnixListener};

/// Pending-connection queue length for stream listeners.
const BACKLOG: i32 = 1024;

/// Socket reuse flags. `None` keeps the transport's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReuseOptions {
    pub address: Option<bool>,
    pub port: Option<bool>,
}

impl ReuseOptions {
    pub fn is_set(&self) -> bool {
        self.address.is_some() || self.port.is_some()
    }
}

/// Outcome of checking a Unix socket path before bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleSocket {
    /// Abstract-namespace name, nothing on disk to check.
    Abstract,
    /// Nothing exists at the path.
    Absent,
    /// A socket special file was found and removed.
    Removed,
    /// Something other than a socket exists; left untouched.
    NotASocket,
    /// A listener still accepts on the socket; left untouched.
    InUse,
    /// The path could not be inspected; bind will report the real problem.
    Unchecked,
}

/// Whether `path` names a socket in the Linux abstract namespace.
pub fn is_abstract(path: &Path) -> bool {
    path.as_os_str().as_bytes().first() == Some(&0)
}

/// Resolve `host:port`, taking the first address returned.
pub async fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("{host} did not resolve to any address"),
            )
        })
}

/// Bind a TCP listener. Address reuse defaults to on, port reuse to off.
pub fn tcp_listener(addr: SocketAddr, reuse: ReuseOptions) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(reuse.address.unwrap_or(true))?;
    if reuse.port == Some(true) {
        socket.set_reuse_port(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    TcpListener::from_std(socket.into())
}

/// Bind a UDP socket. Both reuse flags default to off.
pub fn udp_socket(addr: SocketAddr, reuse: ReuseOptions) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if reuse.address == Some(true) {
        socket.set_reuse_address(true)?;
    }
    if reuse.port == Some(true) {
        socket.set_reuse_port(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    UdpSocket::from_std(socket.into())
}

/// Bind a Unix stream listener. Callers run [`clean_stale_unix_listener`] first.
pub fn unix_listener(path: &Path) -> io::Result<UnixListener> {
    if is_abstract(path) {
        let addr = abstract_addr(path)?;
        let std = std::os::unix::net::UnixListener::bind_addr(&addr)?;
        std.set_nonblocking(true)?;
        return UnixListener::from_std(std);
    }
    UnixListener::bind(path)
}

/// Bind a Unix datagram socket. Callers run [`clean_stale_unix_socket`] first.
pub fn unix_datagram(path: &Path) -> io::Result<UnixDatagram> {
    if is_abstract(path) {
        let addr = abstract_addr(path)?;
        let std = std::os::unix::net::UnixDatagram::bind_addr(&addr)?;
        std.set_nonblocking(true)?;
        return UnixDatagram::from_std(std);
    }
    UnixDatagram::bind(path)
}

#[cfg(target_os = "linux")]
fn abstract_addr(path: &Path) -> io::Result<std::os::unix::net::SocketAddr> {
    use std::os::linux::net::SocketAddrExt;
    std::os::unix::net::SocketAddr::from_abstract_name(&path.as_os_str().as_bytes()[1..])
}

#[cfg(not(target_os = "linux"))]
fn abstract_addr(_path: &Path) -> io::Result<std::os::unix::net::SocketAddr> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract unix socket names are only supported on Linux",
    ))
}

/// Remove a leftover datagram socket file at `path` so it can be bound again.
///
/// Abstract names are never inspected. A non-socket file is left in place and
/// the subsequent bind reports the collision. A failure to inspect the path is
/// logged and deferred to bind. A failure to remove a socket that was found is
/// returned, since bind would only report a less specific `AddrInUse`.
pub fn clean_stale_unix_socket(path: &Path) -> io::Result<StaleSocket> {
    match inspect_socket_file(path) {
        SocketFile::Socket => remove_stale(path),
        SocketFile::Skip(outcome) => Ok(outcome),
    }
}

/// Remove a leftover stream socket file at `path` unless a listener still
/// accepts on it.
///
/// A socket that refuses connections is stale and removed. A socket that
/// accepts is reported as [`StaleSocket::InUse`] and left for bind to reject.
/// Any other connect failure leaves the file alone.
pub fn clean_stale_unix_listener(path: &Path) -> io::Result<StaleSocket> {
    if let SocketFile::Skip(outcome) = inspect_socket_file(path) {
        return Ok(outcome);
    }

    match std::os::unix::net::UnixStream::connect(path) {
        Ok(_) => Ok(StaleSocket::InUse),
        Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => remove_stale(path),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Unable to check UNIX socket");
            Ok(StaleSocket::Unchecked)
        }
    }
}

/// Unlink a socket file this process bound. Abstract names have nothing on disk.
pub fn remove_socket_file(path: &Path) {
    if is_abstract(path) {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed UNIX socket"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unable to remove UNIX socket")
        }
    }
}

/// What a socket path holds before bind.
enum SocketFile {
    /// Nothing to remove; carries the outcome to report.
    Skip(StaleSocket),
    /// A socket special file exists at the path.
    Socket,
}

fn inspect_socket_file(path: &Path) -> SocketFile {
    if is_abstract(path) {
        return SocketFile::Skip(StaleSocket::Abstract);
    }

    match std::fs::metadata(path) {
        Ok(m) if m.file_type().is_socket() => SocketFile::Socket,
        Ok(_) => SocketFile::Skip(StaleSocket::NotASocket),
        Err(e) if e.kind() == io::ErrorKind::NotFound => SocketFile::Skip(StaleSocket::Absent),
        Err(e) => {
            // Directory may only allow creating the socket.
            tracing::error!(path = %path.display(), error = %e, "Unable to check stale UNIX socket");
            SocketFile::Skip(StaleSocket::Unchecked)
        }
    }
}

fn remove_stale(path: &Path) -> io::Result<StaleSocket> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed stale UNIX socket");
            Ok(StaleSocket::Removed)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StaleSocket::Absent),
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Unable to remove stale UNIX socket");
            Err(e)
        }
    }
}

/// Adopt an already-listening TCP socket.
pub fn adopt_tcp(listener: std::net::TcpListener) -> io::Result<TcpListener> {
    listener.set_nonblocking(true)?;
    TcpListener::from_std(listener)
}

pub fn adopt_unix_listener(listener: std::os::unix::net::UnixListener) -> io::Result<UnixListener> {
    listener.set_nonblocking(true)?;
    UnixListener::from_std(listener)
}

pub fn adopt_udp(socket: std::net::UdpSocket) -> io::Result<UdpSocket> {
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket)
}

pub fn adopt_unix_datagram(socket: std::os::unix::net::UnixDatagram) -> io::Result<UnixDatagram> {
    socket.set_nonblocking(true)?;
    UnixDatagram::from_std(socket)
}
