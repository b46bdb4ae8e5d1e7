//! The consumer side of a site: what the runner hands accepted connections
//! and received datagrams to.

use std::io;
use std::sync::Weak;

use async_trait::async_trait;
use bytes::Bytes;

use crate::app::Application;
use crate::net::connection::ConnectionId;
use crate::net::datagram::DatagramSocket;
use crate::net::stream::{PeerAddr, Stream};

/// Application-level consumer of connections and datagrams.
///
/// One handler value is shared by every site of a runner. Each call runs in
/// its own task; calls for different connections or datagrams are not
/// ordered relative to each other. A site aborts calls still running when its
/// grace period expires.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Serve one accepted stream connection. The connection closes when it is dropped.
    async fn on_connection(&self, app: &Application, conn: Connection) {
        let _ = app;
        tracing::debug!(peer = %conn.peer(), "No stream consumer; closing connection");
    }

    /// Handle one received datagram.
    async fn on_datagram(&self, app: &Application, datagram: Datagram) {
        let _ = app;
        tracing::debug!(
            peer = %datagram.peer(),
            len = datagram.data().len(),
            "No datagram consumer; dropping datagram"
        );
    }
}

/// An accepted connection together with its identity.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: PeerAddr,
    stream: Stream,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, peer: PeerAddr, stream: Stream) -> Self {
        Self { id, peer, stream }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    pub fn stream(&mut self) -> &mut Stream {
        &mut self.stream
    }

    pub fn into_stream(self) -> Stream {
        self.stream
    }
}

/// One received datagram plus the means to answer it.
///
/// Only the site's receive loop owns the socket, so keeping a datagram
/// around never keeps the address bound after the site stops.
#[derive(Debug, Clone)]
pub struct Datagram {
    id: ConnectionId,
    data: Bytes,
    peer: PeerAddr,
    socket: Weak<DatagramSocket>,
}

impl Datagram {
    pub(crate) fn new(
        id: ConnectionId,
        data: Bytes,
        peer: PeerAddr,
        socket: Weak<DatagramSocket>,
    ) -> Self {
        Self {
            id,
            data,
            peer,
            socket,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Send `payload` back to the sender through the receiving socket.
    ///
    /// Fails with [`io::ErrorKind::NotConnected`] once the site has closed
    /// its transport.
    pub async fn reply(&self, payload: &[u8]) -> io::Result<usize> {
        let socket = self.socket.upgrade().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "datagram site is closed")
        })?;
        socket.send_to(payload, &self.peer).await
    }
}
