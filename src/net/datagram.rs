//! Connectionless transports: UDP and Unix datagram sockets behind one type.

use std::io;
use std::net::SocketAddr;

use tokio::net::{UdpSocket, UnixDatagram};

use crate::net::stream::PeerAddr;

/// Largest payload a single receive can return.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

/// A bound datagram socket of either family.
#[derive(Debug)]
pub enum DatagramSocket {
    Udp(UdpSocket),
    Unix(UnixDatagram),
}

impl DatagramSocket {
    /// Receive one datagram. Cancel safe.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, PeerAddr)> {
        match self {
            DatagramSocket::Udp(s) => {
                let (n, addr) = s.recv_from(buf).await?;
                Ok((n, PeerAddr::Inet(addr)))
            }
            DatagramSocket::Unix(s) => {
                let (n, addr) = s.recv_from(buf).await?;
                Ok((n, PeerAddr::from_unix(&addr)))
            }
        }
    }

    /// Send one datagram to `peer`. The peer must be of the socket's family
    /// and, for Unix sockets, bound to a path.
    pub async fn send_to(&self, buf: &[u8], peer: &PeerAddr) -> io::Result<usize> {
        match (self, peer) {
            (DatagramSocket::Udp(s), PeerAddr::Inet(addr)) => s.send_to(buf, addr).await,
            (DatagramSocket::Unix(s), PeerAddr::Unix(Some(path))) => s.send_to(buf, path).await,
            (DatagramSocket::Unix(_), PeerAddr::Unix(None)) => Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "peer socket is unnamed",
            )),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "peer address family does not match socket",
            )),
        }
    }

    pub fn local_inet_addr(&self) -> Option<SocketAddr> {
        match self {
            DatagramSocket::Udp(s) => s.local_addr().ok(),
            DatagramSocket::Unix(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn udp_send_and_receive() {
        let server = DatagramSocket::Udp(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = server.local_inet_addr().unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"hello", addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, peer) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(peer, PeerAddr::Inet(client.local_addr().unwrap()));

        server.send_to(b"world", &peer).await.unwrap();
        let n = client.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"world");
    }

    #[tokio::test]
    async fn family_mismatch_is_rejected() {
        let server = DatagramSocket::Udp(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let err = server
            .send_to(b"x", &PeerAddr::Unix(Some("/tmp/nowhere".into())))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
