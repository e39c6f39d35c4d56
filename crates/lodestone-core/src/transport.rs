//! Datagram transport abstraction.
//!
//! The protocol core only needs `send`/`recv` over an unreliable
//! datagram carrier; tests substitute in-memory channels for the real
//! UDP socket.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// An unreliable datagram transport.
#[async_trait]
pub trait PacketTransport: Send + Sync {
    /// Send one datagram to `dest`.
    async fn send_to(&self, data: &[u8], dest: SocketAddr) -> io::Result<()>;

    /// Receive one datagram, returning its length and source.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// The locally bound address.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Tokio UDP transport.
#[derive(Clone)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind a UDP socket with enlarged buffers for bursty discovery
    /// traffic.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if socket setup or binding
    /// fails.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let domain = if addr.is_ipv4() {
            socket2::Domain::IPV4
        } else {
            socket2::Domain::IPV6
        };

        let socket = socket2::Socket::new(
            domain,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )?;
        socket.set_recv_buffer_size(1024 * 1024)?;
        socket.set_send_buffer_size(1024 * 1024)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }
}

#[async_trait]
impl PacketTransport for UdpTransport {
    async fn send_to(&self, data: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.socket.send_to(data, dest).await?;
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_roundtrip() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        a.send_to(b"hello", b.local_addr().unwrap()).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"hello");
        assert_eq!(from, a.local_addr().unwrap());
    }
}
