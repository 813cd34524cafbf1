//! UDP transport for radio sessions.
//!
//! Each radio channel (control, serial, audio) is a separate UDP port on
//! the radio, and each session owns one [`UdpTransport`]. The socket is
//! bound to an ephemeral local port and then connected to the radio's
//! address, so sends need no address and stray datagrams from other
//! hosts are filtered by the kernel.
//!
//! # Example
//!
//! ```no_run
//! use icomnet_core::transport::DatagramTransport;
//! use icomnet_transport::UdpTransport;
//!
//! # async fn example() -> icomnet_core::Result<()> {
//! let remote = UdpTransport::resolve("192.168.1.50", 50001).await?;
//! let transport = UdpTransport::bind("0.0.0.0:0").await?;
//! transport.connect(remote).await?;
//! transport.send(&[0x10, 0, 0, 0, 0x03, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).await?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use icomnet_core::error::{Error, Result};
use icomnet_core::transport::DatagramTransport;
use tokio::net::UdpSocket;

/// UDP socket wrapper with error mapping and tracing.
#[derive(Debug)]
pub struct UdpTransport {
    /// The underlying UDP socket.
    socket: UdpSocket,
    /// The local address the socket is bound to.
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local address such as `"0.0.0.0:0"`.
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "failed to bind UDP socket");
            Error::Io(e)
        })?;

        let local_addr = socket.local_addr().map_err(|e| {
            tracing::error!(error = %e, "failed to get local address");
            Error::Io(e)
        })?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self { socket, local_addr })
    }

    /// Resolve `host:port` to the first IPv4 socket address.
    pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
            tracing::error!(host = %host, port, error = %e, "address lookup failed");
            Error::Transport(format!("cannot resolve {host}: {e}"))
        })?;
        addrs
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| Error::Transport(format!("no IPv4 address for {host}")))
    }

    /// Bind to `bind_addr` and connect to `remote`.
    pub async fn open(bind_addr: &str, remote: SocketAddr) -> Result<Self> {
        let transport = Self::bind(bind_addr).await?;
        transport.connect(remote).await?;
        Ok(transport)
    }

    /// The local address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connect this socket to a remote address.
    ///
    /// UDP "connect" performs no handshake. It sets the default
    /// destination and filters incoming datagrams to that source.
    pub async fn connect(&self, addr: SocketAddr) -> Result<()> {
        tracing::debug!(local = %self.local_addr, remote = %addr, "connecting UDP socket");

        self.socket.connect(addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "failed to connect UDP socket"
            );
            Error::Io(e)
        })
    }

    /// Send a datagram to the specified address.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "sending datagram"
        );

        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "failed to send datagram"
            );
            Error::Io(e)
        })?;
        Ok(())
    }

    /// Receive a datagram with timeout. Returns `(bytes_read, source_addr)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no datagram arrives within `timeout`.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<(usize, SocketAddr)> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((n, src))) => {
                tracing::trace!(local = %self.local_addr, remote = %src, bytes = n, "received datagram");
                Ok((n, src))
            }
            Ok(Err(e)) => {
                tracing::error!(local = %self.local_addr, error = %e, "failed to receive datagram");
                Err(Error::Io(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[async_trait]
impl DatagramTransport for UdpTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        tracing::trace!(local = %self.local_addr, bytes = data.len(), "sending datagram");

        self.socket.send(data).await.map_err(|e| {
            tracing::error!(local = %self.local_addr, error = %e, "failed to send datagram");
            Error::Io(e)
        })?;
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let n = self.socket.recv(buf).await.map_err(|e| {
            tracing::error!(local = %self.local_addr, error = %e, "failed to receive datagram");
            Error::Io(e)
        })?;
        tracing::trace!(local = %self.local_addr, bytes = n, "received datagram");
        Ok(n)
    }

    fn local_port(&self) -> u16 {
        self.local_addr.port()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_and_local_addr() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr();

        assert_eq!(addr.ip(), std::net::Ipv4Addr::LOCALHOST);
        assert_ne!(addr.port(), 0, "OS should assign a nonzero port");
        assert_eq!(transport.local_port(), addr.port());
    }

    #[tokio::test]
    async fn connected_send_recv() {
        let radio = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let client = UdpTransport::open("127.0.0.1:0", radio.local_addr())
            .await
            .unwrap();

        client.send(b"syn").await.unwrap();
        let mut buf = [0u8; 64];
        let (n, src) = radio
            .recv_from(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"syn");
        assert_eq!(src, client.local_addr());

        radio.send_to(b"syn-ack", src).await.unwrap();
        let n = tokio::time::timeout(Duration::from_secs(2), client.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"syn-ack");
    }

    #[tokio::test]
    async fn connected_socket_filters_other_sources() {
        let radio = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let stranger = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let client = UdpTransport::open("127.0.0.1:0", radio.local_addr())
            .await
            .unwrap();

        stranger.send_to(b"noise", client.local_addr()).await.unwrap();
        radio.send_to(b"ready", client.local_addr()).await.unwrap();

        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(2), client.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"ready");
    }

    #[tokio::test]
    async fn recv_timeout() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 16];
        let result = transport
            .recv_from(&mut buf, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(Error::Timeout)), "got {result:?}");
    }

    #[tokio::test]
    async fn resolve_localhost() {
        let addr = UdpTransport::resolve("127.0.0.1", 50001).await.unwrap();
        assert_eq!(addr, "127.0.0.1:50001".parse::<SocketAddr>().unwrap());
    }

    #[tokio::test]
    async fn bind_bad_address_fails() {
        assert!(UdpTransport::bind("not-an-address").await.is_err());
    }
}
