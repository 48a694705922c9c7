//! UDP socket for VITA-49 stream traffic.
//!
//! The radio sends every stream to the single UDP port the client announces
//! with `client udpport`. When the preferred port is busy (another client on
//! the same host, a stale process) the next port up is tried, up to a fixed
//! ceiling.
//!
//! # Example
//!
//! ```no_run
//! use flexmirror_transport::UdpTransport;
//!
//! # async fn example() -> flexmirror_core::Result<()> {
//! let transport = UdpTransport::bind_in_range("0.0.0.0", 4991, 5010).await?;
//! println!("streams will arrive on port {}", transport.port());
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use flexmirror_core::error::{Error, Result};
use tokio::net::UdpSocket;

/// UDP transport for datagram stream traffic.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local `host:port` address.
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::debug!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;

        let local_addr = socket.local_addr().map_err(|e| {
            tracing::error!(error = %e, "Failed to get local address");
            Error::Io(e)
        })?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self { socket, local_addr })
    }

    /// Bind to the first free port in `first_port..=last_port` on `host`.
    ///
    /// Returns [`Error::Transport`] naming the range when every port fails.
    pub async fn bind_in_range(host: &str, first_port: u16, last_port: u16) -> Result<Self> {
        if first_port > last_port {
            return Err(Error::InvalidParameter(format!(
                "empty UDP port range {}..={}",
                first_port, last_port
            )));
        }

        for port in first_port..=last_port {
            match Self::bind(&format!("{}:{}", host, port)).await {
                Ok(transport) => {
                    if port != first_port {
                        tracing::info!(
                            port,
                            preferred = first_port,
                            "Preferred UDP port busy, bound to fallback"
                        );
                    }
                    return Ok(transport);
                }
                Err(e) => {
                    tracing::debug!(port, error = %e, "UDP port unavailable, trying next");
                }
            }
        }

        tracing::error!(first_port, last_port, "No free UDP port in range");
        Err(Error::Transport(format!(
            "unable to bind a UDP port in {}..={}",
            first_port, last_port
        )))
    }

    /// The local address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The local port this socket is bound to.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Send one datagram to `addr`.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "Sending datagram"
        );

        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;

        Ok(())
    }

    /// Wait for the next datagram. Returns the number of bytes read.
    ///
    /// Bytes beyond `buf.len()` are discarded, as usual for UDP.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.socket.recv(buf).await.map_err(Error::Io)
    }

    /// Receive a datagram with a timeout. Returns `(bytes_read, source_addr)`.
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
                tracing::trace!(local = %self.local_addr, remote = %src, bytes = n, "Received datagram");
                Ok((n, src))
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_ephemeral_port() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        assert_ne!(transport.port(), 0);
    }

    #[tokio::test]
    async fn bind_in_range_skips_busy_port() {
        // Occupy some port, then ask for a range starting at it.
        let holder = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let busy = holder.port();
        if busy == u16::MAX {
            return;
        }

        let transport = UdpTransport::bind_in_range("127.0.0.1", busy, busy.saturating_add(20))
            .await
            .unwrap();
        assert!(transport.port() > busy);
    }

    #[tokio::test]
    async fn bind_in_range_fails_when_exhausted() {
        let holder = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let busy = holder.port();

        let err = UdpTransport::bind_in_range("127.0.0.1", busy, busy)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn bind_in_range_rejects_empty_range() {
        let err = UdpTransport::bind_in_range("127.0.0.1", 5000, 4000)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn send_and_receive_datagram() {
        let a = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let b = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        a.send_to(b"vita", b.local_addr()).await.unwrap();

        let mut buf = [0u8; 64];
        let (n, src) = b.recv_from(&mut buf, Duration::from_secs(2)).await.unwrap();
        assert_eq!(&buf[..n], b"vita");
        assert_eq!(src, a.local_addr());
    }

    #[tokio::test]
    async fn recv_from_times_out() {
        let a = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 64];
        let err = a
            .recv_from(&mut buf, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }
}
