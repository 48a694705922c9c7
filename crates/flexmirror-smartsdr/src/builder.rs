//! MirrorBuilder -- fluent builder for connecting a [`MirrorClient`].
//!
//! Separates configuration from construction so callers can set network
//! parameters, retry bounds and channel sizes before the TCP connection is
//! made.
//!
//! # Example
//!
//! ```no_run
//! use flexmirror_smartsdr::MirrorBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> flexmirror_core::Result<()> {
//! let client = MirrorBuilder::new()
//!     .host("192.168.1.100")
//!     .sample_period(Duration::from_millis(500))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use flexmirror_core::{Error, Result};
use flexmirror_transport::RetryPolicy;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::client::{ClientOptions, MirrorClient};

/// Pre-connected async streams for building a [`MirrorClient`] without a
/// real TCP connection, for example from [`tokio::io::duplex()`] in tests.
///
/// No UDP socket is bound in this mode.
pub struct MirrorTransports {
    /// Read half of the command channel (wrapped in a `BufReader`).
    pub tcp_read: Box<dyn AsyncRead + Unpin + Send + 'static>,
    /// Write half of the command channel.
    pub tcp_write: Box<dyn AsyncWrite + Unpin + Send + 'static>,
}

/// Fluent builder for [`MirrorClient`].
pub struct MirrorBuilder {
    host: Option<String>,
    options: ClientOptions,
}

impl MirrorBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        MirrorBuilder {
            host: None,
            options: ClientOptions::default(),
        }
    }

    /// Set the radio's IP address or hostname.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Set the SmartSDR TCP command port (default: 4992).
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.options.tcp_port = port;
        self
    }

    /// Set the first local UDP port to try (default: 4991).
    ///
    /// `0` binds an ephemeral port.
    pub fn udp_port(mut self, port: u16) -> Self {
        self.options.udp_port = port;
        self
    }

    /// Set the highest local UDP port to try (default: 5010).
    pub fn udp_port_max(mut self, port: u16) -> Self {
        self.options.udp_port_max = port;
        self
    }

    /// Set the number of TCP connect attempts (default: 3).
    pub fn connect_attempts(mut self, attempts: u32) -> Self {
        self.options.retry.attempts = attempts;
        self
    }

    /// Set the pause between connect attempts (default: 500ms).
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.options.retry.delay = delay;
        self
    }

    /// Set the per-attempt connect timeout (default: 5s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.retry.timeout = timeout;
        self
    }

    /// Replace the whole retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.options.retry = policy;
        self
    }

    /// Set the handshake timeout (default: 5s).
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.options.handshake_timeout = timeout;
        self
    }

    /// Set the client program name (default: "flexmirror").
    pub fn client_name(mut self, name: &str) -> Self {
        self.options.client_name = name.to_string();
        self
    }

    /// Replace the subscription list sent after the handshake.
    pub fn subscriptions<I, S>(mut self, objects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.subscriptions = objects.into_iter().map(Into::into).collect();
        self
    }

    /// Set the throughput sampling period (default: 1s).
    pub fn sample_period(mut self, period: Duration) -> Self {
        self.options.sample_period = period;
        self
    }

    /// Set the event and frame channel capacity (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.options.event_capacity = capacity;
        self
    }

    /// The options this builder would connect with.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Connect to the radio.
    ///
    /// Requires that [`host()`](Self::host) has been called.
    pub async fn build(self) -> Result<MirrorClient> {
        let options = self.validated()?;
        let host = self.host.ok_or_else(|| {
            Error::InvalidParameter("host is required: call .host() before .build()".into())
        })?;
        MirrorClient::connect(ClientOptions { host, ..options }).await
    }

    /// Build a client over pre-connected streams.
    ///
    /// The handshake is read from `tcp_read`; the host is not used.
    pub async fn build_with_transport(self, transport: MirrorTransports) -> Result<MirrorClient> {
        let options = self.validated()?;
        MirrorClient::from_streams(transport.tcp_read, transport.tcp_write, options).await
    }

    fn validated(&self) -> Result<ClientOptions> {
        if self.options.sample_period.is_zero() {
            return Err(Error::InvalidParameter(
                "sample period must be non-zero".into(),
            ));
        }
        if self.options.event_capacity == 0 {
            return Err(Error::InvalidParameter(
                "event capacity must be non-zero".into(),
            ));
        }
        if self.options.udp_port > self.options.udp_port_max {
            return Err(Error::InvalidParameter(format!(
                "UDP port {} is above the maximum {}",
                self.options.udp_port, self.options.udp_port_max
            )));
        }
        Ok(self.options.clone())
    }
}

impl Default for MirrorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DEFAULT_SUBSCRIPTIONS;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn builder_defaults() {
        let builder = MirrorBuilder::new();
        let options = builder.options();
        assert!(builder.host.is_none());
        assert_eq!(options.tcp_port, 4992);
        assert_eq!(options.udp_port, 4991);
        assert_eq!(options.udp_port_max, 5010);
        assert_eq!(options.retry.attempts, 3);
        assert_eq!(options.client_name, "flexmirror");
        assert_eq!(options.sample_period, Duration::from_secs(1));
        assert_eq!(options.event_capacity, 256);
        assert_eq!(options.subscriptions.len(), DEFAULT_SUBSCRIPTIONS.len());
        assert_eq!(options.subscriptions[3], "memories all");
    }

    #[test]
    fn builder_custom_settings() {
        let builder = MirrorBuilder::new()
            .host("10.0.0.42")
            .tcp_port(5000)
            .udp_port(6000)
            .udp_port_max(6005)
            .connect_attempts(5)
            .retry_delay(Duration::from_millis(50))
            .client_name("contest-logger")
            .subscriptions(["slice all", "pan all"])
            .sample_period(Duration::from_millis(250))
            .event_capacity(64);

        assert_eq!(builder.host.as_deref(), Some("10.0.0.42"));
        let options = builder.options();
        assert_eq!(options.tcp_port, 5000);
        assert_eq!((options.udp_port, options.udp_port_max), (6000, 6005));
        assert_eq!(options.retry.attempts, 5);
        assert_eq!(options.retry.delay, Duration::from_millis(50));
        assert_eq!(options.client_name, "contest-logger");
        assert_eq!(options.subscriptions, vec!["slice all", "pan all"]);
        assert_eq!(options.sample_period, Duration::from_millis(250));
        assert_eq!(options.event_capacity, 64);
    }

    #[tokio::test]
    async fn builder_requires_host() {
        match MirrorBuilder::new().build().await {
            Err(Error::InvalidParameter(msg)) => assert!(msg.contains("host"), "{msg}"),
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn builder_rejects_bad_settings() {
        let result = MirrorBuilder::new()
            .host("127.0.0.1")
            .sample_period(Duration::ZERO)
            .build()
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));

        let result = MirrorBuilder::new()
            .host("127.0.0.1")
            .udp_port(5020)
            .udp_port_max(5010)
            .build()
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn build_with_transport_runs_handshake() {
        let (client_io, mut radio_io) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(client_io);
        radio_io.write_all(b"V1.4.0.0\nH00000042\n").await.unwrap();

        let client = MirrorBuilder::new()
            .subscriptions(Vec::<String>::new())
            .build_with_transport(MirrorTransports {
                tcp_read: Box::new(read),
                tcp_write: Box::new(write),
            })
            .await
            .unwrap();
        assert_eq!(client.client_handle(), 0x42);
        assert_eq!(client.version().minor, 4);
        client.disconnect().await.unwrap();
    }
}
