//! TCP connect with a fixed number of attempts.
//!
//! # Example
//!
//! ```no_run
//! use flexmirror_transport::{RetryPolicy, connect_with_retry};
//!
//! # async fn example() -> flexmirror_core::Result<()> {
//! let stream = connect_with_retry("192.168.1.100:4992", &RetryPolicy::default()).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use flexmirror_core::error::{Error, Result};
use tokio::net::TcpStream;

/// Default per-attempt connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounds on how hard setup tries before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Pause between a failed attempt and the next one.
    pub delay: Duration,
    /// Upper bound on a single connect attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Connect to `addr`, retrying up to `policy.attempts` times.
///
/// The error of the last attempt is returned once the attempts are used up.
pub async fn connect_with_retry(addr: &str, policy: &RetryPolicy) -> Result<TcpStream> {
    let attempts = policy.attempts.max(1);
    let mut last_error = Error::NotConnected;

    for attempt in 1..=attempts {
        tracing::debug!(
            addr = %addr,
            attempt,
            attempts,
            timeout_ms = policy.timeout.as_millis(),
            "Connecting to TCP endpoint"
        );

        match connect_once(addr, policy.timeout).await {
            Ok(stream) => {
                tracing::info!(addr = %addr, attempt, "TCP connection established");
                return Ok(stream);
            }
            Err(e) => {
                tracing::warn!(addr = %addr, attempt, error = %e, "TCP connect attempt failed");
                last_error = e;
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    tracing::error!(addr = %addr, attempts, "Giving up on TCP connection");
    Err(last_error)
}

async fn connect_once(addr: &str, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(|e| map_connect_error(e, addr))?;

    // Commands are short single lines; do not let Nagle hold them back.
    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(
            addr = %addr,
            error = %e,
            "Failed to set TCP_NODELAY (continuing anyway)"
        );
    }

    Ok(stream)
}

/// Map a connection-phase I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}
