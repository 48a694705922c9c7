//! Transport setup for flexmirror.
//!
//! The engine itself never blocks on sockets; this crate only covers the
//! setup phase, where bind and connect failures get a bounded number of
//! retries before they are returned to the caller as fatal.
//!
//! - [`tcp::connect_with_retry`]: the SmartSDR command channel
//! - [`UdpTransport`]: the VITA-49 stream socket, bound by walking a port range

pub mod tcp;
pub mod udp;

pub use tcp::{RetryPolicy, connect_with_retry};
pub use udp::UdpTransport;
