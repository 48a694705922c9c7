//! Error types for flexmirror.
//!
//! Every fallible operation in the workspace returns [`Result<T>`], which
//! uses [`Error`] as the error type. Routine protocol anomalies (a bad status
//! token, an unknown key, a reply nobody is waiting for) are logged and
//! skipped by the engine and never surface here.

/// The error type for all flexmirror operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level failure (TCP connect, UDP bind, socket write).
    #[error("transport error: {0}")]
    Transport(String),

    /// A line or packet that could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for the radio (connect or handshake).
    #[error("timeout waiting for response")]
    Timeout,

    /// The operation is not available for this entity kind.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An invalid parameter was passed by the caller.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No command channel is attached.
    #[error("not connected")]
    NotConnected,

    /// The command channel closed unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// A creation request was issued twice for the same entity.
    ///
    /// A request that is already in flight, or that already received its
    /// identifier from the radio, cannot be sent again.
    #[error("entity already requested")]
    AlreadyRequested,

    /// The radio answered a command with a non-zero response code.
    #[error("command rejected with code 0x{code:08X}: {message}")]
    Rejected { code: u32, message: String },

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("address in use".into());
        assert_eq!(e.to_string(), "transport error: address in use");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("bad reply line".into());
        assert_eq!(e.to_string(), "protocol error: bad reply line");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_display_unsupported() {
        let e = Error::Unsupported("equalizer removal".into());
        assert_eq!(e.to_string(), "unsupported operation: equalizer removal");
    }

    #[test]
    fn error_display_already_requested() {
        assert_eq!(
            Error::AlreadyRequested.to_string(),
            "entity already requested"
        );
    }

    #[test]
    fn error_display_rejected() {
        let e = Error::Rejected {
            code: 0x5000_0015,
            message: "Invalid slice".into(),
        };
        assert_eq!(
            e.to_string(),
            "command rejected with code 0x50000015: Invalid slice"
        );
    }

    #[test]
    fn error_display_connection_states() {
        assert_eq!(Error::NotConnected.to_string(), "not connected");
        assert_eq!(Error::ConnectionLost.to_string(), "connection lost");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("port taken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
