//! Error types for atcvoice.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, codec,
//! and audio-device errors are all captured here.

/// The error type for all atcvoice operations.
///
/// Variants cover the failure modes of a live voice client: datagram
/// transport faults, malformed wire data, codec failures, and audio device
/// problems.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (UDP socket, HTTP session plumbing).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed voice datagram, bad DTO field).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A voice codec error (encoder or decoder rejected a frame).
    #[error("codec error: {0}")]
    Codec(String),

    /// An audio device error (device missing, stream failed to start).
    #[error("audio device error: {0}")]
    AudioDevice(String),

    /// Timed out waiting for a network response.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a stack or client operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No voice channel is connected.
    #[error("not connected")]
    NotConnected,

    /// An audio or datagram stream was closed unexpectedly.
    ///
    /// This occurs when the receive side of a channel is dropped while a
    /// producer is still trying to feed it.
    #[error("stream closed")]
    StreamClosed,

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
        let e = Error::Transport("socket closed".into());
        assert_eq!(e.to_string(), "transport error: socket closed");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("short AR datagram".into());
        assert_eq!(e.to_string(), "protocol error: short AR datagram");
    }

    #[test]
    fn error_display_codec() {
        let e = Error::Codec("bad frame size".into());
        assert_eq!(e.to_string(), "codec error: bad frame size");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for response");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<Error>();
    }
}
