//! Error types for the lobby client.

use thiserror::Error;

/// Errors that can occur when using the lobby client.
///
/// Transport failures never escape as panics: they surface as one of these
/// variants from the operation that triggered them, and as `error` /
/// `disconnected` events on the [`EventBus`](crate::event::EventBus).
#[derive(Debug, Error)]
pub enum LobbyError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred while connecting.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A network operation was requested but no server URL is configured.
    #[error("no server URL configured")]
    NoServerUrl,

    /// The socket did not open within the connect timeout.
    #[error("connection timed out")]
    ConnectTimeout,

    /// The server rejected a handshake with an `error` message.
    #[error("server error: {message}")]
    Server {
        /// Human-readable error message from the server.
        message: String,
    },

    /// The connection dropped while a handshake was outstanding.
    #[error("disconnected from server")]
    Disconnected,

    /// A handshake did not complete before its deadline.
    #[error("operation timed out")]
    Timeout,
}

/// A specialized [`Result`] type for lobby client operations.
pub type Result<T> = std::result::Result<T, LobbyError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn server_error_display_includes_message() {
        let err = LobbyError::Server {
            message: "lobby full".into(),
        };
        assert_eq!(err.to_string(), "server error: lobby full");
    }

    #[test]
    fn serde_errors_convert() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: LobbyError = parse.into();
        assert!(matches!(err, LobbyError::Serialization(_)));
    }
}
