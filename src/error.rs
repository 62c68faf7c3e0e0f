//! Error types for the fabula client.

use std::time::Duration;

/// Result type alias for fabula client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by delivery handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur when talking to a fabula broker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No host in the configured set could be reached.
    #[error("failed to dial {host}: {source}")]
    Dial {
        /// The host that was attempted last.
        host: String,
        /// The underlying transport error.
        #[source]
        source: std::io::Error,
    },

    /// The broker answered the handshake with something other than `ok`,
    /// or dropped the connection before answering.
    #[error("handshake rejected by {host}: {}", response.as_deref().unwrap_or("connection closed"))]
    HandshakeRejected {
        /// The host that rejected the handshake.
        host: String,
        /// The response line, if one arrived.
        response: Option<String>,
    },

    /// The connection to the broker was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The delivery handler returned an error.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// The broker rejected an append request.
    #[error("append rejected: {0}")]
    Rejected(String),

    /// The wire data violated a local framing limit.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The configuration is missing a value or could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Dialing a host took longer than the configured timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// An I/O error outside an established session.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a handler error.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Error::Handler(err.into())
    }

    /// Returns `true` if the transport was severed.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Error::ConnectionClosed)
    }

    /// Returns `true` if the broker refused an append. The session stays
    /// usable.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Error::Rejected(_))
    }

    /// Returns `true` if the error came from a delivery handler.
    pub fn is_handler(&self) -> bool {
        matches!(self, Error::Handler(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_rejected_display() {
        let err = Error::HandshakeRejected {
            host: "a:1".into(),
            response: Some("nok".into()),
        };
        assert_eq!(err.to_string(), "handshake rejected by a:1: nok");

        let err = Error::HandshakeRejected {
            host: "a:1".into(),
            response: None,
        };
        assert_eq!(
            err.to_string(),
            "handshake rejected by a:1: connection closed"
        );
    }

    #[test]
    fn test_handler_wraps_source() {
        let err = Error::handler("boom");
        assert!(err.is_handler());
        assert!(!err.is_connection_closed());
        assert_eq!(err.to_string(), "handler failed: boom");
    }
}
