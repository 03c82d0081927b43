//! Transport Error Types
//!
//! Error handling for links between machines. Transport failures stay inside
//! this crate's boundary: the scheduler only learns whether a send was
//! delivered, and only startup failures are allowed to end a process.

use codec::{ActorId, ProtocolError};
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Peer could not be reached (startup connection attempts)
    #[error("Connection error: {message} (remote: {remote_addr:?})")]
    Connection {
        message: String,
        remote_addr: Option<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An established link failed or was closed by the peer
    #[error("Session error with machine {peer}: {message}")]
    Session { peer: ActorId, message: String },

    /// No live link to the requested peer
    #[error("No connection to machine {peer}")]
    NotConnected { peer: ActorId },

    /// Link opening handshake was missing or rejected
    #[error("Handshake error: {message}")]
    Handshake { message: String },

    /// Bytes on the wire could not be decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Operation abandoned because the transport is shutting down
    #[error("Transport is shutting down")]
    Shutdown,

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        remote_addr: Option<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: Some(Box::new(source)),
        }
    }

    pub fn session(peer: ActorId, message: impl Into<String>) -> Self {
        Self::Session {
            peer,
            message: message.into(),
        }
    }

    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create an I/O error with a description of what was attempted
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Check if retrying the same operation can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connection { .. } => true,
            TransportError::Timeout { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::Session { .. } => false,
            TransportError::NotConnected { .. } => false,
            TransportError::Handshake { .. } => false,
            TransportError::Protocol(_) => false,
            TransportError::Shutdown => false,
        }
    }

    /// Clean cancellation rather than a failure
    pub fn is_shutdown(&self) -> bool {
        matches!(self, TransportError::Shutdown)
    }

    /// Get error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Connection { .. } => "connection",
            TransportError::Session { .. } => "session",
            TransportError::NotConnected { .. } => "not_connected",
            TransportError::Handshake { .. } => "handshake",
            TransportError::Protocol(_) => "malformed_message",
            TransportError::Shutdown => "shutdown",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Io { .. } => "io",
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let err = TransportError::connection_with_source(
            "Connection refused",
            Some("127.0.0.1:5002".into()),
            std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        );
        assert_eq!(err.category(), "connection");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("127.0.0.1:5002"));
    }

    #[test]
    fn test_session_errors_are_not_retried() {
        let err = TransportError::session(ActorId::new(2), "peer closed link");
        assert!(!err.is_retryable());
        assert_eq!(err.category(), "session");
        assert!(err.to_string().contains("machine 2"));

        assert!(!TransportError::NotConnected {
            peer: ActorId::new(3)
        }
        .is_retryable());
    }

    #[test]
    fn test_shutdown_is_clean() {
        assert!(TransportError::Shutdown.is_shutdown());
        assert!(!TransportError::handshake("no hello").is_shutdown());
    }

    #[test]
    fn test_protocol_error_conversion() {
        let err: TransportError = ProtocolError::frame_too_large(4096, 1024).into();
        assert_eq!(err.category(), "malformed_message");
        assert!(matches!(err, TransportError::Protocol(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "test");
        let transport_err = TransportError::from(io_err);

        match transport_err {
            TransportError::Io { message, .. } => {
                assert!(message.contains("test"));
            }
            _ => panic!("Expected Io error"),
        }
    }
}
