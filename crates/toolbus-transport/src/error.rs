//! Transport error types.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur during transport operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An operation was attempted with no channel attached.
    #[error("Transport not connected")]
    NotConnected,

    /// Failed to send a message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to read from the inbound stream.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Failed to serialize or deserialize a message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// The message violates the framing contract.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The transport was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(err.to_string())
    }
}

impl From<LinesCodecError> for TransportError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => {
                Self::ProtocolError("maximum line length exceeded".to_string())
            }
            LinesCodecError::Io(io) => Self::Io(io.to_string()),
        }
    }
}

impl From<TransportError> for toolbus_core::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::SerializationFailed(msg) => toolbus_core::Error::Serialization(msg),
            other => toolbus_core::Error::Connection(other.to_string()),
        }
    }
}
