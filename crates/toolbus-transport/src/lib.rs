//! Transport layer for toolbus.
//!
//! A [`Transport`] is a bidirectional framed message channel: one JSON message
//! per newline-delimited unit, no length prefixing, no multi-line payloads.
//! [`StdioTransport`] implements the contract over the current process's
//! stdio, a spawned child process, or arbitrary raw async streams.

mod error;
mod stdio;

pub use error::{TransportError, TransportResult};
pub use stdio::StdioTransport;

use async_trait::async_trait;
use toolbus_core::Message;

/// A bidirectional framed message channel between two protocol endpoints.
///
/// Exactly one consumer may drive [`Transport::receive`] at a time; the
/// protocol engine's inbound loop is that consumer. Outbound sends are
/// serialized by the transport's own write path.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Establish (or re-establish) the underlying channel.
    ///
    /// Idempotent while connected. After [`Transport::close`], a new connect
    /// builds a fresh channel where the stream source allows it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] or
    /// [`TransportError::ConfigurationError`] when the channel cannot be set
    /// up.
    async fn connect(&self) -> TransportResult<()>;

    /// Enqueue a framed write.
    ///
    /// Resolves once the message is handed to the underlying channel, not once
    /// it is physically flushed to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] with no channel attached, or
    /// [`TransportError::SendFailed`] on a write-path failure.
    async fn send(&self, message: Message) -> TransportResult<()>;

    /// Produce the next parsed inbound message.
    ///
    /// `Ok(None)` signals end of stream. A line that fails to parse is dropped
    /// and logged; the sequence continues - malformed input is never fatal to
    /// the stream.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] with no channel attached.
    async fn receive(&self) -> TransportResult<Option<Message>>;

    /// Terminate both directions. Idempotent.
    ///
    /// # Errors
    ///
    /// Implementations report best-effort close failures; callers may ignore
    /// them.
    async fn close(&self) -> TransportResult<()>;

    /// Endpoint address or identifier, if applicable.
    fn endpoint(&self) -> Option<String> {
        None
    }
}
