//! Standard I/O transport implementation.
//!
//! Newline-delimited JSON over stdin/stdout: one [`Message`] per line. The
//! transport reads frames on a background task into a bounded channel and
//! writes frames through a `FramedWrite` with [`LinesCodec`], so outbound
//! sends are serialized by the write path itself.
//!
//! Lock discipline follows the usual hybrid pattern: `std::sync::Mutex` for
//! short-lived state that never crosses an await, `tokio::sync::Mutex` for the
//! I/O halves that do.

use std::pin::Pin;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::Child;
use tokio::sync::{Mutex as TokioMutex, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, trace, warn};

use toolbus_core::Message;

use crate::error::{TransportError, TransportResult};
use crate::Transport;

const RECEIVE_CHANNEL_CAPACITY: usize = 1024;

type BoxedAsyncRead = Pin<Box<dyn AsyncRead + Send + Sync + 'static>>;
type BoxedAsyncWrite = Pin<Box<dyn AsyncWrite + Send + Sync + 'static>>;
type LineReader = FramedRead<BufReader<BoxedAsyncRead>, LinesCodec>;
type LineWriter = FramedWrite<BoxedAsyncWrite, LinesCodec>;

/// Where the transport's byte streams come from.
enum StreamSource {
    /// The current process's stdin/stdout. Reusable across connect cycles.
    ProcessStdio,
    /// Raw streams handed in once; consumed by the first connect.
    Raw {
        reader: Option<BoxedAsyncRead>,
        writer: Option<BoxedAsyncWrite>,
    },
}

impl std::fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProcessStdio => write!(f, "ProcessStdio"),
            Self::Raw { .. } => write!(f, "Raw"),
        }
    }
}

/// Newline-delimited JSON transport over stdio-style streams.
pub struct StdioTransport {
    stream_source: TokioMutex<StreamSource>,
    writer: TokioMutex<Option<LineWriter>>,
    receive_channel: TokioMutex<Option<mpsc::Receiver<Message>>>,
    reader_task: StdMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport").finish_non_exhaustive()
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StdioTransport {
    /// Create a transport over the current process's stdin/stdout.
    pub fn new() -> Self {
        Self::with_source(StreamSource::ProcessStdio)
    }

    /// Create a transport from a spawned child process.
    ///
    /// The child must have been spawned with `stdin(Stdio::piped())` and
    /// `stdout(Stdio::piped())`; we write to the child's stdin and read from
    /// its stdout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConfigurationError`] if either stream was not
    /// piped.
    pub fn from_child(child: &mut Child) -> TransportResult<Self> {
        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::ConfigurationError(
                "child process stdin was not piped; use Stdio::piped() when spawning".to_string(),
            )
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::ConfigurationError(
                "child process stdout was not piped; use Stdio::piped() when spawning".to_string(),
            )
        })?;
        Ok(Self::from_raw(stdout, stdin))
    }

    /// Create a transport from raw async streams.
    ///
    /// `reader` is the stream messages arrive on (a peer's stdout), `writer`
    /// the stream messages leave on (a peer's stdin). The streams are consumed
    /// by the first connect; this constructor does not support reconnect
    /// cycles.
    pub fn from_raw<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
        W: AsyncWrite + Send + Sync + 'static,
    {
        Self::with_source(StreamSource::Raw {
            reader: Some(Box::pin(reader)),
            writer: Some(Box::pin(writer)),
        })
    }

    fn with_source(source: StreamSource) -> Self {
        Self {
            stream_source: TokioMutex::new(source),
            writer: TokioMutex::new(None),
            receive_channel: TokioMutex::new(None),
            reader_task: StdMutex::new(None),
        }
    }

    async fn take_streams(&self) -> TransportResult<(LineReader, LineWriter)> {
        let mut source = self.stream_source.lock().await;
        let (reader, writer): (BoxedAsyncRead, BoxedAsyncWrite) = match &mut *source {
            StreamSource::ProcessStdio => {
                (Box::pin(tokio::io::stdin()), Box::pin(tokio::io::stdout()))
            }
            StreamSource::Raw { reader, writer } => {
                let reader = reader.take().ok_or_else(|| {
                    TransportError::ConfigurationError(
                        "raw reader stream already consumed".to_string(),
                    )
                })?;
                let writer = writer.take().ok_or_else(|| {
                    TransportError::ConfigurationError(
                        "raw writer stream already consumed".to_string(),
                    )
                })?;
                (reader, writer)
            }
        };
        Ok((
            FramedRead::new(BufReader::new(reader), LinesCodec::new()),
            FramedWrite::new(writer, LinesCodec::new()),
        ))
    }

    fn parse_line(line: &str) -> TransportResult<Message> {
        let line = line.trim();
        if line.is_empty() {
            return Err(TransportError::ProtocolError("empty frame".to_string()));
        }
        Ok(serde_json::from_str(line)?)
    }

    fn serialize_message(message: &Message) -> TransportResult<String> {
        let json = serde_json::to_string(message)?;
        // Framing contract: one message per line, no embedded newlines.
        if json.contains('\n') || json.contains('\r') {
            return Err(TransportError::ProtocolError(
                "message contains embedded newlines".to_string(),
            ));
        }
        Ok(json)
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self) -> TransportResult<()> {
        if self.receive_channel.lock().await.is_some() {
            return Ok(());
        }

        let (mut reader, writer) = self.take_streams().await?;
        *self.writer.lock().await = Some(writer);

        let (tx, rx) = mpsc::channel(RECEIVE_CHANNEL_CAPACITY);
        *self.receive_channel.lock().await = Some(rx);

        let task = tokio::spawn(async move {
            while let Some(result) = reader.next().await {
                match result {
                    Ok(line) => {
                        trace!("received line: {line}");
                        match Self::parse_line(&line) {
                            Ok(message) => match tx.try_send(message) {
                                Ok(()) => {}
                                Err(mpsc::error::TrySendError::Full(_)) => {
                                    warn!("receive channel full, dropping inbound frame");
                                }
                                Err(mpsc::error::TrySendError::Closed(_)) => {
                                    debug!("receive channel closed, stopping reader task");
                                    break;
                                }
                            },
                            Err(e) => {
                                // Malformed input is never fatal to the stream.
                                warn!("dropping malformed frame: {e}");
                            }
                        }
                    }
                    Err(e) => {
                        warn!("read failed, ending inbound stream: {e}");
                        break;
                    }
                }
            }
            debug!("stdio reader task completed");
        });
        *self
            .reader_task
            .lock()
            .expect("reader task mutex poisoned") = Some(task);

        debug!("stdio transport connected");
        Ok(())
    }

    async fn send(&self, message: Message) -> TransportResult<()> {
        let line = Self::serialize_message(&message)?;
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::NotConnected)?;
        writer
            .send(line)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn receive(&self) -> TransportResult<Option<Message>> {
        let mut channel = self.receive_channel.lock().await;
        let rx = channel.as_mut().ok_or(TransportError::NotConnected)?;
        Ok(rx.recv().await)
    }

    async fn close(&self) -> TransportResult<()> {
        if let Some(task) = self
            .reader_task
            .lock()
            .expect("reader task mutex poisoned")
            .take()
        {
            task.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            // Best-effort flush of anything already enqueued. The item type
            // must be spelled out: `LinesCodec` encodes any `AsRef<str>`.
            if let Err(e) = SinkExt::<String>::close(&mut writer).await {
                debug!("error closing writer: {e}");
            }
        }
        self.receive_channel.lock().await.take();
        debug!("stdio transport closed");
        Ok(())
    }

    fn endpoint(&self) -> Option<String> {
        Some("stdio://".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Map;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn send_frames_one_message_per_line() {
        let (peer_read, our_write) = tokio::io::duplex(4096);
        let (our_read, _peer_write) = tokio::io::duplex(4096);
        let transport = StdioTransport::from_raw(our_read, our_write);
        transport.connect().await.unwrap();

        transport
            .send(Message::request("a", "echo", Map::new()))
            .await
            .unwrap();
        transport
            .send(Message::response("a", serde_json::json!({"ok": true})))
            .await
            .unwrap();
        transport.close().await.unwrap();

        let mut lines = FramedRead::new(peer_read, LinesCodec::new());
        let first = lines.next().await.unwrap().unwrap();
        let second = lines.next().await.unwrap().unwrap();
        let first: Message = serde_json::from_str(&first).unwrap();
        assert_eq!(first.kind, toolbus_core::MessageType::Request);
        assert_eq!(first.id, "a");
        let second: Message = serde_json::from_str(&second).unwrap();
        assert_eq!(second.kind, toolbus_core::MessageType::Response);
    }

    #[tokio::test]
    async fn malformed_lines_are_dropped_and_stream_continues() {
        let (_peer_read, our_write) = tokio::io::duplex(4096);
        let (our_read, mut peer_write) = tokio::io::duplex(4096);
        let transport = StdioTransport::from_raw(our_read, our_write);
        transport.connect().await.unwrap();

        peer_write.write_all(b"this is not json\n").await.unwrap();
        peer_write
            .write_all(b"{\"type\":\"notification\",\"id\":\"n1\",\"payload\":null}\n")
            .await
            .unwrap();

        let msg = transport.receive().await.unwrap().unwrap();
        assert_eq!(msg.id, "n1");
    }

    #[tokio::test]
    async fn stream_end_yields_none() {
        let (_peer_read, our_write) = tokio::io::duplex(4096);
        let (our_read, peer_write) = tokio::io::duplex(4096);
        let transport = StdioTransport::from_raw(our_read, our_write);
        transport.connect().await.unwrap();

        drop(peer_write);
        assert_eq!(transport.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_send_after_close_fails() {
        let (_peer_read, our_write) = tokio::io::duplex(4096);
        let (our_read, _peer_write) = tokio::io::duplex(4096);
        let transport = StdioTransport::from_raw(our_read, our_write);
        transport.connect().await.unwrap();

        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport
            .send(Message::notification("x", serde_json::Value::Null))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn raw_streams_cannot_be_reconnected() {
        let (_peer_read, our_write) = tokio::io::duplex(4096);
        let (our_read, _peer_write) = tokio::io::duplex(4096);
        let transport = StdioTransport::from_raw(our_read, our_write);
        transport.connect().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::ConfigurationError(_)));
    }
}
