//! Export sinks
//!
//! A sink receives the document in chunks as the exporter produces them.

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;

use super::error::ExportError;

/// Destination for serialized document chunks
#[async_trait]
pub trait ExportSink: Send {
    /// Append a chunk to the output
    async fn write_chunk(&mut self, chunk: Vec<u8>) -> Result<(), ExportError>;
}

/// Sink collecting the whole document in memory
#[derive(Debug, Default)]
pub struct VecSink {
    buffer: Vec<u8>,
    chunks: usize,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks received
    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Document as text, decoding invalid UTF-8 lossily
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }
}

#[async_trait]
impl ExportSink for VecSink {
    async fn write_chunk(&mut self, chunk: Vec<u8>) -> Result<(), ExportError> {
        self.buffer.extend_from_slice(&chunk);
        self.chunks += 1;
        Ok(())
    }
}

/// Item type of the body stream fed by a [`ChannelSink`]
pub type BodyChunk = Result<Vec<u8>, std::io::Error>;

/// Sink forwarding chunks through a bounded channel
///
/// The receiving half is exposed as a stream suitable for an HTTP response
/// body. Writes wait while the channel is full, so a slow client slows the
/// export down instead of growing memory.
pub struct ChannelSink {
    tx: mpsc::Sender<BodyChunk>,
}

impl ChannelSink {
    /// Create a sink and the stream draining it
    pub fn new(capacity: usize) -> (Self, impl Stream<Item = BodyChunk> + Send + 'static) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        });
        (Self { tx }, stream)
    }

    /// Terminate the stream with an error so the transport truncates the download
    pub async fn abort(&self, error: &ExportError) {
        let message = error.to_string();
        if self
            .tx
            .send(Err(std::io::Error::new(std::io::ErrorKind::Other, message)))
            .await
            .is_err()
        {
            tracing::debug!("Export stream already closed");
        }
    }
}

#[async_trait]
impl ExportSink for ChannelSink {
    async fn write_chunk(&mut self, chunk: Vec<u8>) -> Result<(), ExportError> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| ExportError::serialization("export stream closed by the client"))
    }
}
