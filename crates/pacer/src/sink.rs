use std::{future::Future, sync::Arc};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{PacerError, PacerResult};

/// Downstream consumer of segment data, e.g. a demuxer or a media source buffer.
///
/// Data is always written in presentation order.
pub trait DataSink: Send + Sync + 'static {
    fn write(&self, data: Bytes) -> impl Future<Output = PacerResult<()>> + Send;

    /// No more data will follow until the next [`DataSink::clear`].
    fn end_of_stream(&self) -> impl Future<Output = PacerResult<()>> + Send;

    /// Discard anything written so far.
    fn clear(&self) -> impl Future<Output = PacerResult<()>> + Send;
}

impl<S> DataSink for Arc<S>
where
    S: DataSink,
{
    fn write(&self, data: Bytes) -> impl Future<Output = PacerResult<()>> + Send {
        self.as_ref().write(data)
    }

    fn end_of_stream(&self) -> impl Future<Output = PacerResult<()>> + Send {
        self.as_ref().end_of_stream()
    }

    fn clear(&self) -> impl Future<Output = PacerResult<()>> + Send {
        self.as_ref().clear()
    }
}

#[derive(Default)]
struct MemorySinkState {
    chunks: Vec<Bytes>,
    ended: bool,
    clears: usize,
}

/// Keeps every chunk in memory.
#[derive(Default)]
pub struct MemorySink {
    state: Mutex<MemorySinkState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> Vec<Bytes> {
        self.state.lock().chunks.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    /// How many times the sink has been cleared.
    pub fn clears(&self) -> usize {
        self.state.lock().clears
    }
}

impl DataSink for MemorySink {
    async fn write(&self, data: Bytes) -> PacerResult<()> {
        let mut state = self.state.lock();
        if state.ended {
            return Err(PacerError::SinkClosed);
        }
        state.chunks.push(data);
        Ok(())
    }

    async fn end_of_stream(&self) -> PacerResult<()> {
        self.state.lock().ended = true;
        Ok(())
    }

    async fn clear(&self) -> PacerResult<()> {
        let mut state = self.state.lock();
        state.chunks.clear();
        state.ended = false;
        state.clears += 1;
        Ok(())
    }
}

/// Streams segment data into an [`AsyncWrite`], such as a file or the stdin of a player.
///
/// Bytes already written cannot be taken back, so clearing only flushes.
pub struct WriterSink<W> {
    writer: tokio::sync::Mutex<W>,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W> DataSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write(&self, data: Bytes) -> PacerResult<()> {
        self.writer.lock().await.write_all(&data).await?;
        Ok(())
    }

    async fn end_of_stream(&self) -> PacerResult<()> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.shutdown().await?;
        Ok(())
    }

    async fn clear(&self) -> PacerResult<()> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}
