//! MCP transport layer implementations.
//!
//! Frames are newline-delimited JSON. [`FrameReader`] and [`FrameWriter`]
//! work over any async byte stream (process stdio, sockets, in-memory
//! pipes); [`StreamTransport`] wires them into the server message loop.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::mcp::protocol::Message;

type BoxReader = Box<dyn AsyncRead + Send + Sync + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Default upper bound on one inbound frame, delimiter excluded.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Line-oriented frame reader.
pub struct FrameReader {
    reader: BufReader<BoxReader>,
    max_frame: usize,
}

impl FrameReader {
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        Self {
            reader: BufReader::new(Box::new(reader)),
            max_frame: MAX_FRAME_BYTES,
        }
    }

    /// Override the frame size cap.
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    /// Read the next frame.
    ///
    /// Blank lines, lines longer than the frame cap and lines that are not
    /// UTF-8 are skipped. Returns `None` on EOF; only an I/O failure is an
    /// error.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let limit = u64::try_from(self.max_frame).unwrap_or(u64::MAX).saturating_add(1);
            let read = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut buf)
                .await?;
            if read == 0 {
                return Ok(None);
            }

            if buf.len() > self.max_frame && buf.last() != Some(&b'\n') {
                let dropped = buf.len() + self.discard_line().await?;
                warn!("Skipping oversized frame ({} bytes or more)", dropped);
                continue;
            }

            match std::str::from_utf8(&buf) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        return Ok(Some(trimmed.to_string()));
                    }
                }
                Err(e) => warn!("Skipping frame that is not valid UTF-8: {}", e),
            }
        }
    }

    /// Consume input up to and including the next newline. Returns the
    /// number of bytes dropped.
    async fn discard_line(&mut self) -> Result<usize> {
        let mut dropped = 0;
        loop {
            let (used, done) = {
                let available = self.reader.fill_buf().await?;
                if available.is_empty() {
                    return Ok(dropped);
                }
                match available.iter().position(|&b| b == b'\n') {
                    Some(pos) => (pos + 1, true),
                    None => (available.len(), false),
                }
            };
            self.reader.consume(used);
            dropped += used;
            if done {
                return Ok(dropped);
            }
        }
    }
}

/// Frame writer shared by concurrent senders.
///
/// Each frame is written and flushed under one lock acquisition, so frames
/// from different callers never interleave.
pub struct FrameWriter {
    writer: Mutex<Option<BoxWriter>>,
}

impl FrameWriter {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Mutex::new(Some(Box::new(writer))),
        }
    }

    /// Write one frame followed by the newline delimiter.
    pub async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        // Frames must not contain embedded newlines
        debug_assert!(!frame.contains(&b'\n'), "frame contains a newline");

        let mut buf = Vec::with_capacity(frame.len() + 1);
        buf.extend_from_slice(frame);
        buf.push(b'\n');

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::ConnectionClosed("transport is closed".to_string()))?;

        writer
            .write_all(&buf)
            .await
            .map_err(|e| Error::Transport(format!("write failed: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::Transport(format!("flush failed: {}", e)))?;
        Ok(())
    }

    /// Shut down the underlying stream. Later writes fail with
    /// [`Error::ConnectionClosed`].
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Error shutting down writer: {}", e);
            }
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}

/// Transport trait for MCP communication.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start the transport, returning channels for messages.
    async fn start(&mut self) -> Result<(mpsc::Receiver<Message>, mpsc::Sender<Message>)>;

    /// Stop the transport, flushing any queued outbound messages.
    async fn stop(&mut self) -> Result<()>;
}

/// Transport over a pair of byte streams.
pub struct StreamTransport {
    reader: Option<FrameReader>,
    writer: Option<FrameWriter>,
    reader_task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<()>>,
}

impl StreamTransport {
    /// Create a transport over arbitrary streams.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Some(FrameReader::new(reader)),
            writer: Some(FrameWriter::new(writer)),
            reader_task: None,
            writer_task: None,
        }
    }

    /// Create a transport over this process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

#[async_trait]
impl Transport for StreamTransport {
    async fn start(&mut self) -> Result<(mpsc::Receiver<Message>, mpsc::Sender<Message>)> {
        let (mut reader, writer) = match (self.reader.take(), self.writer.take()) {
            (Some(reader), Some(writer)) => (reader, writer),
            _ => {
                return Err(Error::Transport(
                    "transport already started".to_string(),
                ))
            }
        };

        // Channel for incoming messages
        let (incoming_tx, incoming_rx) = mpsc::channel::<Message>(100);
        // Channel for outgoing messages
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(100);

        self.reader_task = Some(tokio::spawn(async move {
            loop {
                match reader.read_line().await {
                    Ok(None) => {
                        debug!("EOF on input, stopping transport");
                        break;
                    }
                    Ok(Some(line)) => {
                        trace!("Received: {}", line);
                        match Message::decode(&line) {
                            Ok(msg) => {
                                if incoming_tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Skipping undecodable frame: {}", e),
                        }
                    }
                    Err(e) => {
                        error!("Error reading input: {}", e);
                        break;
                    }
                }
            }
        }));

        self.writer_task = Some(tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                match msg.encode() {
                    Ok(s) => {
                        trace!("Sending: {}", s);
                        if let Err(e) = writer.write_frame(s.as_bytes()).await {
                            error!("Error writing frame: {}", e);
                            break;
                        }
                    }
                    Err(e) => error!("Error serializing message: {}", e),
                }
            }
            writer.close().await;
        }));

        Ok((incoming_rx, outgoing_tx))
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        // The writer task exits once every outgoing sender is dropped.
        if let Some(task) = self.writer_task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    return Err(Error::Internal(format!("writer task failed: {}", e)));
                }
            }
        }
        Ok(())
    }
}
