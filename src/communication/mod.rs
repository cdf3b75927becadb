// src/communication/mod.rs - Newline-delimited line transport
pub mod serial;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Destination for outgoing protocol lines (diagnostics and `ACK`).
#[async_trait]
pub trait LineSink: Send {
    async fn send_line(&mut self, line: &str) -> std::io::Result<()>;
}

/// Writes each line followed by `\n` and flushes, so the host sees it at once.
#[derive(Debug)]
pub struct LineWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin + Send> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> LineSink for LineWriter<W> {
    async fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        tracing::trace!("TX: {}", line);
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await
    }
}

/// In-memory sink, handy for capturing controller output.
#[async_trait]
impl LineSink for Vec<String> {
    async fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

/// Lines the reader task may hold before it stops reading the stream.
pub const LINE_BACKLOG: usize = 16;

/// Spawns a task that splits `reader` into lines and forwards them.
///
/// Lines are delivered without their terminator; invalid UTF-8 is replaced
/// rather than rejected. A line longer than `max_len` bytes is cut to
/// `max_len + 1` bytes and the rest of it is discarded, so the receiver can
/// still tell it was oversized. At most [`LINE_BACKLOG`] lines wait in the
/// channel; beyond that the task stops reading until the receiver catches
/// up. The channel closes when the stream ends or fails.
pub fn spawn_line_reader<R>(reader: R, max_len: usize) -> mpsc::Receiver<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(LINE_BACKLOG);
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = LineBuffer::new(max_len);
        loop {
            let available = match reader.fill_buf().await {
                Ok(available) => available,
                Err(e) => {
                    tracing::error!("Line read error: {}", e);
                    break;
                }
            };
            if available.is_empty() {
                if !line.is_empty() && tx.send(line.take()).await.is_err() {
                    break;
                }
                tracing::info!("Line stream closed by remote");
                break;
            }
            tracing::trace!("Read {} bytes", available.len());
            let (consumed, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(end) => {
                    line.extend(&available[..end]);
                    (end + 1, true)
                }
                None => {
                    line.extend(available);
                    (available.len(), false)
                }
            };
            reader.consume(consumed);
            if complete && tx.send(line.take()).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// Accumulates one line, keeping at most `max_len + 1` bytes of it.
struct LineBuffer {
    bytes: Vec<u8>,
    max_len: usize,
    discarded: usize,
}

impl LineBuffer {
    fn new(max_len: usize) -> Self {
        Self {
            bytes: Vec::new(),
            max_len,
            discarded: 0,
        }
    }

    fn is_empty(&self) -> bool {
        self.bytes.is_empty() && self.discarded == 0
    }

    fn extend(&mut self, chunk: &[u8]) {
        let room = (self.max_len + 1).saturating_sub(self.bytes.len());
        let kept = chunk.len().min(room);
        self.bytes.extend_from_slice(&chunk[..kept]);
        self.discarded += chunk.len() - kept;
    }

    fn take(&mut self) -> String {
        if self.discarded > 0 {
            tracing::warn!(
                "Line exceeds {} bytes, discarded {} trailing bytes",
                self.max_len,
                self.discarded
            );
        }
        let text = String::from_utf8_lossy(&self.bytes);
        let text = text.trim_end_matches('\r').to_string();
        tracing::debug!("RX: {}", text);
        self.bytes.clear();
        self.discarded = 0;
        text
    }
}

/// Spawns a task that writes every queued line to `writer`.
pub fn spawn_line_writer<W>(writer: W) -> mpsc::UnboundedSender<String>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut writer = LineWriter::new(writer);
        while let Some(line) = rx.recv().await {
            if let Err(e) = writer.send_line(&line).await {
                tracing::error!("Line write error: {}", e);
                break;
            }
        }
        tracing::info!("Line writer task terminated");
    });
    tx
}
