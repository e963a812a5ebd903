//! Line-oriented JSON sink over any async writer.
//!
//! Each trade becomes one compact JSON object followed by `\n`. Output is
//! buffered and flushed whenever the input channel runs dry, and once more
//! on exit.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Sink, SinkError, TradeReceiver};
use crate::domain::trade::Trade;
use crate::infrastructure::metrics;

/// Sink writing JSON lines to standard output.
pub type StdoutSink = WriterSink<tokio::io::Stdout>;

/// Sink appending JSON lines to a file.
pub type FileSink = WriterSink<tokio::fs::File>;

struct Worker {
    stop: CancellationToken,
    done: JoinHandle<Result<u64, SinkError>>,
}

struct SinkState<W> {
    writer: Option<W>,
    worker: Option<Worker>,
}

/// JSON-lines sink over an [`AsyncWrite`].
pub struct WriterSink<W> {
    kind: String,
    state: Mutex<SinkState<W>>,
}

impl WriterSink<tokio::io::Stdout> {
    /// Sink writing to the process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new("stdout", tokio::io::stdout())
    }
}

impl WriterSink<tokio::fs::File> {
    /// Sink appending to `path`, creating the file if needed.
    ///
    /// The file is opened immediately so a bad path fails at startup.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Write`] if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SinkError::Write {
                kind: "file".to_owned(),
                source,
            })?;

        Ok(Self::new("file", tokio::fs::File::from_std(file)))
    }
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Sink of `kind` writing to `writer`.
    #[must_use]
    pub fn new(kind: impl Into<String>, writer: W) -> Self {
        Self {
            kind: kind.into(),
            state: Mutex::new(SinkState {
                writer: Some(writer),
                worker: None,
            }),
        }
    }
}

impl<W> std::fmt::Debug for WriterSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterSink")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<W> Sink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn write_trades(&self, from: TradeReceiver) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        let Some(writer) = state.writer.take() else {
            return Err(SinkError::AlreadyStarted {
                kind: self.kind.clone(),
            });
        };

        let stop = CancellationToken::new();
        let done = tokio::spawn(consume(
            self.kind.clone(),
            writer,
            from,
            stop.clone(),
        ));
        state.worker = Some(Worker { stop, done });
        drop(state);

        tracing::debug!(sink = %self.kind, "Sink started");
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        let Some(worker) = self.state.lock().worker.take() else {
            return Ok(());
        };

        worker.stop.cancel();
        let written = worker
            .done
            .await
            .map_err(|e| SinkError::Shutdown {
                kind: self.kind.clone(),
                message: e.to_string(),
            })??;

        tracing::info!(sink = %self.kind, written, "Sink closed");
        Ok(())
    }
}

async fn consume<W>(
    kind: String,
    writer: W,
    mut from: TradeReceiver,
    stop: CancellationToken,
) -> Result<u64, SinkError>
where
    W: AsyncWrite + Unpin,
{
    let mut out = BufWriter::new(writer);
    let mut written = 0u64;

    loop {
        let trade = tokio::select! {
            biased;
            () = stop.cancelled() => {
                // Drain whatever is already buffered, then stop.
                while let Ok(trade) = from.try_recv() {
                    write_line(&kind, &mut out, &trade).await?;
                    written += 1;
                }
                break;
            }
            trade = from.recv() => trade,
        };

        let Some(trade) = trade else {
            break;
        };

        write_line(&kind, &mut out, &trade).await?;
        written += 1;

        if from.is_empty() {
            flush(&kind, &mut out).await?;
        }
    }

    flush(&kind, &mut out).await?;
    Ok(written)
}

async fn write_line<W>(kind: &str, out: &mut BufWriter<W>, trade: &Trade) -> Result<(), SinkError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(trade).map_err(|source| SinkError::Encode {
        kind: kind.to_owned(),
        source,
    })?;
    line.push(b'\n');

    out.write_all(&line).await.map_err(|source| {
        tracing::error!(sink = kind, error = %source, "Sink write failed");
        SinkError::Write {
            kind: kind.to_owned(),
            source,
        }
    })?;

    metrics::record_trade_written(kind);
    Ok(())
}

async fn flush<W>(kind: &str, out: &mut BufWriter<W>) -> Result<(), SinkError>
where
    W: AsyncWrite + Unpin,
{
    out.flush().await.map_err(|source| SinkError::Write {
        kind: kind.to_owned(),
        source,
    })
}
