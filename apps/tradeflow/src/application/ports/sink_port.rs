//! Sink Port (Driven Port)
//!
//! Interface for consumers of the canonical trade stream.

use async_trait::async_trait;

use super::TradeReceiver;

/// Sink error.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// `write_trades` was called on a sink that already started.
    #[error("{kind} sink already started")]
    AlreadyStarted {
        /// Sink kind.
        kind: String,
    },

    /// Writing to the output failed.
    #[error("{kind} sink write failed: {source}")]
    Write {
        /// Sink kind.
        kind: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A trade could not be encoded.
    #[error("{kind} sink failed to encode trade: {source}")]
    Encode {
        /// Sink kind.
        kind: String,
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The consumption task did not exit cleanly.
    #[error("{kind} sink task failed: {message}")]
    Shutdown {
        /// Sink kind.
        kind: String,
        /// Error details.
        message: String,
    },
}

/// Port for consuming the trade stream.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Sink kind (e.g. `stdout`).
    fn kind(&self) -> &str;

    /// Start consuming `from` in the background and return immediately.
    ///
    /// The task runs until `from` is closed and drained or `close` is called.
    async fn write_trades(&self, from: TradeReceiver) -> Result<(), SinkError>;

    /// Stop the consumption task and wait for it to exit.
    ///
    /// Trades already buffered in the channel are written first. Returns the
    /// task's terminal error, if any.
    async fn close(&self) -> Result<(), SinkError>;
}
