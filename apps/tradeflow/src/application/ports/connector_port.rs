//! Connector Port (Driven Port)
//!
//! Interface for a live exchange trade feed.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::trade::{CanonicalSymbol, Trade};

/// Sending half of a trade channel.
pub type TradeSender = mpsc::Sender<Trade>;

/// Receiving half of a trade channel.
pub type TradeReceiver = mpsc::Receiver<Trade>;

/// Connector error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectorError {
    /// `consume_trades` was called on a connector that already started.
    #[error("{exchange} connector already started")]
    AlreadyStarted {
        /// Exchange identifier.
        exchange: String,
    },

    /// The exchange socket could not be opened.
    #[error("failed to connect to {exchange} at {url}: {message}")]
    Connect {
        /// Exchange identifier.
        exchange: String,
        /// Endpoint that was dialed.
        url: String,
        /// Error details.
        message: String,
    },

    /// The exchange refused or never acknowledged the subscription.
    #[error("{exchange} subscription failed: {message}")]
    Subscribe {
        /// Exchange identifier.
        exchange: String,
        /// Error details.
        message: String,
    },

    /// A subscription worker did not exit cleanly.
    #[error("{exchange} worker failed during shutdown: {message}")]
    Shutdown {
        /// Exchange identifier.
        exchange: String,
        /// Error details.
        message: String,
    },
}

/// Port for a streaming exchange connection.
///
/// A connector is started at most once. `close` returns only after every
/// background worker has exited, so once all connectors are closed nothing
/// can enqueue into the ingestion channel any more.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Exchange identifier (e.g. `binance`).
    fn exchange(&self) -> &str;

    /// Subscribe to `symbols` (canonical spelling) and stream trades into
    /// `into` from background tasks.
    ///
    /// Returns once the subscription is established.
    async fn consume_trades(
        &self,
        into: TradeSender,
        symbols: &[CanonicalSymbol],
    ) -> Result<(), ConnectorError>;

    /// Stop every subscription and wait for the workers to exit.
    async fn close(&self) -> Result<(), ConnectorError>;
}
