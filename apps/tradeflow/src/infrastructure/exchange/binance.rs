//! Binance Trade Stream Connector
//!
//! Opens one raw trade stream per symbol, each on its own socket with its
//! own stop/done pair.
//!
//! # Stream URL
//!
//! `{endpoint}/{symbol}@trade` with the symbol lowercased, e.g.
//! `wss://stream.binance.com:9443/ws/btcusdt@trade`.
//!
//! # Protocol
//!
//! Each text frame is one JSON trade event. Frames without `"e":"trade"`
//! (such as `{"result":null,"id":1}`) are ignored.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::feed::FeedContext;
use super::socket::{WsStream, dial};
use crate::application::ports::{
    Connector, ConnectorError, ErrorReporter, FeedErrorKind, TradeSender,
};
use crate::domain::trade::{CanonicalSymbol, ExchangeSymbol, Side, Trade};
use crate::infrastructure::config::BinanceSettings;

/// Exchange identifier.
pub const EXCHANGE: &str = "binance";

/// Production raw stream endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://stream.binance.com:9443/ws";

// =============================================================================
// Wire Types
// =============================================================================

/// Raw trade event.
///
/// Only the symbol is required. The other fields are kept as raw JSON so a
/// null, bare number or missing value degrades that field instead of
/// dropping the trade. Trade id and trade time are not read.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEvent {
    /// Exchange symbol.
    #[serde(rename = "s")]
    pub symbol: String,
    /// Event time (ms since epoch).
    #[serde(rename = "E", default)]
    pub event_time: serde_json::Value,
    /// Price, normally a decimal string.
    #[serde(rename = "p", default)]
    pub price: serde_json::Value,
    /// Quantity, normally a decimal string.
    #[serde(rename = "q", default)]
    pub quantity: serde_json::Value,
    /// Whether the buyer was the maker.
    #[serde(rename = "m", default)]
    pub is_buyer_maker: serde_json::Value,
}

impl TradeEvent {
    fn into_trade(self, feed: &FeedContext) -> Trade {
        let side = self.is_buyer_maker.as_bool().map_or_else(
            || {
                feed.report(FeedErrorKind::Decode {
                    field: "side",
                    value: self.is_buyer_maker.to_string(),
                    reason: "expected a maker flag".to_string(),
                });
                Side::Seller
            },
            Side::from_buyer_is_maker,
        );

        Trade::new(
            EXCHANGE,
            feed.timestamp_millis_value("timestamp", &self.event_time),
            feed.canonical(&self.symbol),
            feed.number_value("price", &self.price),
            feed.number_value("quantity", &self.quantity),
            side,
        )
    }
}

/// Decode one text frame into a trade.
///
/// Returns `None` for non-trade frames and for trade frames whose symbol
/// cannot be recovered (the latter are reported as malformed). Any other
/// bad field degrades and is reported as a decode error.
pub fn decode_frame(feed: &FeedContext, text: &str) -> Option<Trade> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            feed.report(FeedErrorKind::Malformed {
                reason: e.to_string(),
            });
            return None;
        }
    };

    if value.get("e").and_then(serde_json::Value::as_str) != Some("trade") {
        tracing::trace!(exchange = EXCHANGE, frame = text, "Ignoring non-trade frame");
        return None;
    }

    match serde_json::from_value::<TradeEvent>(value) {
        Ok(event) => Some(event.into_trade(feed)),
        Err(e) => {
            feed.report(FeedErrorKind::Malformed {
                reason: e.to_string(),
            });
            None
        }
    }
}

// =============================================================================
// Connector
// =============================================================================

struct Subscription {
    symbol: ExchangeSymbol,
    stop: CancellationToken,
    done: JoinHandle<()>,
}

#[derive(Default)]
struct ConnectorState {
    started: bool,
    subscriptions: Vec<Subscription>,
}

/// Binance connector with one socket per symbol.
pub struct BinanceConnector {
    endpoint: String,
    feed: FeedContext,
    state: Mutex<ConnectorState>,
}

impl BinanceConnector {
    /// Create a connector from its settings.
    #[must_use]
    pub fn new(settings: BinanceSettings, reporter: ErrorReporter) -> Self {
        Self {
            endpoint: settings.endpoint,
            feed: FeedContext::new(EXCHANGE, settings.mappings, reporter),
            state: Mutex::new(ConnectorState::default()),
        }
    }

    /// Stream URL for an exchange symbol.
    #[must_use]
    pub fn stream_url(&self, symbol: &str) -> String {
        format!(
            "{}/{}@trade",
            self.endpoint.trim_end_matches('/'),
            symbol.to_lowercase()
        )
    }

    /// Number of live symbol subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }
}

impl std::fmt::Debug for BinanceConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceConnector")
            .field("endpoint", &self.endpoint)
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for BinanceConnector {
    fn exchange(&self) -> &str {
        EXCHANGE
    }

    async fn consume_trades(
        &self,
        into: TradeSender,
        symbols: &[CanonicalSymbol],
    ) -> Result<(), ConnectorError> {
        {
            let mut state = self.state.lock();
            if state.started {
                return Err(ConnectorError::AlreadyStarted {
                    exchange: EXCHANGE.to_owned(),
                });
            }
            state.started = true;
        }

        for symbol in self.feed.to_exchange_all(symbols) {
            let url = self.stream_url(&symbol);
            let ws_stream = match dial(EXCHANGE, &url).await {
                Ok(ws_stream) => ws_stream,
                Err(e) => {
                    // Workers already running must not outlive a failed start.
                    if let Err(close_err) = self.close().await {
                        tracing::error!(error = %close_err, "Failed to stop partial subscriptions");
                    }
                    return Err(e);
                }
            };

            let stop = CancellationToken::new();
            let worker = SymbolWorker {
                feed: self.feed.clone(),
                symbol: symbol.clone(),
                tx: into.clone(),
                stop: stop.clone(),
            };
            let done = tokio::spawn(worker.run(ws_stream));

            tracing::info!(exchange = EXCHANGE, symbol = %symbol, "Subscribed to trade stream");
            self.state
                .lock()
                .subscriptions
                .push(Subscription { symbol, stop, done });
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        let subscriptions = std::mem::take(&mut self.state.lock().subscriptions);

        for subscription in &subscriptions {
            subscription.stop.cancel();
        }

        let mut failure = None;
        for subscription in subscriptions {
            if let Err(e) = subscription.done.await {
                failure = Some(ConnectorError::Shutdown {
                    exchange: EXCHANGE.to_owned(),
                    message: format!("{}: {e}", subscription.symbol),
                });
            }
        }

        failure.map_or(Ok(()), Err)
    }
}

// =============================================================================
// Symbol Worker
// =============================================================================

struct SymbolWorker {
    feed: FeedContext,
    symbol: ExchangeSymbol,
    tx: TradeSender,
    stop: CancellationToken,
}

impl SymbolWorker {
    async fn run(self, ws_stream: WsStream) {
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                () = self.stop.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    tracing::debug!(exchange = EXCHANGE, symbol = %self.symbol, "Trade stream stopped");
                    return;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let Some(trade) = decode_frame(&self.feed, &text) else {
                                continue;
                            };
                            if !self.feed.enqueue(&self.tx, trade, self.stop.cancelled()).await {
                                return;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                self.interrupted(e.to_string());
                                return;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            self.interrupted("server sent close frame".to_string());
                            return;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            self.interrupted(e.to_string());
                            return;
                        }
                        None => {
                            self.interrupted("stream ended".to_string());
                            return;
                        }
                    }
                }
            }
        }
    }

    fn interrupted(&self, reason: String) {
        tracing::error!(exchange = EXCHANGE, symbol = %self.symbol, reason = %reason, "Trade stream interrupted");
        self.feed.report(FeedErrorKind::Stream {
            reason: format!("{}: {reason}", self.symbol),
        });
    }
}
