//! Coinbase Ticker Connector
//!
//! One socket carries every product. Trades are taken from the `ticker`
//! channel; `heartbeat` keeps the connection warm.
//!
//! # Protocol
//!
//! 1. Send `{"type":"subscribe","product_ids":[..],"channels":["heartbeat","ticker"]}`
//! 2. Wait for the `subscriptions` acknowledgment (or an `error` reply)
//! 3. Decode every `ticker` message into a trade
//!
//! # Shutdown
//!
//! `close` arms a short read deadline on the socket worker instead of
//! cancelling it outright. When the deadline expires the worker exits and
//! the expiry is logged at debug level; any other read failure is a real
//! network error.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

use super::feed::FeedContext;
use super::socket::{WsStream, dial};
use crate::application::ports::{
    Connector, ConnectorError, ErrorReporter, FeedErrorKind, TradeSender,
};
use crate::domain::trade::{CanonicalSymbol, ExchangeSymbol, Side, Trade};
use crate::infrastructure::config::CoinbaseSettings;

/// Exchange identifier.
pub const EXCHANGE: &str = "coinbase";

/// Production feed endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://ws-feed.exchange.coinbase.com";

/// Read deadline armed by `close`.
pub const CLOSE_READ_DEADLINE: Duration = Duration::from_millis(50);

const CHANNELS: [&str; 2] = ["heartbeat", "ticker"];

// =============================================================================
// Wire Types
// =============================================================================

/// Subscribe request.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest<'a> {
    /// Always `subscribe`.
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Exchange product IDs.
    pub product_ids: &'a [ExchangeSymbol],
    /// Channels to join.
    pub channels: [&'static str; 2],
}

impl<'a> SubscribeRequest<'a> {
    /// Request for `product_ids` on the heartbeat and ticker channels.
    #[must_use]
    pub const fn new(product_ids: &'a [ExchangeSymbol]) -> Self {
        Self {
            kind: "subscribe",
            product_ids,
            channels: CHANNELS,
        }
    }
}

/// Ticker message; one per match.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerMessage {
    /// Exchange product ID.
    pub product_id: String,
    /// Last trade price, normally a decimal string.
    #[serde(default)]
    pub price: serde_json::Value,
    /// Last trade size, normally a decimal string.
    #[serde(default)]
    pub last_size: serde_json::Value,
    /// Taker side (`buy` or `sell`).
    #[serde(default)]
    pub side: String,
    /// Trade time (RFC 3339).
    #[serde(default)]
    pub time: Option<String>,
}

impl TickerMessage {
    /// Coinbase's ticker `side` is the taker's side of the match: `sell`
    /// means an incoming sell order hit a resting bid, so the maker, and
    /// the liquidity provider, was the buyer. A `buy` taker lifted a resting
    /// ask, making the seller the maker.
    fn maker_side(&self) -> Side {
        if self.side == "sell" {
            Side::Buyer
        } else {
            Side::Seller
        }
    }

    fn into_trade(self, feed: &FeedContext) -> Trade {
        let side = self.maker_side();
        Trade::new(
            EXCHANGE,
            feed.timestamp_rfc3339("timestamp", self.time.as_deref()),
            feed.canonical(&self.product_id),
            feed.number_value("price", &self.price),
            feed.number_value("quantity", &self.last_size),
            side,
        )
    }
}

/// Messages received on the feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// Ticker update.
    Ticker(TickerMessage),
    /// Subscription acknowledgment.
    Subscriptions {},
    /// Heartbeat.
    Heartbeat {},
    /// Error reply.
    Error {
        /// Short message.
        #[serde(default)]
        message: String,
        /// Detailed reason.
        #[serde(default)]
        reason: String,
    },
    /// Any other message type.
    #[serde(other)]
    Unknown,
}

/// Decode one text frame into a trade.
///
/// Returns `None` for non-ticker frames and for frames that cannot be
/// interpreted (the latter are reported as malformed).
pub fn decode_frame(feed: &FeedContext, text: &str) -> Option<Trade> {
    match serde_json::from_str::<FeedMessage>(text) {
        Ok(FeedMessage::Ticker(ticker)) => Some(ticker.into_trade(feed)),
        Ok(FeedMessage::Error { message, reason }) => {
            feed.report(FeedErrorKind::Stream {
                reason: format!("{message}: {reason}"),
            });
            None
        }
        Ok(_) => None,
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

struct Session {
    deadline: watch::Sender<Option<Instant>>,
    done: JoinHandle<()>,
}

#[derive(Default)]
struct ConnectorState {
    started: bool,
    session: Option<Session>,
}

/// Coinbase connector with one multiplexed socket.
pub struct CoinbaseConnector {
    endpoint: String,
    subscribe_timeout: Duration,
    feed: FeedContext,
    state: Mutex<ConnectorState>,
}

impl CoinbaseConnector {
    /// Create a connector from its settings.
    #[must_use]
    pub fn new(settings: CoinbaseSettings, reporter: ErrorReporter) -> Self {
        Self {
            endpoint: settings.endpoint,
            subscribe_timeout: Duration::from_secs(settings.subscribe_timeout_secs),
            feed: FeedContext::new(EXCHANGE, settings.mappings, reporter),
            state: Mutex::new(ConnectorState::default()),
        }
    }

    /// Whether the socket worker is running.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state
            .lock()
            .session
            .as_ref()
            .is_some_and(|session| !session.done.is_finished())
    }

    fn subscribe_error(message: impl Into<String>) -> ConnectorError {
        ConnectorError::Subscribe {
            exchange: EXCHANGE.to_owned(),
            message: message.into(),
        }
    }

    async fn subscribe(
        &self,
        ws_stream: &mut WsStream,
        product_ids: &[ExchangeSymbol],
    ) -> Result<(), ConnectorError> {
        let request = serde_json::to_string(&SubscribeRequest::new(product_ids))
            .map_err(|e| Self::subscribe_error(e.to_string()))?;

        ws_stream
            .send(Message::Text(request.into()))
            .await
            .map_err(|e| Self::subscribe_error(e.to_string()))?;

        tokio::time::timeout(self.subscribe_timeout, Self::await_ack(ws_stream))
            .await
            .map_err(|_| Self::subscribe_error("timed out waiting for subscriptions ack"))?
    }

    async fn await_ack(ws_stream: &mut WsStream) -> Result<(), ConnectorError> {
        loop {
            match ws_stream.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<FeedMessage>(&text) {
                    Ok(FeedMessage::Subscriptions {}) => return Ok(()),
                    Ok(FeedMessage::Error { message, reason }) => {
                        return Err(Self::subscribe_error(format!("{message}: {reason}")));
                    }
                    Ok(_) | Err(_) => {}
                },
                Some(Ok(Message::Ping(data))) => {
                    ws_stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| Self::subscribe_error(e.to_string()))?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(Self::subscribe_error("connection closed before ack"));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(Self::subscribe_error(e.to_string())),
            }
        }
    }
}

impl std::fmt::Debug for CoinbaseConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinbaseConnector")
            .field("endpoint", &self.endpoint)
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for CoinbaseConnector {
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

        let product_ids = self.feed.to_exchange_all(symbols);
        let mut ws_stream = dial(EXCHANGE, &self.endpoint).await?;
        self.subscribe(&mut ws_stream, &product_ids).await?;
        tracing::info!(exchange = EXCHANGE, products = ?product_ids, "Subscribed to ticker channel");

        let (deadline, deadline_rx) = watch::channel(None);
        let worker = SocketWorker {
            feed: self.feed.clone(),
            tx: into,
            deadline: deadline_rx,
        };
        let done = tokio::spawn(worker.run(ws_stream));

        self.state.lock().session = Some(Session { deadline, done });
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        let Some(session) = self.state.lock().session.take() else {
            return Ok(());
        };

        session
            .deadline
            .send_replace(Some(Instant::now() + CLOSE_READ_DEADLINE));

        session.done.await.map_err(|e| ConnectorError::Shutdown {
            exchange: EXCHANGE.to_owned(),
            message: e.to_string(),
        })
    }
}

// =============================================================================
// Socket Worker
// =============================================================================

struct SocketWorker {
    feed: FeedContext,
    tx: TradeSender,
    deadline: watch::Receiver<Option<Instant>>,
}

impl SocketWorker {
    async fn run(mut self, ws_stream: WsStream) {
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                () = deadline_elapsed(&mut self.deadline) => {
                    tracing::debug!(exchange = EXCHANGE, "Read deadline reached after close");
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let Some(trade) = decode_frame(&self.feed, &text) else {
                                continue;
                            };
                            let stop = deadline_elapsed(&mut self.deadline);
                            if !self.feed.enqueue(&self.tx, trade, stop).await {
                                return;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                self.interrupted(&e.to_string());
                                return;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            self.interrupted("server sent close frame");
                            return;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            self.interrupted(&e.to_string());
                            return;
                        }
                        None => {
                            self.interrupted("stream ended");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn interrupted(&self, reason: &str) {
        tracing::error!(exchange = EXCHANGE, reason, "Ticker stream interrupted");
        self.feed.report(FeedErrorKind::Stream {
            reason: reason.to_owned(),
        });
    }
}

/// Resolves once a deadline has been armed and has passed.
async fn deadline_elapsed(deadline: &mut watch::Receiver<Option<Instant>>) {
    loop {
        let armed = *deadline.borrow_and_update();
        if let Some(at) = armed {
            tokio::time::sleep_until(at).await;
            return;
        }
        if deadline.changed().await.is_err() {
            // Connector dropped without closing: no deadline will ever come.
            std::future::pending::<()>().await;
        }
    }
}
