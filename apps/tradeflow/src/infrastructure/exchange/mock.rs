//! Mock connector for testing.
//!
//! Replays a scripted list of exchange-native events through the same
//! decode path the live adapters use, then idles like a quiet feed until
//! closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::feed::FeedContext;
use crate::application::ports::{Connector, ConnectorError, ErrorReporter, TradeSender};
use crate::domain::symbol::SymbolMapping;
use crate::domain::trade::{CanonicalSymbol, ExchangeSymbol, Side, Trade};

/// One scripted exchange event with raw (undecoded) numeric fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockEvent {
    /// Exchange symbol.
    pub symbol: ExchangeSymbol,
    /// Raw price string.
    pub price: String,
    /// Raw quantity string.
    pub quantity: String,
    /// Liquidity-providing side.
    pub side: Side,
    /// Event time.
    pub timestamp: DateTime<Utc>,
}

impl MockEvent {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(
        symbol: impl Into<ExchangeSymbol>,
        price: impl Into<String>,
        quantity: impl Into<String>,
        side: Side,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price: price.into(),
            quantity: quantity.into(),
            side,
            timestamp: Utc::now(),
        }
    }

    /// Override the event time.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn to_trade(&self, feed: &FeedContext) -> Trade {
        Trade::new(
            feed.exchange(),
            self.timestamp,
            feed.canonical(&self.symbol),
            feed.number("price", &self.price),
            feed.number("quantity", &self.quantity),
            self.side,
        )
    }
}

#[derive(Default)]
struct MockState {
    started: bool,
    subscribed: Vec<ExchangeSymbol>,
    worker: Option<(CancellationToken, JoinHandle<usize>)>,
}

/// Mock connector for testing.
pub struct MockConnector {
    feed: FeedContext,
    events: Vec<MockEvent>,
    start_failure: Option<String>,
    subscribe_calls: Mutex<usize>,
    delivered: Arc<AtomicUsize>,
    state: Mutex<MockState>,
}

impl MockConnector {
    /// Create a mock connector for `exchange` with no mapping and no events.
    #[must_use]
    pub fn new(exchange: &str, reporter: ErrorReporter) -> Self {
        Self::with_mappings(exchange, SymbolMapping::default(), reporter)
    }

    /// Create a mock connector translating symbols through `mappings`.
    #[must_use]
    pub fn with_mappings(exchange: &str, mappings: SymbolMapping, reporter: ErrorReporter) -> Self {
        Self {
            feed: FeedContext::new(exchange, mappings, reporter),
            events: Vec::new(),
            start_failure: None,
            subscribe_calls: Mutex::new(0),
            delivered: Arc::new(AtomicUsize::new(0)),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Events to replay once started.
    #[must_use]
    pub fn with_events(mut self, events: Vec<MockEvent>) -> Self {
        self.events = events;
        self
    }

    /// Make `consume_trades` fail with a connect error.
    #[must_use]
    pub fn failing_start(mut self, message: impl Into<String>) -> Self {
        self.start_failure = Some(message.into());
        self
    }

    /// Exchange symbols of the subscription, empty if not started.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<ExchangeSymbol> {
        self.state.lock().subscribed.clone()
    }

    /// Number of subscriptions actually performed.
    #[must_use]
    pub fn subscribe_calls(&self) -> usize {
        *self.subscribe_calls.lock()
    }

    /// Number of trades accepted by the outbound channel so far.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.delivered.load(Ordering::SeqCst)
    }

    /// Whether the replay worker is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .worker
            .as_ref()
            .is_some_and(|(_, done)| !done.is_finished())
    }
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnector")
            .field("exchange", &self.feed.exchange())
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn exchange(&self) -> &str {
        self.feed.exchange()
    }

    async fn consume_trades(
        &self,
        into: TradeSender,
        symbols: &[CanonicalSymbol],
    ) -> Result<(), ConnectorError> {
        let mut state = self.state.lock();
        if state.started {
            return Err(ConnectorError::AlreadyStarted {
                exchange: self.feed.exchange().to_owned(),
            });
        }
        state.started = true;

        if let Some(message) = &self.start_failure {
            return Err(ConnectorError::Connect {
                exchange: self.feed.exchange().to_owned(),
                url: "mock://".to_owned(),
                message: message.clone(),
            });
        }

        *self.subscribe_calls.lock() += 1;
        state.subscribed = self.feed.to_exchange_all(symbols);

        let stop = CancellationToken::new();
        let done = tokio::spawn(replay(
            self.feed.clone(),
            self.events.clone(),
            into,
            Arc::clone(&self.delivered),
            stop.clone(),
        ));
        state.worker = Some((stop, done));
        drop(state);

        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        let Some((stop, done)) = self.state.lock().worker.take() else {
            return Ok(());
        };

        stop.cancel();
        let replayed = done.await.map_err(|e| ConnectorError::Shutdown {
            exchange: self.feed.exchange().to_owned(),
            message: e.to_string(),
        })?;

        tracing::debug!(exchange = self.feed.exchange(), replayed, "Mock connector closed");
        Ok(())
    }
}

async fn replay(
    feed: FeedContext,
    events: Vec<MockEvent>,
    tx: TradeSender,
    delivered: Arc<AtomicUsize>,
    stop: CancellationToken,
) -> usize {
    let mut replayed = 0;
    for event in &events {
        let trade = event.to_trade(&feed);
        if !feed.enqueue(&tx, trade, stop.cancelled()).await {
            return replayed;
        }
        replayed += 1;
        delivered.store(replayed, Ordering::SeqCst);
    }

    stop.cancelled().await;
    replayed
}
