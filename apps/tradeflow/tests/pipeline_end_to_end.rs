//! Pipeline Integration Tests
//!
//! Drives scripted connectors through the orchestrator into real and
//! recording sinks, covering ordering, fan-out and degraded decodes.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use tradeflow::{
    CanonicalSymbol, ConfigError, Connector, ConnectorError, ErrorReporter, FeedErrorKind,
    MockConnector, MockEvent, Pipeline, PipelineConfig, Registry, Side, Sink, SinkError,
    SinkSettings, SymbolMapping, Trade, TradeReceiver, TradeSender, WriterSink,
};

const WAIT: Duration = Duration::from_secs(5);

type EventLog = Arc<Mutex<Vec<String>>>;

fn config(sinks: &[&str], capacity: usize) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.sources.enabled = vec!["mock".to_string()];
    config.sources.symbols = vec!["BTC/USD".to_string(), "ETH-USD".to_string()];
    config.sinks = sinks.iter().map(|kind| SinkSettings::of_kind(*kind)).collect();
    config.pipeline.channel_capacity = capacity;
    config
}

fn mock_registry(events: Vec<MockEvent>) -> Registry {
    let mappings = SymbolMapping::new([("BTC-USD", "BTC/USD")]).unwrap();
    Registry::new().with_connector("mock", move |_, reporter| {
        let connector: Arc<dyn Connector> = Arc::new(
            MockConnector::with_mappings("mock", mappings.clone(), reporter)
                .with_events(events.clone()),
        );
        Ok(connector)
    })
}

/// Sink that records every trade, optionally pausing after each one.
struct RecordingSink {
    kind: String,
    delay: Duration,
    seen: Arc<Mutex<Vec<Trade>>>,
    log: Option<EventLog>,
    worker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl RecordingSink {
    fn new(kind: &str, delay: Duration, seen: Arc<Mutex<Vec<Trade>>>) -> Self {
        Self {
            kind: kind.to_string(),
            delay,
            seen,
            log: None,
            worker: Mutex::new(None),
        }
    }

    fn logging_to(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn write_trades(&self, mut from: TradeReceiver) -> Result<(), SinkError> {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let seen = Arc::clone(&self.seen);
        let delay = self.delay;

        let done = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        while let Ok(trade) = from.try_recv() {
                            seen.lock().push(trade);
                        }
                        return;
                    }
                    trade = from.recv() => match trade {
                        Some(trade) => {
                            seen.lock().push(trade);
                            tokio::time::sleep(delay).await;
                        }
                        None => return,
                    },
                }
            }
        });

        *self.worker.lock() = Some((stop, done));
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        if let Some(log) = &self.log {
            log.lock().push(format!("sink {} closing", self.kind));
        }
        let Some((stop, done)) = self.worker.lock().take() else {
            return Ok(());
        };
        stop.cancel();
        done.await.map_err(|e| SinkError::Shutdown {
            kind: self.kind.clone(),
            message: e.to_string(),
        })
    }
}

/// Mock connector that notes in the log when its close has finished.
struct LoggedConnector {
    inner: Arc<MockConnector>,
    log: EventLog,
}

#[async_trait]
impl Connector for LoggedConnector {
    fn exchange(&self) -> &str {
        self.inner.exchange()
    }

    async fn consume_trades(
        &self,
        into: TradeSender,
        symbols: &[CanonicalSymbol],
    ) -> Result<(), ConnectorError> {
        self.inner.consume_trades(into, symbols).await
    }

    async fn close(&self) -> Result<(), ConnectorError> {
        self.inner.close().await?;
        self.log
            .lock()
            .push(format!("connector {} closed", self.inner.exchange()));
        Ok(())
    }
}

async fn wait_for_len(seen: &Mutex<Vec<Trade>>, len: usize) {
    timeout(WAIT, async {
        while seen.lock().len() < len {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sink did not receive every trade");
}

#[tokio::test]
async fn mock_trades_reach_a_json_lines_sink() {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let events = vec![
        MockEvent::new("BTC-USD", "100", "1", Side::Buyer).at(at),
        MockEvent::new("ETH-USD", "50", "2", Side::Seller).at(at),
    ];

    let (writer, reader) = tokio::io::duplex(64 * 1024);
    let writer = Mutex::new(Some(writer));
    let registry = mock_registry(events).with_sink("capture", move |_, _| {
        let writer = writer
            .lock()
            .take()
            .ok_or_else(|| ConfigError::Invalid("capture sink built twice".to_string()))?;
        let sink: Arc<dyn Sink> = Arc::new(WriterSink::new("capture", writer));
        Ok(sink)
    });

    let pipeline = Pipeline::start(&config(&["capture"], 1024), &registry)
        .await
        .unwrap();
    assert!(!pipeline.is_fanned_out());

    let mut lines = BufReader::new(reader).lines();
    let first = timeout(WAIT, lines.next_line()).await.unwrap().unwrap().unwrap();
    let second = timeout(WAIT, lines.next_line()).await.unwrap().unwrap().unwrap();

    assert!(first.starts_with(r#"{"source":"mock","timestamp":"2024-01-01T00:00:00Z","symbol":"BTC/USD""#), "{first}");

    let first: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(first["symbol"], "BTC/USD");
    assert_eq!(first["price"], 100.0);
    assert_eq!(first["quantity"], 1.0);
    assert_eq!(first["side"], "b");

    let second: serde_json::Value = serde_json::from_str(&second).unwrap();
    assert_eq!(second["symbol"], "ETH-USD");
    assert_eq!(second["price"], 50.0);
    assert_eq!(second["quantity"], 2.0);
    assert_eq!(second["side"], "s");

    timeout(WAIT, pipeline.shutdown()).await.unwrap().unwrap();
}

#[tokio::test]
async fn every_sink_sees_the_same_sequence_despite_a_slow_one() {
    let events: Vec<MockEvent> = (1..=40)
        .map(|n| MockEvent::new("BTC-USD", n.to_string(), "1", Side::Buyer))
        .collect();

    let fast = Arc::new(Mutex::new(Vec::new()));
    let slow = Arc::new(Mutex::new(Vec::new()));
    let (fast_seen, slow_seen) = (Arc::clone(&fast), Arc::clone(&slow));

    let registry = mock_registry(events)
        .with_sink("fast", move |_, _| {
            let sink: Arc<dyn Sink> =
                Arc::new(RecordingSink::new("fast", Duration::ZERO, Arc::clone(&fast_seen)));
            Ok(sink)
        })
        .with_sink("slow", move |_, _| {
            let sink: Arc<dyn Sink> = Arc::new(RecordingSink::new(
                "slow",
                Duration::from_millis(2),
                Arc::clone(&slow_seen),
            ));
            Ok(sink)
        });

    let pipeline = Pipeline::start(&config(&["fast", "slow"], 2), &registry)
        .await
        .unwrap();
    assert!(pipeline.is_fanned_out());
    assert_eq!(pipeline.sink_count(), 2);

    wait_for_len(&fast, 40).await;
    wait_for_len(&slow, 40).await;
    timeout(WAIT, pipeline.shutdown()).await.unwrap().unwrap();

    let expected: Vec<f64> = (1..=40).map(f64::from).collect();
    let prices = |seen: &Mutex<Vec<Trade>>| seen.lock().iter().map(Trade::price).collect::<Vec<_>>();
    assert_eq!(prices(&fast), expected);
    assert_eq!(prices(&slow), expected);
    assert_eq!(*fast.lock(), *slow.lock());
}

#[tokio::test]
async fn malformed_price_degrades_one_trade_only() {
    let (reporter, mut errors) = ErrorReporter::channel();
    let connector = MockConnector::new("mock", reporter).with_events(vec![
        MockEvent::new("BTC-USD", "100", "1", Side::Buyer),
        MockEvent::new("BTC-USD", "1O1", "1", Side::Buyer),
        MockEvent::new("BTC-USD", "102", "1", Side::Seller),
    ]);
    let (tx, mut rx) = mpsc::channel(8);

    connector
        .consume_trades(tx, &["BTC-USD".to_string()])
        .await
        .unwrap();

    let mut prices = Vec::new();
    for _ in 0..3 {
        let trade = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        prices.push(trade.price());
    }
    assert_eq!(prices, vec![100.0, 0.0, 102.0]);

    let error = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(error.exchange, "mock");
    match error.kind {
        FeedErrorKind::Decode { field, value, .. } => {
            assert_eq!(field, "price");
            assert_eq!(value, "1O1");
        }
        other => panic!("unexpected feed error: {other}"),
    }
    assert!(errors.try_recv().is_err());

    connector.close().await.unwrap();
}

#[tokio::test]
async fn file_sink_appends_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trades.jsonl");
    std::fs::write(&path, "previous\n").unwrap();

    let connector = MockConnector::new("mock", ErrorReporter::log_only()).with_events(vec![
        MockEvent::new("SOL-USD", "140.25", "3", Side::Seller),
        MockEvent::new("SOL-USD", "140.5", "1", Side::Buyer),
    ]);
    let sink = WriterSink::open(&path).unwrap();
    let (tx, rx) = mpsc::channel(8);

    sink.write_trades(rx).await.unwrap();
    connector
        .consume_trades(tx, &["SOL-USD".to_string()])
        .await
        .unwrap();

    timeout(WAIT, async {
        while std::fs::read_to_string(&path).unwrap().lines().count() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("file sink did not flush both trades");

    connector.close().await.unwrap();
    timeout(WAIT, sink.close()).await.unwrap().unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "previous");
    assert!(lines[1].contains(r#""price":140.25"#), "{}", lines[1]);
    assert!(lines[1].ends_with(r#""side":"s"}"#), "{}", lines[1]);
    assert!(lines[2].contains(r#""price":140.5"#), "{}", lines[2]);
}

fn scripted(exchange: &str, symbol: &str, count: u32) -> Arc<MockConnector> {
    let events = (1..=count)
        .map(|n| MockEvent::new(symbol, n.to_string(), "1", Side::Buyer))
        .collect();
    Arc::new(MockConnector::new(exchange, ErrorReporter::log_only()).with_events(events))
}

fn prices_of(seen: &Mutex<Vec<Trade>>, symbol: &str) -> Vec<f64> {
    seen.lock()
        .iter()
        .filter(|trade| trade.symbol() == symbol)
        .map(Trade::price)
        .collect()
}

#[tokio::test]
async fn shutdown_drains_queued_trades_in_order() {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let alpha = scripted("alpha", "AAA", 200);
    let beta = scripted("beta", "BBB", 200);
    let fast = Arc::new(Mutex::new(Vec::new()));
    let slow = Arc::new(Mutex::new(Vec::new()));

    let mut registry = Registry::new();
    for connector in [&alpha, &beta] {
        let (inner, log) = (Arc::clone(connector), Arc::clone(&log));
        registry = registry.with_connector(connector.exchange(), move |_, _| {
            let connector: Arc<dyn Connector> = Arc::new(LoggedConnector {
                inner: Arc::clone(&inner),
                log: Arc::clone(&log),
            });
            Ok(connector)
        });
    }
    for (kind, delay, seen) in [
        ("fast", Duration::ZERO, &fast),
        ("slow", Duration::from_millis(5), &slow),
    ] {
        let (seen, log) = (Arc::clone(seen), Arc::clone(&log));
        registry = registry.with_sink(kind, move |_, _| {
            let sink: Arc<dyn Sink> = Arc::new(
                RecordingSink::new(kind, delay, Arc::clone(&seen)).logging_to(Arc::clone(&log)),
            );
            Ok(sink)
        });
    }

    let mut config = config(&["fast", "slow"], 2);
    config.sources.enabled = vec!["alpha".to_string(), "beta".to_string()];
    let pipeline = Pipeline::start(&config, &registry).await.unwrap();

    // Shut down mid-stream: the slow sink holds up the fan-out, so trades
    // sit in the per-sink and ingestion channels.
    wait_for_len(&slow, 5).await;
    let seen_by_slow = slow.lock().len();
    timeout(WAIT, pipeline.shutdown()).await.unwrap().unwrap();

    let delivered = alpha.delivered() + beta.delivered();
    assert!(delivered > seen_by_slow, "{delivered} <= {seen_by_slow}");
    assert!(delivered < 400, "replay finished before shutdown");

    for (connector, symbol) in [(&alpha, "AAA"), (&beta, "BBB")] {
        let count = u32::try_from(connector.delivered()).unwrap();
        let expected: Vec<f64> = (1..=count).map(f64::from).collect();
        assert_eq!(prices_of(&fast, symbol), expected, "fast {symbol}");
        assert_eq!(prices_of(&slow, symbol), expected, "slow {symbol}");
    }
    assert_eq!(*fast.lock(), *slow.lock());

    let log = log.lock().clone();
    assert_eq!(log.len(), 4, "{log:?}");
    let last_connector = log.iter().rposition(|e| e.starts_with("connector")).unwrap();
    let first_sink = log.iter().position(|e| e.starts_with("sink")).unwrap();
    assert!(last_connector < first_sink, "{log:?}");
}
