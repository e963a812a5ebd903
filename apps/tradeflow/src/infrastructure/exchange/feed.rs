//! Per-connector decode context.
//!
//! Holds the exchange identifier, its symbol mapping and the error
//! reporter, and provides the tolerant field decoders every adapter uses.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::application::ports::{ErrorReporter, FeedErrorKind, TradeSender};
use crate::domain::symbol::SymbolMapping;
use crate::domain::trade::{CanonicalSymbol, ExchangeSymbol, Trade};
use crate::infrastructure::metrics;

/// Decode state shared by a connector and its workers.
#[derive(Debug, Clone)]
pub struct FeedContext {
    exchange: Arc<str>,
    mappings: Arc<SymbolMapping>,
    reporter: ErrorReporter,
}

impl FeedContext {
    /// Create a context for `exchange`.
    #[must_use]
    pub fn new(exchange: &str, mappings: SymbolMapping, reporter: ErrorReporter) -> Self {
        Self {
            exchange: Arc::from(exchange),
            mappings: Arc::new(mappings),
            reporter,
        }
    }

    /// Exchange identifier.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Exchange spelling of each canonical symbol.
    #[must_use]
    pub fn to_exchange_all(&self, symbols: &[CanonicalSymbol]) -> Vec<ExchangeSymbol> {
        self.mappings.to_exchange_all(symbols)
    }

    /// Canonical spelling of an exchange symbol.
    #[must_use]
    pub fn canonical(&self, symbol: &str) -> CanonicalSymbol {
        self.mappings.to_canonical(symbol)
    }

    /// Report a non-fatal problem.
    pub fn report(&self, kind: FeedErrorKind) {
        self.reporter.report(&self.exchange, kind);
    }

    /// Parse a decimal string, yielding `0.0` (and a report) on failure.
    #[must_use]
    pub fn number(&self, field: &'static str, raw: &str) -> f64 {
        let reason = match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => return value,
            Ok(value) => format!("non-finite value {value}"),
            Err(e) => e.to_string(),
        };

        self.report(FeedErrorKind::Decode {
            field,
            value: raw.to_owned(),
            reason,
        });
        0.0
    }

    /// Timestamp from epoch milliseconds, yielding the epoch on failure.
    #[must_use]
    pub fn timestamp_millis(&self, field: &'static str, millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(|| {
            self.report(FeedErrorKind::Decode {
                field,
                value: millis.to_string(),
                reason: "timestamp out of range".to_string(),
            });
            DateTime::<Utc>::UNIX_EPOCH
        })
    }

    /// Decimal field that may arrive as a string, a bare number, `null`, or
    /// not at all. Anything unusable yields `0.0` and a report.
    #[must_use]
    pub fn number_value(&self, field: &'static str, raw: &serde_json::Value) -> f64 {
        let reason = match raw {
            serde_json::Value::String(text) => return self.number(field, text),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(value) if value.is_finite() => return value,
                _ => "non-finite value".to_string(),
            },
            serde_json::Value::Null => "missing".to_string(),
            _ => "expected a decimal string".to_string(),
        };

        self.report(FeedErrorKind::Decode {
            field,
            value: raw.to_string(),
            reason,
        });
        0.0
    }

    /// Epoch-millisecond field as a JSON value, yielding the epoch on failure.
    #[must_use]
    pub fn timestamp_millis_value(&self, field: &'static str, raw: &serde_json::Value) -> DateTime<Utc> {
        let millis = match raw {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(text) => text.trim().parse().ok(),
            _ => None,
        };

        match millis {
            Some(millis) => self.timestamp_millis(field, millis),
            None => {
                self.report(FeedErrorKind::Decode {
                    field,
                    value: raw.to_string(),
                    reason: "expected epoch milliseconds".to_string(),
                });
                DateTime::<Utc>::UNIX_EPOCH
            }
        }
    }

    /// Timestamp from an RFC 3339 string, yielding the epoch on failure.
    #[must_use]
    pub fn timestamp_rfc3339(&self, field: &'static str, raw: Option<&str>) -> DateTime<Utc> {
        let reason = match raw.map(DateTime::parse_from_rfc3339) {
            Some(Ok(ts)) => return ts.with_timezone(&Utc),
            Some(Err(e)) => e.to_string(),
            None => "missing".to_string(),
        };

        self.report(FeedErrorKind::Decode {
            field,
            value: raw.unwrap_or_default().to_owned(),
            reason,
        });
        DateTime::<Utc>::UNIX_EPOCH
    }

    /// Enqueue a trade, giving up if `stop` fires while the channel is full.
    ///
    /// Returns `false` when the worker should exit: the ingestion channel
    /// is closed or the worker was told to stop.
    pub async fn enqueue(
        &self,
        tx: &TradeSender,
        trade: Trade,
        stop: impl Future<Output = ()>,
    ) -> bool {
        tokio::select! {
            biased;
            sent = tx.send(trade) => {
                if sent.is_err() {
                    tracing::debug!(exchange = %self.exchange, "Ingestion channel closed");
                    return false;
                }
                metrics::record_trade_received(&self.exchange);
                true
            }
            () = stop => false,
        }
    }
}
