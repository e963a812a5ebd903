//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics in Prometheus format.
//!
//! # Metrics
//!
//! - `tradeflow_trades_received_total{exchange}`: trades enqueued by connectors
//! - `tradeflow_feed_errors_total{exchange,kind}`: non-fatal feed errors
//! - `tradeflow_trades_written_total{sink}`: trades emitted by sinks
//! - `tradeflow_connectors_active`: connectors currently streaming
//! - `tradeflow_sinks_active`: sinks currently consuming
//!
//! Recording before [`init_metrics`] is a no-op, so library code records
//! unconditionally.

use std::net::{Ipv4Addr, SocketAddr};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::application::ports::FeedError;

/// Error type for metrics operations.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Failed to install the exporter (e.g. port already in use).
    #[error("metrics installation error: {0}")]
    Installation(String),
}

/// Start the Prometheus exporter with an HTTP listener on `0.0.0.0:{port}`.
///
/// Metrics are served at `/metrics`.
///
/// # Errors
///
/// Returns an error if the exporter fails to start.
pub fn init_metrics(port: u16) -> Result<SocketAddr, MetricsError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;

    register_metrics();
    tracing::info!(addr = %addr, "Prometheus metrics exporter started");

    Ok(addr)
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "tradeflow_trades_received_total",
        "Total trades decoded and enqueued by exchange connectors"
    );
    describe_counter!(
        "tradeflow_feed_errors_total",
        "Total non-fatal feed errors by exchange and kind"
    );
    describe_counter!(
        "tradeflow_trades_written_total",
        "Total trades written by sinks"
    );
    describe_gauge!(
        "tradeflow_connectors_active",
        "Number of started exchange connectors"
    );
    describe_gauge!("tradeflow_sinks_active", "Number of started sinks");
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a trade enqueued by a connector.
pub fn record_trade_received(exchange: &str) {
    counter!(
        "tradeflow_trades_received_total",
        "exchange" => exchange.to_string()
    )
    .increment(1);
}

/// Record a non-fatal feed error.
pub fn record_feed_error(error: &FeedError) {
    counter!(
        "tradeflow_feed_errors_total",
        "exchange" => error.exchange.clone(),
        "kind" => error.kind.label()
    )
    .increment(1);
}

/// Record a trade written by a sink.
pub fn record_trade_written(sink: &str) {
    counter!(
        "tradeflow_trades_written_total",
        "sink" => sink.to_string()
    )
    .increment(1);
}

/// Update the started connector count.
#[allow(clippy::cast_precision_loss)]
pub fn set_connectors_active(count: usize) {
    gauge!("tradeflow_connectors_active").set(count as f64);
}

/// Update the started sink count.
#[allow(clippy::cast_precision_loss)]
pub fn set_sinks_active(count: usize) {
    gauge!("tradeflow_sinks_active").set(count as f64);
}
