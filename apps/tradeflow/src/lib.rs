#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::panic
    )
)]

//! Tradeflow - Exchange Trade Normalization Relay
//!
//! Maintains live WebSocket connections to cryptocurrency exchange trade
//! feeds, translates every exchange-specific trade into one canonical
//! record, and fans the merged stream out to any number of sinks.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Canonical data contract
//!   - `trade`: The canonical trade record
//!   - `symbol`: Exchange ⇄ canonical symbol translation
//!
//! - **Application**: Ports and orchestration
//!   - `ports`: Connector, sink and feed-error contracts
//!   - `services`: Fan-out, registry, pipeline lifecycle
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `exchange`: Binance and Coinbase WebSocket connectors
//!   - `sink`: JSON-lines sinks (stdout, file)
//!   - `config`: JSON configuration with environment overrides
//!   - `metrics`, `telemetry`: Prometheus and tracing setup
//!
//! # Data Flow
//!
//! ```text
//! Binance WS (per symbol) ─┐                        ┌──► Sink 1
//!                          ├──► ingestion ──► fan-out ┤
//! Coinbase WS ─────────────┘     channel             └──► Sink N
//! ```
//!
//! With a single sink the fan-out is skipped and the sink reads the
//! ingestion channel directly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Canonical trade types with no I/O.
pub mod domain;

/// Application layer - Ports and pipeline services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::symbol::{MappingError, SymbolMapping};
pub use domain::trade::{CanonicalSymbol, ExchangeSymbol, Side, Trade};

// Ports
pub use application::ports::{
    Connector, ConnectorError, ErrorReporter, FeedError, FeedErrorKind, Sink, SinkError,
    TradeReceiver, TradeSender,
};

// Services
pub use application::services::{FanOut, Pipeline, PipelineError, Registry};

// Infrastructure config
pub use infrastructure::config::{
    BinanceSettings, CoinbaseSettings, ConfigError, Credentials, PipelineConfig, SinkSettings,
};

// Adapters (for integration tests and embedders)
pub use infrastructure::exchange::{BinanceConnector, CoinbaseConnector, MockConnector, MockEvent};
pub use infrastructure::sink::{FileSink, StdoutSink, WriterSink};

// Metrics
pub use infrastructure::metrics::{MetricsError, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
