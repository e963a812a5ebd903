//! Application Ports (Driven)
//!
//! Ports define the contracts the pipeline drives. Infrastructure
//! adapters implement them.
//! - **Connector**: a live exchange feed producing canonical trades
//! - **Sink**: a consumer that emits the merged trade stream externally
//! - **Feed errors**: the non-fatal error channel connectors report into

mod connector_port;
mod feed_error_port;
mod sink_port;

pub use connector_port::{Connector, ConnectorError, TradeReceiver, TradeSender};
pub use feed_error_port::{ErrorReporter, FeedError, FeedErrorKind, FeedErrorReceiver};
pub use sink_port::{Sink, SinkError};
