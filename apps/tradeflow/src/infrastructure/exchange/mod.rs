//! Exchange Connectors
//!
//! Adapters implementing [`Connector`](crate::application::ports::Connector)
//! for live exchange trade feeds.
//!
//! - `binance`: one raw trade stream socket per symbol
//! - `coinbase`: one multiplexed ticker socket for all symbols
//! - `mock`: scripted events for tests and embedders
//!
//! All adapters decode through the same [`FeedContext`], so a bad numeric
//! field degrades to `0.0` and is reported instead of aborting the stream.

pub mod binance;
pub mod coinbase;
mod feed;
pub mod mock;
mod socket;

pub use binance::BinanceConnector;
pub use coinbase::CoinbaseConnector;
pub use feed::FeedContext;
pub use mock::{MockConnector, MockEvent};
