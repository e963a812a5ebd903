//! Canonical Trade Model
//!
//! Every exchange connector decodes its native events into a [`Trade`] and
//! every sink consumes [`Trade`] values. Symbols carried by a trade are
//! always canonical; exchange spellings never leave a connector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Symbols
// =============================================================================

/// A symbol in the system-wide spelling (e.g. `BTC/USD`).
pub type CanonicalSymbol = String;

/// A symbol as a specific exchange spells it (e.g. `BTCUSDT`, `BTC-USD`).
pub type ExchangeSymbol = String;

// =============================================================================
// Side
// =============================================================================

/// The party that provided liquidity for a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The buyer was the resting (maker) order.
    #[serde(rename = "b")]
    Buyer,
    /// The seller was the resting (maker) order.
    #[serde(rename = "s")]
    Seller,
}

impl Side {
    /// Side from a "buyer is maker" flag, as exchanges commonly report it.
    #[must_use]
    pub const fn from_buyer_is_maker(buyer_is_maker: bool) -> Self {
        if buyer_is_maker {
            Self::Buyer
        } else {
            Self::Seller
        }
    }

    /// Single-letter wire code (`b` or `s`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buyer => "b",
            Self::Seller => "s",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Trade
// =============================================================================

/// A single executed trade in canonical form.
///
/// Fields are private so a trade cannot change after the connector that
/// decoded it hands it off. Serialization keeps the field order
/// `source, timestamp, symbol, price, quantity, side`, which is the line
/// format sinks emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    source: String,
    timestamp: DateTime<Utc>,
    symbol: CanonicalSymbol,
    price: f64,
    quantity: f64,
    side: Side,
}

impl Trade {
    /// Create a trade.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        timestamp: DateTime<Utc>,
        symbol: impl Into<CanonicalSymbol>,
        price: f64,
        quantity: f64,
        side: Side,
    ) -> Self {
        Self {
            source: source.into(),
            timestamp,
            symbol: symbol.into(),
            price,
            quantity,
            side,
        }
    }

    /// Exchange identifier the trade came from (e.g. `binance`).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Exchange-reported event time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Canonical symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Execution price at exchange-native precision.
    #[must_use]
    pub const fn price(&self) -> f64 {
        self.price
    }

    /// Executed quantity.
    #[must_use]
    pub const fn quantity(&self) -> f64 {
        self.quantity
    }

    /// Liquidity-providing side.
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }
}
