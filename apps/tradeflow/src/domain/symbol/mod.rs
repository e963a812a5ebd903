//! Symbol Mapping
//!
//! Translates between an exchange's native symbol spelling and the
//! canonical spelling used everywhere else. A mapping is built once from a
//! single exchange → canonical table; the inverse table is derived eagerly
//! and the pair is never mutated afterward.
//!
//! Symbols missing from the table translate to themselves in both
//! directions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};

use super::trade::{CanonicalSymbol, ExchangeSymbol};

// =============================================================================
// Errors
// =============================================================================

/// Errors building a [`SymbolMapping`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// Two exchange symbols map to the same canonical symbol.
    #[error("canonical symbol {canonical:?} is mapped from both {first:?} and {second:?}")]
    DuplicateCanonical {
        /// The ambiguous canonical symbol.
        canonical: CanonicalSymbol,
        /// First exchange symbol mapping to it.
        first: ExchangeSymbol,
        /// Second exchange symbol mapping to it.
        second: ExchangeSymbol,
    },
}

// =============================================================================
// Symbol Mapping
// =============================================================================

/// Bidirectional exchange/canonical symbol table.
///
/// Deserializes from, and serializes to, the forward table only, e.g.
/// `{"BTCUSDT": "BTC/USD"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<ExchangeSymbol, CanonicalSymbol>")]
pub struct SymbolMapping {
    forward: BTreeMap<ExchangeSymbol, CanonicalSymbol>,
    inverse: BTreeMap<CanonicalSymbol, ExchangeSymbol>,
}

impl SymbolMapping {
    /// Build a mapping from exchange → canonical pairs.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::DuplicateCanonical`] if two exchange symbols
    /// share a canonical symbol, since the inverse would be ambiguous.
    pub fn new<I, E, C>(table: I) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (E, C)>,
        E: Into<ExchangeSymbol>,
        C: Into<CanonicalSymbol>,
    {
        let forward: BTreeMap<ExchangeSymbol, CanonicalSymbol> = table
            .into_iter()
            .map(|(exchange, canonical)| (exchange.into(), canonical.into()))
            .collect();

        let mut inverse = BTreeMap::new();
        for (exchange, canonical) in &forward {
            if let Some(first) = inverse.insert(canonical.clone(), exchange.clone()) {
                return Err(MappingError::DuplicateCanonical {
                    canonical: canonical.clone(),
                    first,
                    second: exchange.clone(),
                });
            }
        }

        Ok(Self { forward, inverse })
    }

    /// Translate an exchange symbol to its canonical form.
    #[must_use]
    pub fn to_canonical(&self, symbol: &str) -> CanonicalSymbol {
        self.forward
            .get(symbol)
            .map_or_else(|| symbol.to_owned(), Clone::clone)
    }

    /// Translate a canonical symbol to this exchange's spelling.
    #[must_use]
    pub fn to_exchange(&self, symbol: &str) -> ExchangeSymbol {
        self.inverse
            .get(symbol)
            .map_or_else(|| symbol.to_owned(), Clone::clone)
    }

    /// Translate a batch of exchange symbols, preserving order and length.
    #[must_use]
    pub fn to_canonical_all<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<CanonicalSymbol> {
        symbols
            .iter()
            .map(|s| self.to_canonical(s.as_ref()))
            .collect()
    }

    /// Translate a batch of canonical symbols, preserving order and length.
    #[must_use]
    pub fn to_exchange_all<S: AsRef<str>>(&self, symbols: &[S]) -> Vec<ExchangeSymbol> {
        symbols
            .iter()
            .map(|s| self.to_exchange(s.as_ref()))
            .collect()
    }

    /// Number of configured pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether no pairs are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

impl TryFrom<BTreeMap<ExchangeSymbol, CanonicalSymbol>> for SymbolMapping {
    type Error = MappingError;

    fn try_from(table: BTreeMap<ExchangeSymbol, CanonicalSymbol>) -> Result<Self, Self::Error> {
        Self::new(table)
    }
}

impl Serialize for SymbolMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.forward.serialize(serializer)
    }
}
