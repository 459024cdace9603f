//! Trade Events
//!
//! The normalized tick the relay republishes. A `TradeEvent` can only be
//! built through [`TradeEvent::new`], so every event that reaches the sink
//! carries a non-empty symbol and a non-negative price.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Exchange-assigned instrument identifier (e.g. `BTCUSDT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, rejecting empty or whitespace-only identifiers.
    ///
    /// # Errors
    ///
    /// Returns `TradeEventError::EmptySymbol` if `value` is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, TradeEventError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(TradeEventError::EmptySymbol);
        }
        Ok(Self(value))
    }

    /// Get the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized trade tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeEvent {
    symbol: Symbol,
    price: Decimal,
    observed_at: DateTime<Utc>,
}

impl TradeEvent {
    /// Create a trade event.
    ///
    /// `observed_at` is the wall-clock time the frame was received; the feed's
    /// own event time is not relied upon.
    ///
    /// # Errors
    ///
    /// Returns `TradeEventError::NegativePrice` if `price` is below zero.
    pub fn new(
        symbol: Symbol,
        price: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, TradeEventError> {
        if price.is_sign_negative() && !price.is_zero() {
            return Err(TradeEventError::NegativePrice(price));
        }
        Ok(Self {
            symbol,
            price,
            observed_at,
        })
    }

    /// Instrument symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Trade price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Receipt timestamp.
    #[must_use]
    pub const fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }
}

/// Validation errors for trade events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TradeEventError {
    /// Symbol was empty.
    #[error("symbol cannot be empty")]
    EmptySymbol,
    /// Price was negative.
    #[error("price cannot be negative: {0}")]
    NegativePrice(Decimal),
}
