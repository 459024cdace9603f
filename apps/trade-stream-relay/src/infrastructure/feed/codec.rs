//! Trade Frame Codec
//!
//! Decodes a single JSON trade frame into a [`TradeEvent`].
//!
//! Only two fields are read; everything else in the frame is ignored so the
//! codec keeps working as the feed grows new fields.
//!
//! ```json
//! {"e":"trade","E":1700000000000,"s":"BTCUSDT","t":1,"p":"42000.50","q":"0.01"}
//! ```

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::trade::{Symbol, TradeEvent, TradeEventError};

/// Default upper bound on payload bytes quoted in logs.
pub const PAYLOAD_PREVIEW_BYTES: usize = 256;

/// Decoder errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Payload was not a JSON object of the expected shape.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field was absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// The price string was not a decimal number.
    #[error("unparseable price {value:?}: {reason}")]
    InvalidPrice {
        /// Raw price text.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// Fields parsed but do not form a valid event.
    #[error("invalid trade: {0}")]
    InvalidEvent(#[from] TradeEventError),
}

impl DecodeError {
    /// Short label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Json(_) => "malformed",
            Self::MissingField(_) => "missing_field",
            Self::InvalidPrice { .. } => "invalid_price",
            Self::InvalidEvent(_) => "invalid_event",
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireTrade {
    #[serde(rename = "s")]
    symbol: Option<String>,
    #[serde(rename = "p")]
    price: Option<String>,
}

/// Decode one raw frame.
///
/// `observed_at` is stamped onto the event unchanged, which keeps this
/// function free of clocks and side effects.
///
/// # Errors
///
/// Returns a `DecodeError` if the frame is malformed, lacks `s` or `p`, or
/// carries an unparseable or negative price.
pub fn decode_trade(raw: &[u8], observed_at: DateTime<Utc>) -> Result<TradeEvent, DecodeError> {
    let wire: WireTrade = serde_json::from_slice(raw)?;

    let symbol = wire.symbol.ok_or(DecodeError::MissingField("s"))?;
    let price_text = wire.price.ok_or(DecodeError::MissingField("p"))?;

    let price = Decimal::from_str(price_text.trim()).map_err(|e| DecodeError::InvalidPrice {
        value: price_text.clone(),
        reason: e.to_string(),
    })?;

    Ok(TradeEvent::new(Symbol::new(symbol)?, price, observed_at)?)
}

/// Render at most `max_bytes` of a payload for diagnostics.
///
/// Invalid UTF-8 is replaced and truncation never splits a character.
#[must_use]
pub fn payload_preview(raw: &[u8], max_bytes: usize) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.len() <= max_bytes {
        return text.into_owned();
    }

    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... ({} bytes)", &text[..end], raw.len())
}
