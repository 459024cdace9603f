//! Trade Sink Adapters
//!
//! - `forwarder`: bounded, error-isolated handoff from the feed reader
//! - `bigquery`: BigQuery streaming-insert `TradeSink`
//! - `auth`: static or metadata-server bearer tokens for BigQuery

pub mod auth;
pub mod bigquery;
pub mod forwarder;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::TokenProvider;
pub use bigquery::{BigQuerySink, TradeRow};
pub use forwarder::{ForwarderConfig, ForwarderStatsSnapshot, SinkForwarder};
