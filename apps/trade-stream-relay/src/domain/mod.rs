//! Domain Layer - Core market data types.
//!
//! This layer contains the normalized trade event the relay forwards.
//! It has no knowledge of WebSockets, HTTP or the analytics sink.

/// Normalized trade ticks.
pub mod trade;
