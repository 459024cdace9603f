//! Market Data Feed
//!
//! The connection lifecycle for the upstream trade feed:
//!
//! - **codec**: frame → `TradeEvent` decoding
//! - **reconnect**: exponential backoff policy
//! - **websocket**: `tokio-tungstenite` transport
//! - **reader**: per-session read/decode/forward loop
//! - **supervisor**: connect, read, back off, repeat

pub mod codec;
pub mod reader;
pub mod reconnect;
pub mod supervisor;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;

pub use codec::{DecodeError, decode_trade, payload_preview};
pub use reader::{ReadOutcome, SessionSummary, StreamReader};
pub use reconnect::{BackoffConfig, BackoffPolicy};
pub use supervisor::{ConnectionSupervisor, SupervisorConfig, SupervisorError};
pub use websocket::{WsConnection, WsConnector};
