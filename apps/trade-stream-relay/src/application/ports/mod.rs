//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedConnector` / `FeedConnection`: transport sessions to the market data feed
//! - `TradeSink`: the downstream analytics store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::trade::TradeEvent;

// =============================================================================
// Feed Transport
// =============================================================================

/// Opaque payload of a single data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage(Vec<u8>);

impl RawMessage {
    /// Payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for RawMessage {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for RawMessage {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

/// One unit read from a feed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A data frame to be decoded.
    Data(RawMessage),
    /// Control traffic (ping/pong). Proves the peer is alive, carries no data.
    Heartbeat,
}

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The target address itself is unusable. Retrying cannot help.
    #[error("invalid feed target: {0}")]
    InvalidTarget(String),

    /// Establishing the session failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Establishing the session did not finish in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Reading from an established session failed.
    #[error("read failed: {0}")]
    Read(String),

    /// No frame (data or heartbeat) arrived within the idle timeout.
    #[error("no frames received for {0:?}")]
    IdleTimeout(Duration),
}

impl TransportError {
    /// Whether the error reflects bad configuration rather than a transient fault.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidTarget(_))
    }
}

/// Establishes sessions with the market data feed.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Session type produced by this connector.
    type Connection: FeedConnection;

    /// Open a new session.
    async fn connect(&self) -> Result<Self::Connection, TransportError>;
}

#[async_trait]
impl<T: FeedConnector + ?Sized> FeedConnector for Arc<T> {
    type Connection = T::Connection;

    async fn connect(&self) -> Result<Self::Connection, TransportError> {
        (**self).connect().await
    }
}

/// One established feed session.
#[async_trait]
pub trait FeedConnection: Send {
    /// Wait for the next frame.
    ///
    /// Returns `Ok(None)` once the peer has closed the session.
    async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError>;

    /// Close the session. Must be safe to call more than once.
    async fn close(&mut self);
}

// =============================================================================
// Trade Sink
// =============================================================================

/// Errors reported by a trade sink.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The request never completed.
    #[error("sink network error: {0}")]
    Network(String),

    /// The sink answered with a non-success status.
    #[error("sink returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The sink accepted the request but rejected the row.
    #[error("sink rejected row: {0}")]
    Rejected(String),
}

/// Downstream store receiving one row per trade event.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeSink: Send + Sync {
    /// Insert a single event.
    async fn insert(&self, event: &TradeEvent) -> Result<(), SinkError>;
}
