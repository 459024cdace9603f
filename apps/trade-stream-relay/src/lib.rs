#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Trade Stream Relay - Resilient Market Data Feed Relay
//!
//! Maintains a long-lived WebSocket session to an exchange trade stream,
//! decodes each trade frame into a validated event and forwards it to a
//! downstream sink. Transient network failures are absorbed with capped
//! exponential backoff; sink failures never stall reading.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `trade`: Validated trade events
//!
//! - **Application**: Port definitions
//!   - `ports`: Feed transport and sink interfaces
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: WebSocket transport, decoder, reader, supervisor
//!   - `sink`: Bounded forwarder and BigQuery adapter
//!   - `config`: Environment-driven configuration
//!   - `health`: Liveness HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Exchange WS ──► ConnectionSupervisor ──► StreamReader ──► decode_trade
//!                       ▲                       │                │
//!                       └──── session ended ────┘                ▼
//!                                                         SinkForwarder ──► TradeSink
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core trade types with no external dependencies.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::trade::{Symbol, TradeEvent, TradeEventError};

// Ports
pub use application::ports::{
    FeedConnection, FeedConnector, Frame, RawMessage, SinkError, TradeSink, TransportError,
};

// Infrastructure config
pub use infrastructure::config::{
    BigQueryCredentials, BigQuerySettings, ConfigError, FeedSettings, RelayConfig,
    ServerSettings, SinkSettings,
};

// Feed pipeline
pub use infrastructure::feed::{
    BackoffConfig, BackoffPolicy, ConnectionSupervisor, DecodeError, ReadOutcome, SessionSummary,
    StreamReader, SupervisorConfig, SupervisorError, WsConnection, WsConnector, decode_trade,
};

// Sink
pub use infrastructure::sink::{
    BigQuerySink, ForwarderConfig, ForwarderStatsSnapshot, SinkForwarder, TradeRow,
};

// Liveness server
pub use infrastructure::health::{HealthServerError, LivenessServer};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
