//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Environment-driven configuration.
pub mod config;

/// Upstream feed: WebSocket transport, decoding, reading, reconnection.
pub mod feed;

/// Liveness HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Downstream sink: bounded forwarder and BigQuery adapter.
pub mod sink;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
