//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Feed**: Connection attempts, connection state, disconnects, reconnects
//! - **Frames**: Frames received and decode failures by kind
//! - **Sink**: Events forwarded or dropped, write outcomes and latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the liveness server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Feed connection
    describe_counter!(
        "relay_connect_attempts_total",
        "Connection attempts to the upstream feed by outcome"
    );
    describe_gauge!(
        "relay_feed_connected",
        "Whether a feed session is currently open (0 or 1)"
    );
    describe_counter!(
        "relay_disconnects_total",
        "Feed sessions ended, by reason"
    );
    describe_counter!(
        "relay_reconnects_total",
        "Backoff waits taken before reconnecting"
    );

    // Frames
    describe_counter!(
        "relay_frames_received_total",
        "Data frames received from the feed"
    );
    describe_counter!(
        "relay_decode_errors_total",
        "Frames that could not be decoded into trade events, by kind"
    );

    // Sink
    describe_counter!(
        "relay_events_forwarded_total",
        "Trade events accepted into the sink queue"
    );
    describe_counter!(
        "relay_events_dropped_total",
        "Trade events dropped before reaching the sink, by reason"
    );
    describe_counter!(
        "relay_sink_writes_total",
        "Sink write attempts by outcome"
    );
    describe_histogram!(
        "relay_sink_write_seconds",
        "Latency of individual sink writes"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a connection attempt with its outcome.
pub fn record_connect_attempt(outcome: &'static str) {
    counter!("relay_connect_attempts_total", "outcome" => outcome).increment(1);
}

/// Update the feed connection state.
pub fn set_feed_connected(connected: bool) {
    gauge!("relay_feed_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record the end of a feed session.
pub fn record_disconnect(reason: &'static str) {
    counter!("relay_disconnects_total", "reason" => reason).increment(1);
}

/// Record a backoff wait before reconnecting.
pub fn record_reconnect() {
    counter!("relay_reconnects_total").increment(1);
}

/// Record a data frame received from the feed.
pub fn record_frame_received() {
    counter!("relay_frames_received_total").increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_error(kind: &'static str) {
    counter!("relay_decode_errors_total", "kind" => kind).increment(1);
}

/// Record an event accepted into the sink queue.
pub fn record_event_forwarded() {
    counter!("relay_events_forwarded_total").increment(1);
}

/// Record an event dropped before reaching the sink.
pub fn record_event_dropped(reason: &'static str) {
    counter!("relay_events_dropped_total", "reason" => reason).increment(1);
}

/// Record a sink write with its outcome.
pub fn record_sink_write(outcome: &'static str) {
    counter!("relay_sink_writes_total", "outcome" => outcome).increment(1);
}

/// Record sink write latency.
pub fn record_sink_write_duration(duration: Duration) {
    histogram!("relay_sink_write_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
