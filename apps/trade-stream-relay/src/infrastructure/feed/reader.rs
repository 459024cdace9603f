//! Stream Reader
//!
//! Drives one feed session: reads frames, decodes them and hands events to
//! the [`SinkForwarder`]. A read failure ends the session; a decode failure
//! only discards that frame.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use super::codec::{PAYLOAD_PREVIEW_BYTES, decode_trade, payload_preview};
use crate::application::ports::{FeedConnection, Frame, RawMessage, TransportError};
use crate::infrastructure::metrics;
use crate::infrastructure::sink::SinkForwarder;

/// Why a session ended.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Cancellation was requested.
    Cancelled,
    /// The peer closed the session.
    RemoteClosed,
    /// Reading failed or the session went idle.
    ReadFailed(TransportError),
}

impl ReadOutcome {
    /// Short label used for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::RemoteClosed => "remote_closed",
            Self::ReadFailed(TransportError::IdleTimeout(_)) => "idle_timeout",
            Self::ReadFailed(_) => "read_error",
        }
    }
}

/// Counters for one session.
#[derive(Debug)]
pub struct SessionSummary {
    /// How the session ended.
    pub outcome: ReadOutcome,
    /// Data frames read.
    pub frames: u64,
    /// Events handed to the forwarder.
    pub events: u64,
    /// Frames that failed to decode.
    pub decode_errors: u64,
}

/// Reads one connection until it becomes unusable.
#[derive(Debug)]
pub struct StreamReader<'a> {
    forwarder: &'a SinkForwarder,
    cancel: &'a CancellationToken,
    idle_timeout: Duration,
}

impl<'a> StreamReader<'a> {
    /// Create a reader.
    #[must_use]
    pub const fn new(
        forwarder: &'a SinkForwarder,
        cancel: &'a CancellationToken,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            forwarder,
            cancel,
            idle_timeout,
        }
    }

    /// Read `connection` until a read error, remote close or cancellation.
    ///
    /// The connection is closed before this returns.
    pub async fn run<C: FeedConnection>(&self, mut connection: C) -> SessionSummary {
        let mut summary = SessionSummary {
            outcome: ReadOutcome::Cancelled,
            frames: 0,
            events: 0,
            decode_errors: 0,
        };

        summary.outcome = loop {
            if self.cancel.is_cancelled() {
                break ReadOutcome::Cancelled;
            }

            let read = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break ReadOutcome::Cancelled,
                read = tokio::time::timeout(self.idle_timeout, connection.next_frame()) => read,
            };

            match read {
                Err(_) => break ReadOutcome::ReadFailed(TransportError::IdleTimeout(self.idle_timeout)),
                Ok(Err(e)) => break ReadOutcome::ReadFailed(e),
                Ok(Ok(None)) => break ReadOutcome::RemoteClosed,
                Ok(Ok(Some(Frame::Heartbeat))) => {
                    tracing::trace!("Heartbeat received");
                }
                Ok(Ok(Some(Frame::Data(raw)))) => {
                    summary.frames += 1;
                    if self.handle_frame(&raw).await {
                        summary.events += 1;
                    } else {
                        summary.decode_errors += 1;
                    }
                }
            }
        };

        connection.close().await;

        match &summary.outcome {
            ReadOutcome::Cancelled => tracing::info!("Feed reader cancelled"),
            ReadOutcome::RemoteClosed => tracing::info!(frames = summary.frames, "Feed closed by remote"),
            ReadOutcome::ReadFailed(e) => {
                tracing::warn!(error = %e, frames = summary.frames, "Feed read failed");
            }
        }

        summary
    }

    /// Decode and forward one frame. Returns `false` if the frame was discarded.
    async fn handle_frame(&self, raw: &RawMessage) -> bool {
        let observed_at = Utc::now();
        metrics::record_frame_received();

        match decode_trade(raw.as_bytes(), observed_at) {
            Ok(event) => {
                tracing::debug!(symbol = %event.symbol(), price = %event.price(), "Trade");
                self.forwarder.forward(event).await;
                true
            }
            Err(e) => {
                metrics::record_decode_error(e.kind());
                tracing::warn!(
                    error = %e,
                    payload = %payload_preview(raw.as_bytes(), PAYLOAD_PREVIEW_BYTES),
                    "Discarding undecodable frame"
                );
                false
            }
        }
    }
}
