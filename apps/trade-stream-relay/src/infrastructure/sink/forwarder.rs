//! Sink Forwarder
//!
//! Non-blocking handoff between the feed reader and the trade sink.
//!
//! Events go through a bounded queue drained by a single writer task, so
//! order is preserved and memory stays bounded. `forward` waits at most
//! `enqueue_timeout` for queue space and then drops the event. Sink failures
//! are logged and discarded inside the writer task; they never reach the
//! reader.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;

use crate::application::ports::TradeSink;
use crate::domain::trade::TradeEvent;
use crate::infrastructure::metrics;

/// Configuration for the forwarder queue and writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// Maximum events buffered between reader and writer.
    pub queue_capacity: usize,
    /// Longest `forward` waits for queue space before dropping.
    pub enqueue_timeout: Duration,
    /// Longest a single sink write may take.
    pub write_timeout: Duration,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            enqueue_timeout: Duration::from_millis(50),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl ForwarderConfig {
    /// Create configuration from `SinkSettings`.
    #[must_use]
    pub const fn from_sink_settings(settings: &crate::SinkSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity,
            enqueue_timeout: settings.enqueue_timeout,
            write_timeout: settings.write_timeout,
        }
    }
}

/// Forwarding counters.
#[derive(Debug, Default)]
pub struct ForwarderStats {
    accepted: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`ForwarderStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForwarderStatsSnapshot {
    /// Events queued for the writer.
    pub accepted: u64,
    /// Events dropped because the queue stayed full or was closed.
    pub dropped: u64,
    /// Events the sink stored.
    pub written: u64,
    /// Events the sink failed to store (error or timeout).
    pub failed: u64,
}

impl ForwarderStats {
    fn snapshot(&self) -> ForwarderStatsSnapshot {
        ForwarderStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Hands trade events to a background sink writer.
#[derive(Debug)]
pub struct SinkForwarder {
    tx: Option<mpsc::Sender<TradeEvent>>,
    enqueue_timeout: Duration,
    stats: Arc<ForwarderStats>,
}

impl SinkForwarder {
    /// A forwarder with no sink behind it. Every event is discarded silently.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            tx: None,
            enqueue_timeout: Duration::ZERO,
            stats: Arc::new(ForwarderStats::default()),
        }
    }

    /// Spawn the writer task for `sink` and return the forwarder feeding it.
    ///
    /// The writer drains remaining events and exits once the forwarder is
    /// dropped.
    #[must_use]
    pub fn spawn<S>(sink: Arc<S>, config: ForwarderConfig) -> (Self, JoinHandle<()>)
    where
        S: TradeSink + ?Sized + 'static,
    {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(ForwarderStats::default());

        let writer = tokio::spawn(run_writer(
            sink,
            rx,
            config.write_timeout,
            Arc::clone(&stats),
        ));

        let forwarder = Self {
            tx: Some(tx),
            enqueue_timeout: config.enqueue_timeout,
            stats,
        };
        (forwarder, writer)
    }

    /// Whether a sink is attached.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue `event` for the sink.
    ///
    /// Waits at most `enqueue_timeout`; on timeout the event is dropped.
    pub async fn forward(&self, event: TradeEvent) {
        let Some(tx) = &self.tx else {
            return;
        };

        match tx.send_timeout(event, self.enqueue_timeout).await {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_forwarded();
            }
            Err(SendTimeoutError::Timeout(event)) => {
                self.record_drop("queue_full");
                tracing::warn!(
                    symbol = %event.symbol(),
                    timeout_ms = self.enqueue_timeout.as_millis(),
                    "Sink queue full, dropping trade"
                );
            }
            Err(SendTimeoutError::Closed(event)) => {
                self.record_drop("writer_stopped");
                tracing::warn!(symbol = %event.symbol(), "Sink writer stopped, dropping trade");
            }
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> ForwarderStatsSnapshot {
        self.stats.snapshot()
    }

    fn record_drop(&self, reason: &'static str) {
        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        metrics::record_event_dropped(reason);
    }
}

async fn run_writer<S>(
    sink: Arc<S>,
    mut rx: mpsc::Receiver<TradeEvent>,
    write_timeout: Duration,
    stats: Arc<ForwarderStats>,
) where
    S: TradeSink + ?Sized,
{
    while let Some(event) = rx.recv().await {
        let started = Instant::now();
        let result = tokio::time::timeout(write_timeout, sink.insert(&event)).await;
        metrics::record_sink_write_duration(started.elapsed());

        match result {
            Ok(Ok(())) => {
                stats.written.fetch_add(1, Ordering::Relaxed);
                metrics::record_sink_write("ok");
            }
            Ok(Err(e)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                metrics::record_sink_write("error");
                tracing::warn!(error = %e, symbol = %event.symbol(), "Sink insert failed");
            }
            Err(_) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                metrics::record_sink_write("timeout");
                tracing::warn!(
                    symbol = %event.symbol(),
                    timeout_secs = write_timeout.as_secs_f64(),
                    "Sink insert timed out"
                );
            }
        }
    }

    tracing::debug!("Sink writer stopped");
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{MockTradeSink, SinkError};
    use crate::domain::trade::Symbol;
    use crate::infrastructure::sink::testing::{HangingSink, RecordingSink};

    fn trade(price: &str) -> TradeEvent {
        TradeEvent::new(
            Symbol::new("BTCUSDT").unwrap(),
            Decimal::from_str(price).unwrap(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn disabled_forwarder_is_a_no_op() {
        let forwarder = SinkForwarder::disabled();
        assert!(!forwarder.is_enabled());

        forwarder.forward(trade("1")).await;

        assert_eq!(forwarder.stats(), ForwarderStatsSnapshot::default());
    }

    #[tokio::test]
    async fn preserves_order() {
        let sink = Arc::new(RecordingSink::default());
        let (forwarder, writer) = SinkForwarder::spawn(Arc::clone(&sink), ForwarderConfig::default());

        assert!(forwarder.is_enabled());
        for i in 0..50 {
            forwarder.forward(trade(&i.to_string())).await;
        }
        let stats_handle = Arc::clone(&forwarder.stats);
        drop(forwarder);
        writer.await.unwrap();

        let stats = stats_handle.snapshot();
        assert_eq!(stats.accepted, 50);
        assert_eq!(stats.written, 50);
        assert_eq!(stats.dropped, 0);

        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(sink.prices(), expected);
    }

    #[tokio::test]
    async fn sink_errors_are_contained() {
        let mut sink = MockTradeSink::new();
        sink.expect_insert()
            .times(3)
            .returning(|_| Err(SinkError::Network("connection refused".into())));

        let (forwarder, writer) = SinkForwarder::spawn(Arc::new(sink), ForwarderConfig::default());
        for _ in 0..3 {
            forwarder.forward(trade("42000.50")).await;
        }
        let stats_handle = Arc::clone(&forwarder.stats);
        drop(forwarder);
        writer.await.unwrap();

        let stats = stats_handle.snapshot();
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.written, 0);
    }

    #[tokio::test]
    async fn sink_receives_the_forwarded_event() {
        let mut sink = MockTradeSink::new();
        sink.expect_insert()
            .withf(|event| {
                event.symbol().as_str() == "BTCUSDT"
                    && event.price() == Decimal::from_str("42000.50").unwrap()
            })
            .times(1)
            .returning(|_| Ok(()));

        let (forwarder, writer) = SinkForwarder::spawn(Arc::new(sink), ForwarderConfig::default());
        forwarder.forward(trade("42000.50")).await;
        drop(forwarder);
        writer.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_sink_never_blocks_beyond_enqueue_timeout() {
        let config = ForwarderConfig {
            queue_capacity: 4,
            enqueue_timeout: Duration::from_millis(10),
            write_timeout: Duration::from_secs(3600),
        };
        let (forwarder, _writer) = SinkForwarder::spawn(Arc::new(HangingSink), config);

        let total = 200;
        for i in 0..total {
            let started = tokio::time::Instant::now();
            forwarder.forward(trade(&i.to_string())).await;
            assert!(started.elapsed() <= Duration::from_millis(10));
        }

        let stats = forwarder.stats();
        assert_eq!(stats.accepted + stats.dropped, total);
        // One event is held by the writer, the rest fill the queue.
        assert!(stats.accepted <= 5, "accepted {}", stats.accepted);
        assert!(stats.dropped >= total - 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_writes_time_out_and_the_writer_moves_on() {
        let config = ForwarderConfig {
            queue_capacity: 8,
            enqueue_timeout: Duration::from_millis(10),
            write_timeout: Duration::from_secs(1),
        };
        let (forwarder, writer) = SinkForwarder::spawn(Arc::new(HangingSink), config);

        for i in 0..3 {
            forwarder.forward(trade(&i.to_string())).await;
        }
        let stats_handle = Arc::clone(&forwarder.stats);
        drop(forwarder);
        writer.await.unwrap();

        let stats = stats_handle.snapshot();
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.failed, 3);
    }
}
