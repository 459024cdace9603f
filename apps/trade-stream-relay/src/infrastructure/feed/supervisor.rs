//! Connection Supervisor
//!
//! Owns the feed connection lifecycle: connect, read until the session
//! breaks, back off, repeat. Runs until cancelled. The only error it returns
//! is a target address the transport rejects outright.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::reader::{ReadOutcome, StreamReader};
use super::reconnect::{BackoffConfig, BackoffPolicy};
use crate::application::ports::{FeedConnector, TransportError};
use crate::infrastructure::metrics;
use crate::infrastructure::sink::SinkForwarder;

/// Errors that stop the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The feed target is unusable; retrying would never succeed.
    #[error("invalid feed target: {0}")]
    InvalidTarget(String),
}

/// Supervisor tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorConfig {
    /// Backoff between failed attempts.
    pub backoff: BackoffConfig,
    /// Sessions shorter than this are followed by a fixed `initial_delay`
    /// pause instead of an immediate reconnect. Zero disables the throttle.
    pub min_stable_session: Duration,
    /// A session with no frames for this long is considered dead.
    pub idle_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            min_stable_session: Duration::ZERO,
            idle_timeout: Duration::from_secs(120),
        }
    }
}

impl SupervisorConfig {
    /// Create configuration from `FeedSettings`.
    #[must_use]
    pub const fn from_feed_settings(settings: &crate::FeedSettings) -> Self {
        Self {
            backoff: BackoffConfig::from_feed_settings(settings),
            min_stable_session: settings.min_stable_session,
            idle_timeout: settings.read_idle_timeout,
        }
    }
}

/// Keeps a feed session alive for the life of the process.
pub struct ConnectionSupervisor<C: FeedConnector> {
    connector: C,
    config: SupervisorConfig,
    policy: BackoffPolicy,
    forwarder: SinkForwarder,
    cancel: CancellationToken,
}

impl<C: FeedConnector> ConnectionSupervisor<C> {
    /// Create a supervisor.
    #[must_use]
    pub fn new(
        connector: C,
        config: SupervisorConfig,
        forwarder: SinkForwarder,
        cancel: CancellationToken,
    ) -> Self {
        let policy = BackoffPolicy::new(config.backoff.clone());
        Self {
            connector,
            config,
            policy,
            forwarder,
            cancel,
        }
    }

    /// Run until cancelled.
    ///
    /// The forwarder is dropped on return, which lets its writer drain and
    /// stop.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::InvalidTarget` if the connector rejects the
    /// feed address as unusable.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        let mut attempt: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            attempt += 1;
            tracing::info!(attempt, "Connecting to feed");

            let connected = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                connected = self.connector.connect() => connected,
            };

            let next = match connected {
                Ok(connection) => {
                    self.policy.reset();
                    metrics::record_connect_attempt("ok");
                    metrics::set_feed_connected(true);
                    tracing::info!(attempt, "Connected to feed");

                    let started = Instant::now();
                    let reader = StreamReader::new(&self.forwarder, &self.cancel, self.config.idle_timeout);
                    let summary = reader.run(connection).await;
                    let lifetime = started.elapsed();

                    metrics::set_feed_connected(false);
                    if matches!(summary.outcome, ReadOutcome::Cancelled) {
                        break;
                    }

                    metrics::record_disconnect(summary.outcome.as_str());
                    tracing::warn!(
                        reason = summary.outcome.as_str(),
                        frames = summary.frames,
                        events = summary.events,
                        decode_errors = summary.decode_errors,
                        session_secs = lifetime.as_secs_f64(),
                        "Feed session ended"
                    );

                    if lifetime < self.config.min_stable_session {
                        NextAttempt::Throttle
                    } else {
                        NextAttempt::Immediate
                    }
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(error = %e, "Feed target rejected, not retrying");
                    return Err(SupervisorError::InvalidTarget(e.to_string()));
                }
                Err(e) => {
                    metrics::record_connect_attempt(connect_failure_label(&e));
                    tracing::warn!(attempt, error = %e, "Feed connection failed");
                    NextAttempt::BackOff
                }
            };

            let proceed = match next {
                NextAttempt::Immediate => true,
                NextAttempt::Throttle => self.throttle(attempt).await,
                NextAttempt::BackOff => self.back_off(attempt).await,
            };
            if !proceed {
                break;
            }
        }

        if self.forwarder.is_enabled() {
            let stats = self.forwarder.stats();
            tracing::info!(
                accepted = stats.accepted,
                dropped = stats.dropped,
                written = stats.written,
                failed = stats.failed,
                "Sink forwarding totals"
            );
        }
        tracing::info!(attempts = attempt, "Connection supervisor stopped");
        Ok(())
    }

    /// Pause after a session that closed too quickly. Leaves the backoff
    /// policy untouched. Returns `false` if cancelled.
    async fn throttle(&self, attempt: u64) -> bool {
        let delay = self.config.backoff.initial_delay;
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis(),
            "Feed session was short lived, pausing before reconnect"
        );
        self.sleep_unless_cancelled(delay).await
    }

    /// Sleep for the next backoff delay. Returns `false` if cancelled.
    async fn back_off(&mut self, attempt: u64) -> bool {
        let delay = self.policy.next_delay();
        metrics::record_reconnect();
        tracing::info!(
            attempt,
            failures = self.policy.failures(),
            delay_ms = delay.as_millis(),
            "Retrying feed connection"
        );

        self.sleep_unless_cancelled(delay).await
    }

    async fn sleep_unless_cancelled(&self, delay: Duration) -> bool {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

/// What follows the current attempt.
enum NextAttempt {
    Immediate,
    Throttle,
    BackOff,
}

const fn connect_failure_label(err: &TransportError) -> &'static str {
    match err {
        TransportError::ConnectTimeout(_) => "timeout",
        _ => "error",
    }
}
