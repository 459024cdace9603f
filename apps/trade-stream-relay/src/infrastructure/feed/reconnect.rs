//! Reconnection Backoff
//!
//! Exponential backoff for feed reconnection. Deterministic by default:
//! the delay before failed attempt `n` is `min(initial * multiplier^(n-1), max)`.
//! Jitter is opt-in and never pushes a delay past `max_delay`.

use std::time::Duration;

use rand::Rng;

/// Configuration for backoff behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Growth factor applied after each failure.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.0 disables).
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl BackoffConfig {
    /// Create configuration from `FeedSettings`.
    #[must_use]
    pub const fn from_feed_settings(settings: &crate::FeedSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: settings.reconnect_jitter,
        }
    }
}

/// Backoff state owned by the connection supervisor.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use trade_stream_relay::infrastructure::feed::reconnect::{BackoffConfig, BackoffPolicy};
///
/// let mut policy = BackoffPolicy::new(BackoffConfig::default());
/// assert_eq!(policy.next_delay(), Duration::from_secs(1));
/// assert_eq!(policy.next_delay(), Duration::from_secs(2));
///
/// // Connection established
/// policy.reset();
/// assert_eq!(policy.next_delay(), Duration::from_secs(1));
/// ```
#[derive(Debug)]
pub struct BackoffPolicy {
    config: BackoffConfig,
    current_delay: Duration,
    failures: u32,
}

impl BackoffPolicy {
    /// Create a new policy starting at the initial delay.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            failures: 0,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);

        let delay = self.apply_jitter(self.current_delay);
        self.current_delay = self.grow(self.current_delay);
        delay
    }

    /// Return to the initial delay after a connection is established.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.failures = 0;
    }

    /// Delay the next failure will wait, before jitter.
    #[must_use]
    pub const fn current_delay(&self) -> Duration {
        self.current_delay
    }

    /// Consecutive failures since the last reset.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    fn grow(&self, delay: Duration) -> Duration {
        #[allow(clippy::cast_precision_loss)]
        let scaled = (delay.as_millis() as f64 * self.config.multiplier).round();
        let max_millis = self.config.max_delay.as_millis();

        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (scaled as u128).min(max_millis)
            }
        } else {
            max_millis
        };

        Duration::from_millis(u64::try_from(next_millis).unwrap_or(u64::MAX))
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);

        #[allow(clippy::cast_precision_loss)]
        let ceiling = self.config.max_delay.as_millis() as f64;
        let adjusted_millis = (base_millis + jitter).clamp(1.0, ceiling.max(1.0));

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn deterministic(initial_ms: u64, max_ms: u64) -> BackoffPolicy {
        BackoffPolicy::new(BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            jitter_factor: 0.0,
        })
    }

    #[test]
    fn default_config_values() {
        let config = BackoffConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert!(config.jitter_factor.abs() < f64::EPSILON);
    }

    #[test]
    fn doubles_until_capped() {
        let mut policy = BackoffPolicy::new(BackoffConfig::default());
        let delays: Vec<u64> = (0..9).map(|_| policy.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60, 60]);
        assert_eq!(policy.failures(), 9);
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut policy = deterministic(100, 10_000);
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.current_delay(), Duration::from_millis(400));

        policy.reset();

        assert_eq!(policy.failures(), 0);
        assert_eq!(policy.current_delay(), Duration::from_millis(100));
        assert_eq!(policy.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn never_exceeds_max_with_large_multiplier() {
        let mut policy = BackoffPolicy::new(BackoffConfig {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(2000),
            multiplier: 4.0,
            jitter_factor: 0.0,
        });
        assert_eq!(policy.next_delay(), Duration::from_millis(1000));
        assert_eq!(policy.next_delay(), Duration::from_millis(2000));
        assert_eq!(policy.next_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let mut policy = BackoffPolicy::new(BackoffConfig {
                initial_delay: Duration::from_millis(1000),
                max_delay: Duration::from_millis(1050),
                multiplier: 2.0,
                jitter_factor: 0.1,
            });

            let millis = policy.next_delay().as_millis();
            assert!(millis >= 900, "delay {millis}ms is below minimum 900ms");
            assert!(millis <= 1050, "delay {millis}ms is above max_delay");
        }
    }

    proptest! {
        #[test]
        fn delay_before_attempt_n_follows_capped_doubling(
            initial_ms in 1u64..5_000,
            max_factor in 1u64..200,
            attempts in 1usize..40,
        ) {
            let max_ms = initial_ms * max_factor;
            let mut policy = deterministic(initial_ms, max_ms);

            for n in 1..=attempts {
                let exponent = u32::try_from(n - 1).unwrap();
                let expected = initial_ms
                    .checked_mul(2u64.checked_pow(exponent).unwrap_or(u64::MAX))
                    .unwrap_or(u64::MAX)
                    .min(max_ms);
                prop_assert_eq!(policy.next_delay(), Duration::from_millis(expected));
            }

            policy.reset();
            prop_assert_eq!(policy.next_delay(), Duration::from_millis(initial_ms));
        }
    }
}
