//! Reconnection Policy
//!
//! Capped exponential backoff with additive jitter for stream reconnects:
//!
//! ```text
//! delay(attempt) = min(base * 2^attempt, cap)
//! wait           = delay + uniform(0, jitter_factor * delay)
//! ```
//!
//! There is no attempt limit. The counter is shared by both channels and
//! resets whenever either channel connects.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub base_delay: Duration,
    /// Upper bound on the pre-jitter delay.
    pub max_delay: Duration,
    /// Jitter as a fraction of the delay, added on top (0.5 = up to +50%).
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2500),
            max_delay: Duration::from_millis(4500),
            jitter_factor: 0.5,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(base_delay: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter_factor,
        }
    }

    /// Delay for an attempt before jitter is applied.
    #[must_use]
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay for an attempt with jitter applied.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.capped_delay(attempt);
        if self.jitter_factor <= 0.0 {
            return delay;
        }

        let jitter_range = delay.as_secs_f64() * self.jitter_factor;
        let jitter: f64 = rand::rng().random_range(0.0..=jitter_range);
        delay + Duration::from_secs_f64(jitter)
    }
}

/// Reconnect attempt tracker.
///
/// # Example
///
/// ```rust
/// use candle_feed::infrastructure::stream::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig {
///     jitter_factor: 0.0,
///     ..ReconnectConfig::default()
/// });
///
/// assert_eq!(policy.next_delay(), Duration::from_millis(2500));
/// assert_eq!(policy.next_delay(), Duration::from_millis(4500));
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.next_delay(), Duration::from_millis(2500));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt. Advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.config.delay_for(self.attempt_count);
        self.attempt_count = self.attempt_count.saturating_add(1);
        delay
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts scheduled since the last successful connection.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}
