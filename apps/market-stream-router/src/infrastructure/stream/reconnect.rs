//! Reconnection Policy
//!
//! Exponential backoff between stream attempts. The policy is explicit loop
//! state owned by one runner: `next_delay` hands out the current delay and
//! grows it, `reset` rewinds after an attempt that delivered data.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::StreamSettings;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Growth factor applied after each attempt.
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum consecutive attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::stream_default()
    }
}

impl ReconnectConfig {
    /// Stream backoff: 2s doubling up to 20s, no jitter, never gives up.
    #[must_use]
    pub const fn stream_default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(20),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    /// Create configuration from [`StreamSettings`].
    #[must_use]
    pub const fn from_settings(settings: &StreamSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: settings.reconnect_jitter,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Reconnection policy implementing exponential backoff with optional jitter.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use market_stream_router::infrastructure::stream::reconnect::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::stream_default());
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(4)));
///
/// // Data arrived again
/// policy.reset();
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Delay to wait before the next attempt.
    ///
    /// Returns `None` once the attempt limit has been reached.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.config.max_attempts > 0 && self.attempt_count >= self.config.max_attempts {
            return None;
        }

        self.attempt_count = self.attempt_count.saturating_add(1);

        let delay_with_jitter = self.apply_jitter(self.current_delay);

        #[allow(clippy::cast_precision_loss)]
        let scaled = (self.current_delay.as_millis() as f64 * self.config.multiplier).round();
        let next_millis = if scaled.is_finite() && scaled > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                scaled as u128
            }
        } else {
            0
        };
        let capped = next_millis.min(self.config.max_delay.as_millis());
        self.current_delay = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        Some(delay_with_jitter)
    }

    /// Rewind to the initial delay.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// Consecutive attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(1, 2 ; "first attempt")]
    #[test_case(2, 4 ; "second attempt")]
    #[test_case(3, 8 ; "third attempt")]
    #[test_case(4, 16 ; "fourth attempt")]
    #[test_case(5, 20 ; "fifth attempt is capped")]
    #[test_case(12, 20 ; "stays capped")]
    fn stream_default_delay_table(attempt: u32, expected_secs: u64) {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::stream_default());
        let mut delay = None;
        for _ in 0..attempt {
            delay = policy.next_delay();
        }
        assert_eq!(delay, Some(Duration::from_secs(expected_secs)));
    }

    #[test]
    fn default_is_stream_default() {
        assert_eq!(ReconnectConfig::default(), ReconnectConfig::stream_default());
    }

    #[test]
    fn from_settings_copies_values() {
        let settings = StreamSettings {
            reconnect_delay_initial: Duration::from_millis(100),
            reconnect_delay_max: Duration::from_millis(300),
            reconnect_jitter: 0.2,
            max_reconnect_attempts: 4,
            ..StreamSettings::default()
        };
        let config = ReconnectConfig::from_settings(&settings);

        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_millis(300));
        assert!((config.jitter_factor - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 4);
    }

    #[test]
    fn policy_max_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: 2,
            ..ReconnectConfig::stream_default()
        });

        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt_count(), 2);
    }

    #[test]
    fn policy_reset() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::stream_default());
        let _ = policy.next_delay();
        let _ = policy.next_delay();
        assert_eq!(policy.attempt_count(), 2);

        policy.reset();

        assert_eq!(policy.attempt_count(), 0);
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn policy_jitter_bounds() {
        for _ in 0..100 {
            let mut policy = ReconnectPolicy::new(ReconnectConfig {
                initial_delay: Duration::from_millis(1000),
                jitter_factor: 0.1,
                ..ReconnectConfig::stream_default()
            });

            let millis = policy.next_delay().unwrap().as_millis();
            assert!((900..=1100).contains(&millis), "delay {millis}ms out of bounds");
        }
    }

    #[test]
    fn unlimited_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::stream_default());
        for _ in 0..1000 {
            assert!(policy.next_delay().is_some());
        }
    }
}
