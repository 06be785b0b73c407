//! Router Configuration Settings
//!
//! Configuration types for the stream router, loaded from environment variables.

use std::time::Duration;

/// Per-stream connection and buffering settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Capacity of each stream's internal output queue.
    pub output_queue_capacity: usize,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter applied to each delay as a fraction (0 = deterministic).
    pub reconnect_jitter: f64,
    /// Maximum consecutive reconnection attempts (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            output_queue_capacity: 1_024,
            reconnect_delay_initial: Duration::from_secs(2),
            reconnect_delay_max: Duration::from_secs(20),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Capacity of the shared inbound-event queue.
    pub event_queue_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            event_queue_capacity: 4_096,
        }
    }
}

/// Complete router configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouterConfig {
    /// Stream settings shared by every runner.
    pub stream: StreamSettings,
    /// Dispatcher settings.
    pub dispatch: DispatchSettings,
}

impl RouterConfig {
    /// Create configuration from environment variables.
    ///
    /// Unset or unparseable variables fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let stream_defaults = StreamSettings::default();
        let stream = StreamSettings {
            output_queue_capacity: parse_or(
                &lookup,
                "STREAM_ROUTER_OUTPUT_QUEUE_CAPACITY",
                stream_defaults.output_queue_capacity,
            ),
            reconnect_delay_initial: parse_millis_or(
                &lookup,
                "STREAM_ROUTER_RECONNECT_DELAY_INITIAL_MS",
                stream_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_millis_or(
                &lookup,
                "STREAM_ROUTER_RECONNECT_DELAY_MAX_MS",
                stream_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_or(
                &lookup,
                "STREAM_ROUTER_RECONNECT_DELAY_MULTIPLIER",
                stream_defaults.reconnect_delay_multiplier,
            ),
            reconnect_jitter: parse_or(
                &lookup,
                "STREAM_ROUTER_RECONNECT_JITTER",
                stream_defaults.reconnect_jitter,
            ),
            max_reconnect_attempts: parse_or(
                &lookup,
                "STREAM_ROUTER_MAX_RECONNECT_ATTEMPTS",
                stream_defaults.max_reconnect_attempts,
            ),
        };

        let dispatch = DispatchSettings {
            event_queue_capacity: parse_or(
                &lookup,
                "STREAM_ROUTER_EVENT_QUEUE_CAPACITY",
                DispatchSettings::default().event_queue_capacity,
            ),
        };

        let config = Self { stream, dispatch };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.output_queue_capacity == 0 {
            return Err(invalid("STREAM_ROUTER_OUTPUT_QUEUE_CAPACITY", "must be at least 1"));
        }
        if self.dispatch.event_queue_capacity == 0 {
            return Err(invalid("STREAM_ROUTER_EVENT_QUEUE_CAPACITY", "must be at least 1"));
        }
        let multiplier = self.stream.reconnect_delay_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(invalid(
                "STREAM_ROUTER_RECONNECT_DELAY_MULTIPLIER",
                "must be at least 1.0",
            ));
        }
        if !(0.0..1.0).contains(&self.stream.reconnect_jitter) {
            return Err(invalid("STREAM_ROUTER_RECONNECT_JITTER", "must be in [0, 1)"));
        }
        if self.stream.reconnect_delay_max < self.stream.reconnect_delay_initial {
            return Err(invalid(
                "STREAM_ROUTER_RECONNECT_DELAY_MAX_MS",
                "must not be below the initial delay",
            ));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A setting is outside its valid range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Load `.env` from the current directory or the nearest ancestor that has one.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_millis_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
