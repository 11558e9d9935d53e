//! Auth subsystem configuration.
//!
//! Every timing used by the scheduler, the await-key protocol and the
//! refresh coordinator is configurable. Defaults reproduce the behaviour the
//! rest of the platform expects: one-second ticks, a five-second key wait
//! polled every second, and a thirty-second token wait.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default interval at which the scheduler checks refresh deadlines.
pub const DEFAULT_REFRESH_TICK: Duration = Duration::from_secs(1);

/// Default upper bound on waiting for a key while a refresh is due.
pub const DEFAULT_KEY_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval between key lookups while waiting.
pub const DEFAULT_KEY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default upper bound on waiting for a coalesced access token refresh.
pub const DEFAULT_TOKEN_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default capacity of the error stream returned by `Auth::start`.
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Auth subsystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// How often the scheduler compares the stored deadlines with the clock.
    pub refresh_tick: Duration,

    /// How long `await_key` keeps polling while a key refresh is due.
    pub key_wait_timeout: Duration,

    /// Interval between `await_key` polls.
    pub key_poll_interval: Duration,

    /// How long an outbound request waits for a coalesced token refresh.
    pub token_wait_timeout: Duration,

    /// Leeway applied to `exp`, `nbf` and `iat`.
    pub clock_skew: Duration,

    /// Buffer size of the error stream. A full buffer stalls the scheduler
    /// until the consumer drains it.
    pub error_channel_capacity: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_tick: DEFAULT_REFRESH_TICK,
            key_wait_timeout: DEFAULT_KEY_WAIT_TIMEOUT,
            key_poll_interval: DEFAULT_KEY_POLL_INTERVAL,
            token_wait_timeout: DEFAULT_TOKEN_WAIT_TIMEOUT,
            clock_skew: DEFAULT_CLOCK_SKEW,
            error_channel_capacity: DEFAULT_ERROR_CHANNEL_CAPACITY,
        }
    }
}

/// Parse an optional positive integer variable.
fn parse_positive(
    vars: &HashMap<String, String>,
    name: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(None);
    };

    let value: u64 = value_str
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue {
            name,
            reason: format!("must be a valid positive integer, got '{value_str}': {e}"),
        })?;

    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            reason: "must be greater than 0".to_string(),
        });
    }

    Ok(Some(value))
}

impl AuthConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparsable or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// Environment variables:
    /// - `AUTH_REFRESH_TICK_MS` (default: 1000)
    /// - `AUTH_KEY_WAIT_TIMEOUT_MS` (default: 5000)
    /// - `AUTH_KEY_POLL_INTERVAL_MS` (default: 1000)
    /// - `AUTH_TOKEN_WAIT_TIMEOUT_MS` (default: 30000)
    /// - `AUTH_CLOCK_SKEW_SECONDS` (default: 0, max: 600)
    /// - `AUTH_ERROR_CHANNEL_CAPACITY` (default: 1)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for unparsable or out-of-range values.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let millis = |name| {
            parse_positive(vars, name).map(|v| v.map(Duration::from_millis))
        };

        let refresh_tick = millis("AUTH_REFRESH_TICK_MS")?.unwrap_or(defaults.refresh_tick);
        let key_wait_timeout =
            millis("AUTH_KEY_WAIT_TIMEOUT_MS")?.unwrap_or(defaults.key_wait_timeout);
        let key_poll_interval =
            millis("AUTH_KEY_POLL_INTERVAL_MS")?.unwrap_or(defaults.key_poll_interval);
        let token_wait_timeout =
            millis("AUTH_TOKEN_WAIT_TIMEOUT_MS")?.unwrap_or(defaults.token_wait_timeout);

        // Zero is a legitimate skew, so this one is parsed separately
        let clock_skew = match vars.get("AUTH_CLOCK_SKEW_SECONDS") {
            Some(value_str) => {
                let value: u64 =
                    value_str
                        .trim()
                        .parse()
                        .map_err(|e| ConfigError::InvalidValue {
                            name: "AUTH_CLOCK_SKEW_SECONDS",
                            reason: format!("must be a valid integer, got '{value_str}': {e}"),
                        })?;
                Duration::from_secs(value)
            }
            None => defaults.clock_skew,
        };

        let error_channel_capacity = match parse_positive(vars, "AUTH_ERROR_CHANNEL_CAPACITY")? {
            Some(value) => usize::try_from(value).map_err(|e| ConfigError::InvalidValue {
                name: "AUTH_ERROR_CHANNEL_CAPACITY",
                reason: e.to_string(),
            })?,
            None => defaults.error_channel_capacity,
        };

        let config = Self {
            refresh_tick,
            key_wait_timeout,
            key_poll_interval,
            token_wait_timeout,
            clock_skew,
            error_channel_capacity,
        };
        config.validate()?;

        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("AUTH_REFRESH_TICK_MS", self.refresh_tick),
            ("AUTH_KEY_WAIT_TIMEOUT_MS", self.key_wait_timeout),
            ("AUTH_KEY_POLL_INTERVAL_MS", self.key_poll_interval),
            ("AUTH_TOKEN_WAIT_TIMEOUT_MS", self.token_wait_timeout),
        ];
        for (name, value) in positive {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    name,
                    reason: "must be greater than 0".to_string(),
                });
            }
        }

        if self.key_poll_interval > self.key_wait_timeout {
            return Err(ConfigError::InvalidValue {
                name: "AUTH_KEY_POLL_INTERVAL_MS",
                reason: format!(
                    "must not exceed AUTH_KEY_WAIT_TIMEOUT_MS ({} ms)",
                    self.key_wait_timeout.as_millis()
                ),
            });
        }

        if self.clock_skew > MAX_CLOCK_SKEW {
            return Err(ConfigError::InvalidValue {
                name: "AUTH_CLOCK_SKEW_SECONDS",
                reason: format!(
                    "must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    self.clock_skew.as_secs()
                ),
            });
        }

        if self.error_channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: "AUTH_ERROR_CHANNEL_CAPACITY",
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Set the await-key window and poll interval.
    #[must_use]
    pub fn with_key_wait(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.key_wait_timeout = timeout;
        self.key_poll_interval = poll_interval;
        self
    }

    /// Set the coalesced refresh wait.
    #[must_use]
    pub fn with_token_wait_timeout(mut self, timeout: Duration) -> Self {
        self.token_wait_timeout = timeout;
        self
    }

    /// Set the scheduler tick.
    #[must_use]
    pub fn with_refresh_tick(mut self, tick: Duration) -> Self {
        self.refresh_tick = tick;
        self
    }

    /// Set the clock skew leeway.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config, AuthConfig::default());
        assert_eq!(config.refresh_tick, Duration::from_secs(1));
        assert_eq!(config.key_wait_timeout, Duration::from_secs(5));
        assert_eq!(config.key_poll_interval, Duration::from_secs(1));
        assert_eq!(config.token_wait_timeout, Duration::from_secs(30));
        assert_eq!(config.clock_skew, Duration::ZERO);
        assert_eq!(config.error_channel_capacity, 1);
    }

    #[test]
    fn test_overrides() {
        let config = AuthConfig::from_vars(&vars(&[
            ("AUTH_REFRESH_TICK_MS", "250"),
            ("AUTH_KEY_WAIT_TIMEOUT_MS", "2000"),
            ("AUTH_KEY_POLL_INTERVAL_MS", "100"),
            ("AUTH_TOKEN_WAIT_TIMEOUT_MS", "10000"),
            ("AUTH_CLOCK_SKEW_SECONDS", "30"),
            ("AUTH_ERROR_CHANNEL_CAPACITY", "8"),
        ]))
        .unwrap();

        assert_eq!(config.refresh_tick, Duration::from_millis(250));
        assert_eq!(config.key_wait_timeout, Duration::from_secs(2));
        assert_eq!(config.key_poll_interval, Duration::from_millis(100));
        assert_eq!(config.token_wait_timeout, Duration::from_secs(10));
        assert_eq!(config.clock_skew, Duration::from_secs(30));
        assert_eq!(config.error_channel_capacity, 8);
    }

    #[test]
    fn test_rejects_non_numeric() {
        let err = AuthConfig::from_vars(&vars(&[("AUTH_REFRESH_TICK_MS", "fast")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "AUTH_REFRESH_TICK_MS", .. }
        ));
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let err =
            AuthConfig::from_vars(&vars(&[("AUTH_TOKEN_WAIT_TIMEOUT_MS", "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "AUTH_TOKEN_WAIT_TIMEOUT_MS", .. }
        ));
    }

    #[test]
    fn test_zero_clock_skew_is_allowed() {
        let config = AuthConfig::from_vars(&vars(&[("AUTH_CLOCK_SKEW_SECONDS", "0")])).unwrap();
        assert_eq!(config.clock_skew, Duration::ZERO);
    }

    #[test]
    fn test_rejects_excessive_clock_skew() {
        let err =
            AuthConfig::from_vars(&vars(&[("AUTH_CLOCK_SKEW_SECONDS", "601")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "AUTH_CLOCK_SKEW_SECONDS", .. }
        ));
    }

    #[test]
    fn test_rejects_poll_longer_than_wait() {
        let err = AuthConfig::from_vars(&vars(&[
            ("AUTH_KEY_WAIT_TIMEOUT_MS", "500"),
            ("AUTH_KEY_POLL_INTERVAL_MS", "1000"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "AUTH_KEY_POLL_INTERVAL_MS", .. }
        ));
    }

    #[test]
    fn test_builders_feed_validate() {
        let config = AuthConfig::default()
            .with_key_wait(Duration::from_millis(100), Duration::from_millis(10))
            .with_token_wait_timeout(Duration::from_millis(50))
            .with_refresh_tick(Duration::from_millis(20))
            .with_clock_skew(Duration::from_secs(5));
        assert!(config.validate().is_ok());

        let bad = AuthConfig::default().with_refresh_tick(Duration::ZERO);
        assert!(bad.validate().is_err());
    }
}
