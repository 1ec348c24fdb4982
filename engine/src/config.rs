//! Record options.

use std::env;
use std::time::Duration;

/// Timing options shared by every record a client opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOptions {
    /// Grace period between the last discard and the actual unsubscribe.
    pub discard_timeout: Duration,
    /// How long to wait for a read response before failing ready waiters.
    pub record_read_timeout: Duration,
    /// Minimum spacing between subscribe requests. `None` disables the limit.
    pub subscription_interval: Option<Duration>,
}

impl RecordOptions {
    /// Load options from environment variables, falling back to defaults.
    ///
    /// - `RECORD_DISCARD_TIMEOUT_MS`
    /// - `RECORD_READ_TIMEOUT_MS`
    /// - `RECORD_SUBSCRIPTION_INTERVAL_MS` (negative disables rate limiting)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let discard_timeout = match env::var("RECORD_DISCARD_TIMEOUT_MS") {
            Ok(value) => parse_millis("RECORD_DISCARD_TIMEOUT_MS", &value)?,
            Err(_) => defaults.discard_timeout,
        };

        let record_read_timeout = match env::var("RECORD_READ_TIMEOUT_MS") {
            Ok(value) => parse_millis("RECORD_READ_TIMEOUT_MS", &value)?,
            Err(_) => defaults.record_read_timeout,
        };

        let subscription_interval = match env::var("RECORD_SUBSCRIPTION_INTERVAL_MS") {
            Ok(value) => parse_interval("RECORD_SUBSCRIPTION_INTERVAL_MS", &value)?,
            Err(_) => defaults.subscription_interval,
        };

        Ok(Self {
            discard_timeout,
            record_read_timeout,
            subscription_interval,
        })
    }

    /// Sets the discard timeout.
    pub fn with_discard_timeout(mut self, timeout: Duration) -> Self {
        self.discard_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    pub fn with_record_read_timeout(mut self, timeout: Duration) -> Self {
        self.record_read_timeout = timeout;
        self
    }

    /// Sets or disables the subscription interval.
    pub fn with_subscription_interval(mut self, interval: Option<Duration>) -> Self {
        self.subscription_interval = interval;
        self
    }
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            discard_timeout: Duration::from_secs(5),
            record_read_timeout: Duration::from_secs(15),
            subscription_interval: Some(Duration::from_millis(100)),
        }
    }
}

fn parse_millis(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        })
}

/// Parse an interval in milliseconds where any negative value means "disabled".
fn parse_interval(var: &'static str, value: &str) -> Result<Option<Duration>, ConfigError> {
    let millis = value
        .trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidValue {
            var,
            value: value.to_string(),
        })?;

    Ok(u64::try_from(millis).ok().map(Duration::from_millis))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}")]
    InvalidValue { var: &'static str, value: String },
}
