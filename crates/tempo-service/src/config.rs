use std::time::Duration;

use tracing::warn;

use crate::retry::RetryPolicy;

/// Runtime configuration, read from the environment with defaults for
/// every knob. Connection strings are opaque to the core.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerServiceConfig {
    /// Cadence of the due-timer poll.
    pub poll_interval: Duration,
    /// Backoff applied around the command workflow before a nak.
    pub retry: RetryPolicy,
    /// Where the timer store lives.
    pub database_url: String,
}

impl Default for TimerServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            database_url: "sqlite::memory:".to_string(),
        }
    }
}

impl TimerServiceConfig {
    /// Read configuration from process environment variables:
    /// `TEMPO_POLL_INTERVAL_MS`, `TEMPO_RETRY_BASE_MS`,
    /// `TEMPO_RETRY_FACTOR`, `TEMPO_RETRY_MAX_ATTEMPTS`,
    /// `TEMPO_DATABASE_URL`. Unset or unparseable values fall back to
    /// defaults with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let default_retry = RetryPolicy::default();

        let poll_interval = parse_with(&lookup, "TEMPO_POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);
        let retry = RetryPolicy::new(
            parse_with(&lookup, "TEMPO_RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(default_retry.base_delay),
            parse_with(&lookup, "TEMPO_RETRY_FACTOR").unwrap_or(default_retry.factor),
            parse_with(&lookup, "TEMPO_RETRY_MAX_ATTEMPTS").unwrap_or(default_retry.max_attempts),
        );
        let database_url = lookup("TEMPO_DATABASE_URL").unwrap_or(defaults.database_url);

        Self {
            poll_interval,
            retry,
            database_url,
        }
    }
}

fn parse_with<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable configuration value");
            None
        }
    }
}
