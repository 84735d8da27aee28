//! Process configuration loaded from environment variables.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One year.
const MAX_INTERVAL_IN_MINUTES: i64 = 60 * 24 * 366;
/// One day.
const MAX_TICK_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: `{value}`")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Postgres URL; in-memory stores are used when absent.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// How often the scheduler polls for tasks and exports.
    pub poll_interval_ms: u64,
    /// How often the scheduler runs retry, abort, expiry and reexport sweeps.
    pub sweep_interval_ms: u64,
    pub retry_interval_in_minutes: i64,
    pub abort_interval_in_minutes: i64,
    pub reexport_interval_in_minutes: i64,
    /// Retry budget given to exported tasks.
    pub number_of_tries: u32,
    /// Upper bound on records handled per task name or status in one poll.
    pub batch_size: usize,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            poll_interval_ms: 500,
            sweep_interval_ms: 60_000,
            retry_interval_in_minutes: 10,
            abort_interval_in_minutes: 60,
            reexport_interval_in_minutes: 10,
            number_of_tries: 10,
            batch_size: 10,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by any of `DATABASE_URL`,
    /// `DATABASE_MAX_CONNECTIONS`, `POLL_INTERVAL_MS`, `SWEEP_INTERVAL_MS`,
    /// `RETRY_INTERVAL_IN_MINUTES`, `ABORT_INTERVAL_IN_MINUTES`,
    /// `REEXPORT_INTERVAL_IN_MINUTES`, `NUMBER_OF_TRIES`, `BATCH_SIZE` and
    /// `LOG_FILTER` (falling back to `RUST_LOG`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
                1..=u32::MAX,
            )?,
            poll_interval_ms: parse(
                &lookup,
                "POLL_INTERVAL_MS",
                defaults.poll_interval_ms,
                1..=MAX_TICK_MS,
            )?,
            sweep_interval_ms: parse(
                &lookup,
                "SWEEP_INTERVAL_MS",
                defaults.sweep_interval_ms,
                1..=MAX_TICK_MS,
            )?,
            retry_interval_in_minutes: parse(
                &lookup,
                "RETRY_INTERVAL_IN_MINUTES",
                defaults.retry_interval_in_minutes,
                1..=MAX_INTERVAL_IN_MINUTES,
            )?,
            abort_interval_in_minutes: parse(
                &lookup,
                "ABORT_INTERVAL_IN_MINUTES",
                defaults.abort_interval_in_minutes,
                1..=MAX_INTERVAL_IN_MINUTES,
            )?,
            reexport_interval_in_minutes: parse(
                &lookup,
                "REEXPORT_INTERVAL_IN_MINUTES",
                defaults.reexport_interval_in_minutes,
                1..=MAX_INTERVAL_IN_MINUTES,
            )?,
            number_of_tries: parse(
                &lookup,
                "NUMBER_OF_TRIES",
                defaults.number_of_tries,
                1..=u32::MAX,
            )?,
            batch_size: parse(&lookup, "BATCH_SIZE", defaults.batch_size, 1..=usize::MAX)?,
            log_filter: lookup("LOG_FILTER")
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or(defaults.log_filter),
        })
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_number_of_tries(mut self, number_of_tries: u32) -> Self {
        self.number_of_tries = number_of_tries;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// `name` parsed from the environment, or `default` when unset. Values
/// outside `range` are rejected like malformed ones.
fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.trim().parse() {
        Ok(parsed) if range.contains(&parsed) => Ok(parsed),
        _ => Err(ConfigError::Invalid { name, value }),
    }
}
