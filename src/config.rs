//! Stream and relay configuration.
//!
//! Both structures deserialize with serde so a host application can embed
//! them in its own configuration file (the demo server reads them from TOML).

use serde::Deserialize;
use std::time::Duration;

use crate::error::ConfigError;

/// Per-stream options.
///
/// `raw_data` disables the `id:`/`event:`/`data:` envelope entirely. When it
/// is set, `event` and `retry` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamOptions {
    /// Value of the `event:` field applied to every frame.
    pub event: Option<String>,

    /// Reconnection hint in milliseconds (`retry:` field).
    pub retry: Option<u64>,

    /// Send raw encoded bytes without the SSE envelope.
    #[serde(alias = "raw_data")]
    pub raw_data: bool,
}

impl StreamOptions {
    /// Enveloped options with no label.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for raw mode.
    pub fn raw() -> Self {
        Self {
            raw_data: true,
            ..Self::default()
        }
    }

    /// Set the event label.
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the retry hint in milliseconds.
    pub fn retry(mut self, millis: u64) -> Self {
        self.retry = Some(millis);
        self
    }

    /// Reject labels that would break frame boundaries.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(event) = &self.event {
            if event.contains(['\r', '\n']) {
                return Err(ConfigError::Invalid(format!(
                    "event label must be a single line: {:?}",
                    event
                )));
            }
        }
        Ok(())
    }
}

/// HTTP client settings for relaying upstream response bodies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// TCP connect timeout (seconds).
    pub connect_timeout_secs: u64,

    /// Overall request timeout (seconds). Zero disables it, which is what
    /// long-lived event streams usually want.
    pub timeout_secs: u64,

    /// Maximum idle connections per host in the pool.
    pub pool_max_idle_per_host: usize,

    /// User-Agent header sent upstream.
    pub user_agent: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            timeout_secs: 0,
            pool_max_idle_per_host: 32,
            user_agent: concat!("sse-stream/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RelayConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
