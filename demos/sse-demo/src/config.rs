//! Demo configuration loading from TOML files and environment variables.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use sse_stream::{ConfigError, RelayConfig, StreamOptions};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub relay: RelayConfig,
    pub upstreams: UpstreamConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address for the demo server.
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
        }
    }
}

/// The timed `/source` stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Message sent on every tick.
    pub message: String,

    /// Delay between messages (milliseconds).
    pub interval_ms: u64,

    /// How long the stream stays open (milliseconds).
    pub duration_ms: u64,

    /// Label and mode of the stream.
    pub stream: StreamOptions,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            message: "hello world".to_string(),
            interval_ms: 500,
            duration_ms: 3000,
            stream: StreamOptions::new().event("hi").retry(1000),
        }
    }
}

impl SourceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Hosts `/relay` may fetch from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Allowed upstream host names. Anything else is refused.
    pub allowed_hosts: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: vec!["127.0.0.1".to_string(), "localhost".to_string()],
        }
    }
}

impl UpstreamConfig {
    /// Whether `url` is an http(s) URL on an allowed host.
    pub fn allows(&self, url: &reqwest::Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        url.host_str()
            .is_some_and(|host| self.allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)))
    }
}

/// Metrics/Prometheus configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint.
    pub enabled: bool,

    /// Listen address for metrics server.
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn").
    pub level: String,

    /// Output format: "pretty" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
                path: path.as_ref().display().to_string(),
                source,
            })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from file, then apply environment variable overrides.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "source.interval_ms must be greater than zero".to_string(),
            ));
        }
        self.source.stream.validate()
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SSE_DEMO_LISTEN_ADDR") {
            self.server.listen_addr = v;
        }

        if let Ok(v) = std::env::var("SSE_DEMO_MESSAGE") {
            self.source.message = v;
        }
        if let Ok(v) = std::env::var("SSE_DEMO_INTERVAL_MS") {
            if let Ok(n) = v.parse() {
                self.source.interval_ms = n;
            }
        }
        if let Ok(v) = std::env::var("SSE_DEMO_DURATION_MS") {
            if let Ok(n) = v.parse() {
                self.source.duration_ms = n;
            }
        }
        if let Ok(v) = std::env::var("SSE_DEMO_EVENT") {
            self.source.stream.event = Some(v);
        }

        if let Ok(v) = std::env::var("SSE_DEMO_ALLOWED_HOSTS") {
            self.upstreams.allowed_hosts = v
                .split(',')
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
        }

        if let Ok(v) = std::env::var("SSE_DEMO_METRICS_ENABLED") {
            self.metrics.enabled = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("SSE_DEMO_METRICS_ADDR") {
            self.metrics.listen_addr = v;
        }

        if let Ok(v) = std::env::var("SSE_DEMO_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("SSE_DEMO_LOG_FORMAT") {
            self.logging.format = v;
        }
    }
}
