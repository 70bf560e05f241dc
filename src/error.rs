//! Error types for stream producers and configuration.
//!
//! None of these ever reach an SSE consumer: a failing producer only ends
//! the stream early. They exist so producers, the relay client and option
//! loading can report what went wrong to the host application and its logs.

use std::io;
use thiserror::Error;

/// Result type alias for producer and relay operations.
pub type Result<T> = std::result::Result<T, ProducerError>;

/// Errors raised by the source driving a stream.
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ProducerError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProducerError::Http(_) => "http",
            ProducerError::Status { .. } => "status",
            ProducerError::Io(_) => "io",
            ProducerError::Stream(_) => "stream",
            ProducerError::Serialization(_) => "serialization",
        }
    }
}

impl From<reqwest::Error> for ProducerError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ProducerError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => ProducerError::Http(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProducerError {
    fn from(err: serde_json::Error) -> Self {
        ProducerError::Serialization(err.to_string())
    }
}

/// Errors while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
