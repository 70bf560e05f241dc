//! Relaying another HTTP response body through a stream.
//!
//! The upstream body is forwarded chunk by chunk, so an upstream that already
//! speaks SSE passes through untouched (with the stream's label prepended to
//! each chunk when one is set).

use reqwest::{Client, RequestBuilder};

use super::Producer;
use crate::config::{RelayConfig, StreamOptions};
use crate::error::{ProducerError, Result};
use crate::streaming::SseStream;

/// Build an HTTP client for relaying long-lived response bodies.
///
/// No overall timeout is applied unless configured: a relayed event stream
/// may legitimately stay open for hours. The connect timeout still bounds
/// an unreachable upstream.
pub fn build_relay_client(config: &RelayConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(config.user_agent.as_str());

    if let Some(timeout) = config.timeout() {
        builder = builder.timeout(timeout);
    }

    tracing::debug!(
        connect_timeout_secs = config.connect_timeout_secs,
        timeout_secs = config.timeout_secs,
        pool_max_idle_per_host = config.pool_max_idle_per_host,
        "Relay client configured"
    );

    builder
        .build()
        .map_err(|e| ProducerError::Http(e.to_string()))
}

/// Send `request` and stream its response body.
///
/// Fails before any stream exists if the upstream cannot be reached or
/// answers with a non-success status; after that, upstream errors only end
/// the stream early.
pub async fn relay(request: RequestBuilder, options: StreamOptions) -> Result<SseStream> {
    let response = request
        .send()
        .await
        .map_err(|e| ProducerError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());
        return Err(ProducerError::Status {
            status: status.as_u16(),
            message,
        });
    }

    tracing::debug!(
        url = %response.url(),
        status = status.as_u16(),
        content_type = ?response.headers().get(reqwest::header::CONTENT_TYPE),
        "Relaying upstream body"
    );

    Ok(SseStream::with_producer(Producer::response(response), options))
}
