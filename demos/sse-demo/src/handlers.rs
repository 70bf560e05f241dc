use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use sse_stream::{relay as relay_upstream, Producer, ProducerError, SseStream, StreamOptions};

use crate::config::{SourceConfig, UpstreamConfig};

/// Shared application state
pub struct AppState {
    pub source: SourceConfig,
    pub upstreams: UpstreamConfig,
    pub client: reqwest::Client,
}

/// GET /source
///
/// Sends the configured message every `interval_ms` and closes the stream
/// once `duration_ms` has elapsed.
pub async fn source(State(state): State<Arc<AppState>>) -> SseStream {
    let message = state.source.message.clone();
    let interval = state.source.interval();
    let duration = state.source.duration();

    SseStream::with_producer(
        Producer::callback(move |stream| {
            stream.spawn(move |stream| async move {
                while stream.wait(interval).await {
                    stream.send(message.as_str());
                }
            });

            stream.spawn(move |stream| async move {
                if stream.wait(duration).await {
                    tracing::debug!(stream_id = stream.id(), "Source duration elapsed");
                    stream.close();
                }
            });
        }),
        state.source.stream.clone(),
    )
}

#[derive(Debug, Deserialize)]
pub struct RelayQuery {
    url: String,
    event: Option<String>,
    #[serde(default)]
    raw: bool,
}

/// GET /relay?url=...
///
/// Forwards an upstream body through a stream, optionally labelled. Only
/// hosts listed in `upstreams.allowed_hosts` are fetched.
pub async fn relay(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RelayQuery>,
) -> Result<SseStream, (StatusCode, String)> {
    let url = reqwest::Url::parse(&query.url)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid url: {}", e)))?;
    if !state.upstreams.allows(&url) {
        tracing::warn!(url = %url, "Relay to disallowed upstream refused");
        return Err((StatusCode::FORBIDDEN, "upstream not allowed".to_string()));
    }

    let mut options = StreamOptions::new();
    options.event = query.event;
    options.raw_data = query.raw;
    options
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    tracing::info!(url = %url, "Relaying upstream");

    relay_upstream(state.client.get(url.clone()), options)
        .await
        .map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Relay failed");
            match e {
                ProducerError::Status { status, message } => (
                    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                    message,
                ),
                other => (StatusCode::BAD_GATEWAY, other.to_string()),
            }
        })
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "active_streams": sse_stream::metrics::active_streams(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            source: SourceConfig {
                message: "ping".to_string(),
                interval_ms: 100,
                duration_ms: 350,
                stream: StreamOptions::new().event("hi"),
            },
            upstreams: UpstreamConfig::default(),
            client: reqwest::Client::new(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_stream_closes_after_duration() {
        let stream = source(State(test_state())).await;
        let body = stream.body().unwrap();

        let bytes = tokio::time::timeout(Duration::from_secs(10), body.collect_bytes())
            .await
            .unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        assert_eq!(text.matches("event: hi\ndata: ping\n\n").count(), 3);
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn test_relay_rejects_bad_label() {
        let query = RelayQuery {
            url: "http://127.0.0.1:9/".to_string(),
            event: Some("bad\nlabel".to_string()),
            raw: false,
        };
        let result = relay(State(test_state()), Query(query)).await;
        assert!(matches!(result, Err((StatusCode::BAD_REQUEST, _))));
    }

    #[tokio::test]
    async fn test_relay_refuses_unlisted_host() {
        let query = RelayQuery {
            url: "http://example.com/events".to_string(),
            event: None,
            raw: false,
        };
        let result = relay(State(test_state()), Query(query)).await;
        assert!(matches!(result, Err((StatusCode::FORBIDDEN, _))));
    }
}
