//! Integration tests for relaying an upstream HTTP body.
//!
//! A local axum server plays the upstream: it streams a fixed set of SSE
//! chunks with small delays, or answers with an error status.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::net::TcpListener;

use sse_stream::{build_relay_client, relay, Producer, ProducerError, RelayConfig, SseStream, StreamOptions};

const UPSTREAM_CHUNKS: [&str; 2] = ["id: 1\ndata: first\n\n", "id: 2\ndata: second\n\n"];

async fn upstream_events() -> Response {
    let chunks = stream::iter(UPSTREAM_CHUNKS).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok::<Bytes, Infallible>(Bytes::from_static(chunk.as_bytes()))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(chunks))
        .unwrap()
}

async fn upstream_missing() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "no such feed")
}

/// Start the upstream server on an ephemeral port.
async fn start_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/events", get(upstream_events))
        .route("/missing", get(upstream_missing));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_relay_forwards_body_verbatim() {
    let addr = start_upstream().await;
    let client = build_relay_client(&RelayConfig::default()).unwrap();

    let stream = relay(client.get(format!("http://{}/events", addr)), StreamOptions::default())
        .await
        .unwrap();
    let body = stream.body().unwrap();

    assert_eq!(body.collect_bytes().await, Bytes::from(UPSTREAM_CHUNKS.concat()));
    assert!(stream.is_closed());
}

#[tokio::test]
async fn test_relay_prefixes_label() {
    let addr = start_upstream().await;
    let client = build_relay_client(&RelayConfig::default()).unwrap();

    let stream = relay(
        client.get(format!("http://{}/events", addr)),
        StreamOptions::new().event("relay"),
    )
    .await
    .unwrap();
    let body = stream.body().unwrap();

    let text = String::from_utf8(body.collect_bytes().await.to_vec()).unwrap();
    // Chunk boundaries may shift in transit, so only check the label leads
    // and that removing it restores the upstream body
    assert!(text.starts_with("event: relay\nid: 1"));
    assert_eq!(text.replace("event: relay\n", ""), UPSTREAM_CHUNKS.concat());
}

#[tokio::test]
async fn test_relay_error_status() {
    let addr = start_upstream().await;
    let client = build_relay_client(&RelayConfig::default()).unwrap();

    let result = relay(client.get(format!("http://{}/missing", addr)), StreamOptions::default()).await;
    match result {
        Err(ProducerError::Status { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "no such feed");
        }
        other => panic!("expected status error, got {:?}", other.map(|s| s.id())),
    }
}

#[tokio::test]
async fn test_response_producer() {
    let addr = start_upstream().await;
    let response = reqwest::get(format!("http://{}/events", addr)).await.unwrap();

    let stream = SseStream::with_producer(Producer::from(response), StreamOptions::raw());
    let body = stream.body().unwrap();
    assert_eq!(body.collect_bytes().await, Bytes::from(UPSTREAM_CHUNKS.concat()));
}
