//! `axum` integration.
//!
//! The engine never sets headers itself; this adapter is the HTTP layer's
//! glue for returning a stream straight from a handler.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::streaming::SseStream;

/// Content type for event streams.
pub const EVENT_STREAM: &str = "text/event-stream";

impl IntoResponse for SseStream {
    fn into_response(self) -> Response {
        let Some(body) = self.body() else {
            tracing::warn!(stream_id = self.id(), "Stream body already taken");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };

        let mut response = Response::new(Body::from_stream(body));
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
        response
    }
}
