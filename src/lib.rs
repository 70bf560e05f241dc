//! Server-Sent Events streams from callbacks, sequences and byte sources.
//!
//! An [`SseStream`] wraps a producer and turns every value it sends into an
//! SSE frame (`id:`, optional `event:`/`retry:`, `data:`) on a byte channel.
//! The consumer half, [`SseBody`], is a `futures::Stream` of `Bytes` that an
//! HTTP server can use directly as a response body.
//!
//! ```no_run
//! use std::time::Duration;
//! use sse_stream::{Producer, SseStream, StreamOptions};
//!
//! # async fn handler() -> sse_stream::SseBody {
//! let stream = SseStream::with_producer(
//!     Producer::callback(|stream| {
//!         stream.spawn(|stream| async move {
//!             while stream.wait(Duration::from_millis(500)).await {
//!                 stream.send("hello world");
//!             }
//!         });
//!     }),
//!     StreamOptions::new().event("hi").retry(1000),
//! );
//! stream.body().unwrap()
//! # }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod producer;
#[cfg(feature = "axum")]
pub mod response;
pub mod streaming;

pub use config::{RelayConfig, StreamOptions};
pub use error::{ConfigError, ProducerError, Result};
pub use lifecycle::StreamState;
pub use producer::relay::{build_relay_client, relay};
pub use producer::Producer;
pub use streaming::{SseBody, SseStream, SseValue};
