//! Producers that drive a stream.
//!
//! A [`Producer`] is resolved once, when the stream is built, and hands the
//! stream to one of the drivers:
//!
//! - `Callback`: runs synchronously with a stream handle and sends at will.
//! - `Sequence`: values drained in order by a task, one frame each.
//! - `Chunks`: byte chunks forwarded verbatim by a task.
//! - `Empty`: the stream closes immediately.
//!
//! A stream with no producer at all is built with
//! [`SseStream::new`](crate::SseStream::new).

mod drivers;
pub mod relay;

use std::future::Future;

use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::error::ProducerError;
use crate::streaming::{SseStream, SseValue};

/// Callback receiving the stream once, at open.
pub type Callback = Box<dyn FnOnce(SseStream) + Send>;

/// Fallible sequence of values.
pub type ValueStream = BoxStream<'static, Result<SseValue, ProducerError>>;

/// Fallible sequence of byte chunks.
pub type ChunkStream = BoxStream<'static, Result<Bytes, ProducerError>>;

/// The source of a stream's data.
pub enum Producer {
    Callback(Callback),
    Sequence(ValueStream),
    Chunks(ChunkStream),
    Empty,
}

impl Producer {
    /// Producer that calls `f` with the stream as soon as it opens.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(SseStream) + Send + 'static,
    {
        Producer::Callback(Box::new(f))
    }

    /// Producer over a synchronous sequence.
    pub fn iter<I>(items: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<SseValue>,
        I::IntoIter: Send + 'static,
    {
        Producer::Sequence(stream::iter(items).map(|v| Ok(v.into())).boxed())
    }

    /// Producer over an asynchronous sequence.
    pub fn sequence<S>(values: S) -> Self
    where
        S: Stream + Send + 'static,
        S::Item: Into<SseValue>,
    {
        Producer::Sequence(values.map(|v| Ok(v.into())).boxed())
    }

    /// Producer over an asynchronous sequence that may fail.
    ///
    /// The first error ends the stream; values before it are delivered.
    pub fn try_sequence<S, T, E>(values: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Into<SseValue> + 'static,
        E: Into<ProducerError> + 'static,
    {
        Producer::Sequence(values.map_ok(Into::into).map_err(Into::into).boxed())
    }

    /// Producer over a sequence that is itself produced asynchronously.
    pub fn deferred<F, I>(future: F) -> Self
    where
        F: Future<Output = I> + Send + 'static,
        I: IntoIterator + 'static,
        I::Item: Into<SseValue>,
        I::IntoIter: Send + 'static,
    {
        let values = stream::once(future)
            .flat_map(stream::iter)
            .map(|v| Ok(v.into()));
        Producer::Sequence(values.boxed())
    }

    /// Producer forwarding byte chunks verbatim.
    pub fn chunks<S, B, E>(chunks: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + 'static,
        B: Into<Bytes> + 'static,
        E: Into<ProducerError> + 'static,
    {
        Producer::Chunks(chunks.map_ok(Into::into).map_err(Into::into).boxed())
    }

    /// Producer forwarding everything read from `reader`.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Producer::chunks(ReaderStream::new(reader))
    }

    /// Producer relaying an HTTP response body.
    pub fn response(response: reqwest::Response) -> Self {
        Producer::chunks(response.bytes_stream())
    }

    /// Hand `stream` to the driver for this producer.
    pub(crate) fn attach(self, stream: &SseStream) {
        match self {
            Producer::Callback(callback) => callback(stream.clone()),
            Producer::Sequence(values) => drivers::spawn_sequence(stream, values),
            Producer::Chunks(chunks) => drivers::spawn_chunks(stream, chunks),
            Producer::Empty => {
                tracing::debug!(stream_id = stream.id(), "Empty producer, closing stream");
                stream.close();
            }
        }
    }
}

impl From<reqwest::Response> for Producer {
    fn from(response: reqwest::Response) -> Self {
        Producer::response(response)
    }
}

impl<T: Into<Producer>> From<Option<T>> for Producer {
    fn from(producer: Option<T>) -> Self {
        producer.map_or(Producer::Empty, Into::into)
    }
}

impl std::fmt::Debug for Producer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Producer::Callback(_) => "Callback",
            Producer::Sequence(_) => "Sequence",
            Producer::Chunks(_) => "Chunks",
            Producer::Empty => "Empty",
        };
        f.debug_tuple("Producer").field(&kind).finish()
    }
}
