//! Tasks that drain sequence and chunk producers into a stream.
//!
//! Each driver races its source against the stream's cancellation token, so
//! a consumer hanging up stops the pull loop and drops the source (and
//! whatever timer, iterator or socket it holds).
//!
//! Before each pull a driver waits for the consumer to keep up, so an
//! always-ready source (an infinite iterator) still yields and the number of
//! unread frames stays bounded.

use futures::stream::{BoxStream, StreamExt};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::{ChunkStream, ValueStream};
use crate::error::ProducerError;
use crate::metrics;
use crate::streaming::{SseStream, SseValue, MAX_QUEUED_FRAMES};

/// Drain `values` into `stream`, one frame per value.
pub(super) fn spawn_sequence(stream: &SseStream, values: ValueStream) {
    spawn_drain(stream, values, "sequence", |value| value);
}

/// Forward `chunks` into `stream` without reframing.
pub(super) fn spawn_chunks(stream: &SseStream, chunks: ChunkStream) {
    spawn_drain(stream, chunks, "chunks", SseValue::Bytes);
}

fn spawn_drain<T, F>(
    stream: &SseStream,
    source: BoxStream<'static, Result<T, ProducerError>>,
    kind: &'static str,
    forward: F,
) where
    T: Send + 'static,
    F: Fn(T) -> SseValue + Send + 'static,
{
    let runtime = match Handle::try_current() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(
                stream_id = stream.id(),
                producer = kind,
                error = %e,
                "No Tokio runtime to drain producer, closing stream"
            );
            stream.close();
            return;
        }
    };

    let cancel = stream.cancellation();
    runtime.spawn(drain(stream.clone(), source, cancel, kind, forward));
}

async fn drain<T, F>(
    stream: SseStream,
    mut source: BoxStream<'static, Result<T, ProducerError>>,
    cancel: CancellationToken,
    kind: &'static str,
    forward: F,
) where
    F: Fn(T) -> SseValue,
{
    let stream_id = stream.id();
    let mut forwarded: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(stream_id, producer = kind, forwarded, "Stream closed, releasing producer");
                break;
            }

            item = async {
                stream.writable().await;
                source.next().await
            } => {
                match item {
                    Some(Ok(item)) => {
                        stream.send(forward(item));
                        forwarded += 1;
                        // Values that encode to nothing never fill the queue
                        if forwarded % MAX_QUEUED_FRAMES as u64 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                    Some(Err(e)) => {
                        metrics::record_producer_error(e.kind());
                        tracing::warn!(stream_id, producer = kind, forwarded, error = %e, "Producer failed, ending stream");
                        break;
                    }
                    None => {
                        tracing::debug!(stream_id, producer = kind, forwarded, "Producer exhausted");
                        break;
                    }
                }
            }
        }
    }

    drop(source);
    stream.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamOptions;
    use crate::lifecycle::StreamState;
    use futures::stream;

    #[test]
    fn test_no_runtime_closes_stream() {
        let stream = SseStream::default();
        spawn_sequence(&stream, stream::iter([Ok(SseValue::from(1))]).boxed());
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[tokio::test]
    async fn test_error_ends_stream_without_partial_frame() {
        let stream = SseStream::new(StreamOptions::raw());
        let body = stream.body().unwrap();

        let values = stream::iter([
            Ok(SseValue::from("a")),
            Err(ProducerError::Stream("boom".to_string())),
            Ok(SseValue::from("b")),
        ])
        .boxed();
        spawn_sequence(&stream, values);

        assert_eq!(body.collect_bytes().await.as_ref(), b"a");
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn test_unbounded_source_waits_for_consumer() {
        let stream = SseStream::default();
        let mut body = stream.body().unwrap();

        let values = stream::iter(0u64..).map(|n| Ok(SseValue::from(n))).boxed();
        spawn_sequence(&stream, values);

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(stream.queued_frames(), MAX_QUEUED_FRAMES);

        assert!(body.recv().await.is_some());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(stream.queued_frames(), MAX_QUEUED_FRAMES);
        assert!(!stream.is_closed());

        drop(body);
        assert!(stream.is_closed());
    }
}
