//! The SSE stream engine.
//!
//! An [`SseStream`] owns one output channel. Producers push values through
//! [`SseStream::send`], which frames them and enqueues the bytes; the
//! consumer pulls them back out through the [`SseBody`] taken with
//! [`SseStream::body`].

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::body::SseBody;
use super::sse;
use super::value::SseValue;
use crate::config::StreamOptions;
use crate::lifecycle::{next_stream_id, StateCell, StreamState};
use crate::metrics;
use crate::producer::Producer;

/// Frames a producer driver may leave unread before it stops pulling.
pub(crate) const MAX_QUEUED_FRAMES: usize = 64;

/// Handle to a stream engine.
///
/// Cloning is cheap and every clone drives the same stream, which is how a
/// callback producer keeps sending from timers or spawned tasks.
#[derive(Clone)]
pub struct SseStream {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    raw: bool,
    state: StateCell,
    /// Cancelled exactly once, when the stream closes.
    cancel: CancellationToken,
    writer: Mutex<Writer>,
    /// Consumer half, until someone takes it.
    body: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    /// Frames enqueued but not yet read by the consumer.
    queued: AtomicUsize,
    /// Signalled each time the consumer reads a frame.
    drained: Notify,
}

/// Everything a frame is built from. Guarded by one lock so a frame is
/// formatted and enqueued as a unit.
struct Writer {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
    event: Option<String>,
    retry: Option<u64>,
    label: Bytes,
}

impl Writer {
    fn relabel(&mut self) {
        self.label = sse::format_label(self.event.as_deref(), self.retry);
    }
}

impl Inner {
    fn lock_writer(&self) -> MutexGuard<'_, Writer> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn encode(&self, writer: &Writer, value: SseValue) -> Option<Bytes> {
        let value = match value {
            SseValue::Bytes(chunk) => return Some(sse::prefix_chunk(&writer.label, chunk)),
            other => other,
        };
        let text = value.as_text()?;

        if self.raw {
            return Some(Bytes::from(text.into_owned()));
        }
        if sse::is_preformatted(&text) {
            return Some(sse::patch_preformatted(
                &text,
                writer.event.as_deref(),
                writer.retry,
            ));
        }
        Some(sse::format_frame(&sse::new_frame_id(), &writer.label, &text))
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Last handle gone without an explicit close
        if self.state.begin_close() {
            self.cancel.cancel();
            self.state.finish_close();
            metrics::record_stream_closed();
        }
    }
}

impl SseStream {
    /// Open a stream with no producer attached.
    ///
    /// It stays open until [`close`](Self::close) is called or the consumer
    /// drops the body.
    pub fn new(options: StreamOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let raw = options.raw_data;

        let (event, retry) = if raw {
            if options.event.is_some() || options.retry.is_some() {
                tracing::debug!("event/retry ignored in raw mode");
            }
            (None, None)
        } else {
            let event = options
                .event
                .map(|e| sse::sanitize_label(&e))
                .filter(|e| !e.is_empty());
            (event, options.retry)
        };

        let id = next_stream_id();
        tracing::debug!(stream_id = id, raw, event = ?event, retry = ?retry, "Stream opened");

        let mut writer = Writer {
            tx: Some(tx),
            event,
            retry,
            label: Bytes::new(),
        };
        writer.relabel();

        let inner = Inner {
            id,
            raw,
            state: StateCell::new(),
            cancel: CancellationToken::new(),
            writer: Mutex::new(writer),
            body: Mutex::new(Some(rx)),
            queued: AtomicUsize::new(0),
            drained: Notify::new(),
        };
        inner.state.open();
        metrics::record_stream_opened();

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Open a stream driven by `producer`.
    ///
    /// Callback producers run before this returns. Sequence and chunk
    /// producers are drained by a Tokio task, so those need a runtime.
    pub fn with_producer(producer: impl Into<Producer>, options: StreamOptions) -> Self {
        let stream = Self::new(options);
        producer.into().attach(&stream);
        stream
    }

    /// Process-unique ID used in log lines.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.inner.state.get()
    }

    /// Whether the stream has stopped accepting values.
    pub fn is_closed(&self) -> bool {
        matches!(self.state(), StreamState::Closing | StreamState::Closed)
    }

    /// Whether the envelope is disabled.
    pub fn is_raw(&self) -> bool {
        self.inner.raw
    }

    /// Current event label.
    pub fn event(&self) -> Option<String> {
        self.inner.lock_writer().event.clone()
    }

    /// Current retry hint in milliseconds.
    pub fn retry(&self) -> Option<u64> {
        self.inner.lock_writer().retry
    }

    /// Set the `event:` label for subsequent frames.
    ///
    /// Ignored in raw mode. An empty label clears it.
    pub fn set_event(&self, event: impl Into<String>) {
        if self.inner.raw {
            tracing::debug!(stream_id = self.inner.id, "event ignored in raw mode");
            return;
        }
        let event = sse::sanitize_label(&event.into());
        let mut writer = self.inner.lock_writer();
        writer.event = (!event.is_empty()).then_some(event);
        writer.relabel();
    }

    /// Remove the `event:` label.
    pub fn clear_event(&self) {
        let mut writer = self.inner.lock_writer();
        writer.event = None;
        writer.relabel();
    }

    /// Set the `retry:` hint for subsequent frames. Ignored in raw mode.
    pub fn set_retry(&self, millis: u64) {
        if self.inner.raw {
            tracing::debug!(stream_id = self.inner.id, "retry ignored in raw mode");
            return;
        }
        let mut writer = self.inner.lock_writer();
        writer.retry = Some(millis);
        writer.relabel();
    }

    /// Remove the `retry:` hint.
    pub fn clear_retry(&self) {
        let mut writer = self.inner.lock_writer();
        writer.retry = None;
        writer.relabel();
    }

    /// Frame `value` and enqueue it.
    ///
    /// Empty strings, empty chunks and absent values are dropped, as is
    /// anything sent after close. Never fails.
    pub fn send(&self, value: impl Into<SseValue>) {
        let value = value.into();
        if value.is_empty() {
            return;
        }

        let writer = self.inner.lock_writer();
        let Some(tx) = writer.tx.as_ref() else {
            tracing::trace!(stream_id = self.inner.id, "send after close ignored");
            return;
        };
        let Some(frame) = self.inner.encode(&writer, value) else {
            return;
        };

        let len = frame.len();
        self.inner.queued.fetch_add(1, Ordering::AcqRel);
        if tx.send(frame).is_err() {
            self.inner.queued.fetch_sub(1, Ordering::AcqRel);
            drop(writer);
            tracing::debug!(stream_id = self.inner.id, "Consumer gone, closing stream");
            self.close();
            return;
        }
        metrics::record_frame_sent(len);
        tracing::trace!(stream_id = self.inner.id, bytes = len, "Frame enqueued");
    }

    /// Serialize `value` to JSON and send it.
    ///
    /// Values that fail to serialize are dropped.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => self.send(json),
            Err(e) => {
                tracing::debug!(stream_id = self.inner.id, error = %e, "Dropping unserializable value");
            }
        }
    }

    /// Close the stream. Idempotent.
    ///
    /// Frames already enqueued remain readable; the consumer sees the end of
    /// the body after them.
    pub fn close(&self) {
        if !self.inner.state.begin_close() {
            return;
        }

        // Waits for a send holding the lock to finish enqueueing
        let tx = self.inner.lock_writer().tx.take();
        drop(tx);

        self.inner.cancel.cancel();
        self.inner.state.finish_close();
        metrics::record_stream_closed();
        tracing::debug!(stream_id = self.inner.id, "Stream closed");
    }

    /// Resolves once the stream is closed.
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Sleep for `duration` unless the stream closes first.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn wait(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.inner.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Spawn a task that drives this stream.
    ///
    /// The task is dropped as soon as the stream closes, which releases any
    /// timer or source it holds.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn<F, Fut>(&self, task: F) -> JoinHandle<()>
    where
        F: FnOnce(SseStream) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = task(self.clone());
        let cancel = self.inner.cancel.clone();
        let stream_id = self.inner.id;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(stream_id, "Stream closed, dropping producer task");
                }
                _ = fut => {}
            }
        })
    }

    /// Take the consumer half of the output channel.
    ///
    /// Returns `Some` exactly once. Dropping the body closes the stream.
    pub fn body(&self) -> Option<SseBody> {
        let rx = self
            .inner
            .body
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(SseBody::new(rx, self.clone()))
    }

    /// Alias of [`body`](Self::body).
    pub fn value(&self) -> Option<SseBody> {
        self.body()
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Number of frames the consumer has not read yet.
    pub(crate) fn queued_frames(&self) -> usize {
        self.inner.queued.load(Ordering::Acquire)
    }

    /// Called by the body for every frame it hands out.
    pub(crate) fn frame_consumed(&self) {
        self.inner.queued.fetch_sub(1, Ordering::AcqRel);
        self.inner.drained.notify_one();
    }

    /// Wait until the consumer has room for another frame.
    ///
    /// Producer drivers await this before pulling the next item, so a source
    /// that is always ready still yields to the consumer and never buffers
    /// more than [`MAX_QUEUED_FRAMES`].
    pub(crate) async fn writable(&self) {
        while self.queued_frames() >= MAX_QUEUED_FRAMES {
            self.inner.drained.notified().await;
        }
    }
}

impl Default for SseStream {
    fn default() -> Self {
        Self::new(StreamOptions::default())
    }
}

impl fmt::Debug for SseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseStream")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("raw", &self.inner.raw)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::FusedStream;
    use serde_json::json;
    use std::collections::HashSet;

    /// Drain whatever is buffered without waiting.
    fn drain(body: &mut SseBody) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Some(frame) = body.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn text(frame: &Bytes) -> &str {
        std::str::from_utf8(frame).unwrap()
    }

    /// Split an enveloped frame into (id, rest).
    fn split_id(frame: &str) -> (&str, &str) {
        let rest = frame.strip_prefix("id: ").expect("frame starts with id");
        let (id, rest) = rest.split_once('\n').unwrap();
        (id, rest)
    }

    #[test]
    fn test_send_primitive_frame() {
        let stream = SseStream::default();
        let mut body = stream.body().unwrap();

        stream.send("hello");
        stream.send(42);
        stream.send(true);

        let frames = drain(&mut body);
        assert_eq!(frames.len(), 3);
        assert_eq!(split_id(text(&frames[0])).1, "data: hello\n\n");
        assert_eq!(split_id(text(&frames[1])).1, "data: 42\n\n");
        assert_eq!(split_id(text(&frames[2])).1, "data: true\n\n");
    }

    #[test]
    fn test_send_structured_value() {
        let stream = SseStream::default();
        let mut body = stream.body().unwrap();

        stream.send(json!({ "msg": "hi", "n": [1, 2] }));
        stream.send_json(&vec!["a", "b"]);

        let frames = drain(&mut body);
        assert_eq!(split_id(text(&frames[0])).1, "data: {\"msg\":\"hi\",\"n\":[1,2]}\n\n");
        assert_eq!(split_id(text(&frames[1])).1, "data: [\"a\",\"b\"]\n\n");
    }

    #[test]
    fn test_ids_are_fresh() {
        let stream = SseStream::default();
        let mut body = stream.body().unwrap();

        for i in 0..100 {
            stream.send(i);
        }

        let frames = drain(&mut body);
        let ids: HashSet<String> = frames
            .iter()
            .map(|f| split_id(text(f)).0.to_string())
            .collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_order_preserved() {
        let stream = SseStream::default();
        let mut body = stream.body().unwrap();

        stream.send("a");
        stream.send("b");
        stream.send("c");

        let payloads: Vec<String> = drain(&mut body)
            .iter()
            .map(|f| split_id(text(f)).1.to_string())
            .collect();
        assert_eq!(payloads, ["data: a\n\n", "data: b\n\n", "data: c\n\n"]);
    }

    #[test]
    fn test_label_persists_and_changes() {
        let stream = SseStream::default();
        let mut body = stream.body().unwrap();

        stream.set_event("x");
        stream.send("hi");
        stream.send("hi");
        stream.set_event("y");
        stream.set_retry(1000);
        stream.send("hi");

        let frames = drain(&mut body);
        assert_eq!(split_id(text(&frames[0])).1, "event: x\ndata: hi\n\n");
        assert_eq!(split_id(text(&frames[1])).1, "event: x\ndata: hi\n\n");
        assert_eq!(split_id(text(&frames[2])).1, "event: y\nretry: 1000\ndata: hi\n\n");
    }

    #[test]
    fn test_options_label() {
        let stream = SseStream::new(StreamOptions::new().event("hi").retry(1000));
        let mut body = stream.body().unwrap();
        assert_eq!(stream.event().as_deref(), Some("hi"));

        stream.send("hello world");
        let frames = drain(&mut body);
        assert_eq!(
            split_id(text(&frames[0])).1,
            "event: hi\nretry: 1000\ndata: hello world\n\n"
        );

        stream.clear_event();
        stream.clear_retry();
        stream.send("plain");
        let frames = drain(&mut body);
        assert_eq!(split_id(text(&frames[0])).1, "data: plain\n\n");
    }

    #[test]
    fn test_raw_mode() {
        let stream = SseStream::new(StreamOptions::raw().event("ignored").retry(5));
        let mut body = stream.body().unwrap();
        assert!(stream.is_raw());
        assert_eq!(stream.event(), None);

        stream.set_event("still ignored");
        stream.send("plain");
        stream.send(json!({ "a": 1 }));
        stream.send(Bytes::from_static(b"chunk"));

        let frames = drain(&mut body);
        assert_eq!(frames[0].as_ref(), b"plain");
        assert_eq!(frames[1].as_ref(), b"{\"a\":1}");
        assert_eq!(frames[2].as_ref(), b"chunk");
    }

    #[test]
    fn test_empty_values_write_nothing() {
        let stream = SseStream::default();
        let mut body = stream.body().unwrap();

        stream.send("");
        stream.send(None::<String>);
        stream.send(Bytes::new());

        assert!(drain(&mut body).is_empty());
    }

    #[test]
    fn test_bytes_are_label_prefixed() {
        let stream = SseStream::new(StreamOptions::new().event("e"));
        let mut body = stream.body().unwrap();

        stream.send(Bytes::from_static(b"data: raw\n\n"));

        let frames = drain(&mut body);
        assert_eq!(frames[0].as_ref(), b"event: e\ndata: raw\n\n");
    }

    #[test]
    fn test_preformatted_frame_is_patched() {
        let stream = SseStream::new(StreamOptions::new().event("tick"));
        let mut body = stream.body().unwrap();

        stream.send("id: custom\ndata: x\n\n");
        stream.send("id: custom\nevent: mine\ndata: y\n\n");

        let frames = drain(&mut body);
        assert_eq!(text(&frames[0]), "id: custom\nevent: tick\ndata: x\n\n");
        assert_eq!(text(&frames[1]), "id: custom\nevent: mine\ndata: y\n\n");
    }

    #[test]
    fn test_close_is_idempotent() {
        let stream = SseStream::default();
        let mut body = stream.body().unwrap();

        stream.send("before");
        stream.close();
        assert_eq!(stream.state(), StreamState::Closed);
        stream.close();
        stream.send("after");

        assert_eq!(drain(&mut body).len(), 1);
        assert!(body.is_terminated());
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[test]
    fn test_body_taken_once() {
        let stream = SseStream::default();
        assert!(stream.value().is_some());
        assert!(stream.body().is_none());
    }

    #[test]
    fn test_dropping_body_closes_stream() {
        let stream = SseStream::default();
        let body = stream.body().unwrap();
        assert_eq!(stream.state(), StreamState::Open);

        drop(body);
        assert!(stream.is_closed());
        stream.send("ignored");
    }

    #[test]
    fn test_callback_runs_synchronously() {
        let stream = SseStream::with_producer(
            Producer::callback(|s| {
                s.set_event("greeting");
                s.send("one");
                s.send("two");
                s.close();
                s.send("three");
            }),
            StreamOptions::default(),
        );
        assert!(stream.is_closed());

        let mut body = stream.body().unwrap();
        let frames = drain(&mut body);
        assert_eq!(frames.len(), 2);
        assert!(text(&frames[0]).contains("event: greeting\ndata: one\n\n"));
        assert!(body.is_terminated());
    }

    #[test]
    fn test_empty_producer_closes_immediately() {
        let stream = SseStream::with_producer(None::<Producer>, StreamOptions::default());
        assert_eq!(stream.state(), StreamState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_early_on_close() {
        let stream = SseStream::default();
        assert!(stream.wait(Duration::from_millis(10)).await);

        let closer = stream.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            closer.close();
        });
        assert!(!stream.wait(Duration::from_secs(60)).await);
        stream.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_task_dropped_on_close() {
        let stream = SseStream::default();
        let mut body = stream.body().unwrap();

        let handle = stream.spawn(|s| async move {
            loop {
                s.send("tick");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        tokio::time::sleep(Duration::from_millis(250)).await;
        stream.close();
        handle.await.unwrap();

        let mut ticks = 0;
        while body.recv().await.is_some() {
            ticks += 1;
        }
        assert_eq!(ticks, 3);
    }
}
