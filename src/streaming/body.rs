//! Consumer half of a stream's output channel.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{FusedStream, Stream};
use tokio::sync::mpsc::{self, error::TryRecvError};

use super::engine::SseStream;

/// Byte stream of formatted frames, ready to be used as an HTTP body.
///
/// Ends after the stream closes and every enqueued frame has been read.
/// Dropping it early counts as the consumer cancelling: the stream closes
/// and any producer driving it is released.
pub struct SseBody {
    rx: mpsc::UnboundedReceiver<Bytes>,
    stream: SseStream,
    done: bool,
}

impl SseBody {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Bytes>, stream: SseStream) -> Self {
        Self {
            rx,
            stream,
            done: false,
        }
    }

    /// Receive the next frame, waiting for one if necessary.
    pub async fn recv(&mut self) -> Option<Bytes> {
        if self.done {
            return None;
        }
        let frame = self.rx.recv().await;
        match &frame {
            Some(_) => self.stream.frame_consumed(),
            None => self.done = true,
        }
        frame
    }

    /// Receive a frame that is already buffered.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        match self.rx.try_recv() {
            Ok(frame) => {
                self.stream.frame_consumed();
                Some(frame)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.done = true;
                None
            }
        }
    }

    /// Read every remaining frame into one buffer.
    pub async fn collect_bytes(mut self) -> Bytes {
        let mut buf = Vec::new();
        while let Some(frame) = self.recv().await {
            buf.extend_from_slice(&frame);
        }
        Bytes::from(buf)
    }

    /// The stream feeding this body.
    pub fn stream(&self) -> &SseStream {
        &self.stream
    }
}

impl Stream for SseBody {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(frame)) => {
                self.stream.frame_consumed();
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl FusedStream for SseBody {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl Drop for SseBody {
    fn drop(&mut self) {
        if !self.stream.is_closed() {
            tracing::debug!(stream_id = self.stream.id(), "Consumer cancelled");
        }
        self.stream.close();
    }
}
