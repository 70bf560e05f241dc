//! Stream lifecycle tracking.
//!
//! A stream moves `Idle -> Open -> Closing -> Closed` exactly once. The
//! transition into `Closing` is claimed with a compare-and-swap so concurrent
//! `close()` calls (the producer finishing while the consumer hangs up) agree
//! on a single winner.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Next stream ID, used to correlate log lines.
static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique stream ID.
pub(crate) fn next_stream_id() -> u64 {
    NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed)
}

/// Lifecycle state of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    /// Constructed, channel not yet open.
    Idle = 0,
    /// Accepting sends.
    Open = 1,
    /// Close requested, in-flight sends finishing.
    Closing = 2,
    /// Terminal.
    Closed = 3,
}

impl StreamState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => StreamState::Idle,
            1 => StreamState::Open,
            2 => StreamState::Closing,
            _ => StreamState::Closed,
        }
    }

    /// Static label for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Idle => "idle",
            StreamState::Open => "open",
            StreamState::Closing => "closing",
            StreamState::Closed => "closed",
        }
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for a [`StreamState`].
pub(crate) struct StateCell {
    state: AtomicU8,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(StreamState::Idle as u8),
        }
    }

    pub fn get(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Idle -> Open`. Returns false if the stream was not idle.
    pub fn open(&self) -> bool {
        self.state
            .compare_exchange(
                StreamState::Idle as u8,
                StreamState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Claim the close. Only the first caller gets `true`.
    pub fn begin_close(&self) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |curr| {
                match StreamState::from_u8(curr) {
                    StreamState::Idle | StreamState::Open => Some(StreamState::Closing as u8),
                    StreamState::Closing | StreamState::Closed => None,
                }
            })
            .is_ok()
    }

    /// `Closing -> Closed`.
    pub fn finish_close(&self) {
        self.state.store(StreamState::Closed as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
