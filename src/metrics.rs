//! Stream metrics.
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the host
//! installs a recorder (the demo server installs the Prometheus exporter).

use metrics::{counter, describe_counter, describe_gauge, gauge};
use std::sync::atomic::{AtomicI64, Ordering};

/// Currently open streams.
static ACTIVE_STREAMS: AtomicI64 = AtomicI64::new(0);
/// Peak concurrently open streams.
static PEAK_STREAMS: AtomicI64 = AtomicI64::new(0);

/// Register metric descriptions with the installed recorder.
pub fn init_metrics() {
    describe_counter!("sse_streams_opened_total", "Streams opened");
    describe_counter!("sse_streams_closed_total", "Streams closed");
    describe_gauge!("sse_active_streams", "Number of currently open streams");
    describe_gauge!("sse_peak_streams", "Peak number of concurrently open streams");
    describe_counter!("sse_frames_sent_total", "Frames and chunks enqueued");
    describe_counter!("sse_bytes_sent_total", "Bytes enqueued to output channels");
    describe_counter!("sse_producer_errors_total", "Producer failures that ended a stream");
}

/// Current number of open streams.
pub fn active_streams() -> i64 {
    ACTIVE_STREAMS.load(Ordering::Relaxed)
}

/// Record a stream opening and update the peak.
pub fn record_stream_opened() {
    counter!("sse_streams_opened_total").increment(1);
    let current = ACTIVE_STREAMS.fetch_add(1, Ordering::Relaxed) + 1;
    gauge!("sse_active_streams").set(current as f64);

    loop {
        let peak = PEAK_STREAMS.load(Ordering::Relaxed);
        if current <= peak {
            break;
        }
        if PEAK_STREAMS
            .compare_exchange_weak(peak, current, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            gauge!("sse_peak_streams").set(current as f64);
            break;
        }
    }
}

/// Record a stream closing.
pub fn record_stream_closed() {
    counter!("sse_streams_closed_total").increment(1);
    let current = ACTIVE_STREAMS.fetch_sub(1, Ordering::Relaxed) - 1;
    gauge!("sse_active_streams").set(current as f64);
}

/// Record one enqueued frame or chunk.
pub fn record_frame_sent(bytes: usize) {
    counter!("sse_frames_sent_total").increment(1);
    counter!("sse_bytes_sent_total").increment(bytes as u64);
}

/// Record a producer failure.
pub fn record_producer_error(kind: &'static str) {
    counter!("sse_producer_errors_total", "kind" => kind).increment(1);
}
