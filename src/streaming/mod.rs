//! SSE framing and the stream engine.

mod body;
mod engine;
pub mod sse;
mod value;

pub use body::SseBody;
pub use engine::SseStream;
pub(crate) use engine::MAX_QUEUED_FRAMES;
pub use value::SseValue;
