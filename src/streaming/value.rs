//! Values accepted by [`SseStream::send`](crate::SseStream::send).

use std::borrow::Cow;

use bytes::Bytes;
use serde_json::{Number, Value};

/// A payload handed to a stream.
///
/// Primitives are written literally into the `data:` field, structured
/// values as JSON text, and byte chunks are forwarded without an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum SseValue {
    Text(String),
    Number(Number),
    Bool(bool),
    /// Objects, arrays and `null`.
    Json(Value),
    /// A raw byte chunk, forwarded verbatim.
    Bytes(Bytes),
    /// No value. Sending it is a no-op.
    Absent,
}

impl SseValue {
    /// Whether sending this value writes nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            SseValue::Text(s) => s.is_empty(),
            SseValue::Bytes(b) => b.is_empty(),
            SseValue::Absent => true,
            _ => false,
        }
    }

    /// Text encoding of a non-byte value.
    ///
    /// Returns `None` for byte chunks and absent values.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            SseValue::Text(s) => Some(Cow::Borrowed(s.as_str())),
            SseValue::Number(n) => Some(Cow::Owned(n.to_string())),
            SseValue::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            SseValue::Json(v) => Some(Cow::Owned(v.to_string())),
            SseValue::Bytes(_) | SseValue::Absent => None,
        }
    }
}

impl From<String> for SseValue {
    fn from(s: String) -> Self {
        SseValue::Text(s)
    }
}

impl From<&str> for SseValue {
    fn from(s: &str) -> Self {
        SseValue::Text(s.to_string())
    }
}

impl From<&String> for SseValue {
    fn from(s: &String) -> Self {
        SseValue::Text(s.clone())
    }
}

impl From<Cow<'_, str>> for SseValue {
    fn from(s: Cow<'_, str>) -> Self {
        SseValue::Text(s.into_owned())
    }
}

impl From<bool> for SseValue {
    fn from(b: bool) -> Self {
        SseValue::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for SseValue {
                fn from(n: $t) -> Self {
                    SseValue::Number(Number::from(n))
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<f64> for SseValue {
    fn from(n: f64) -> Self {
        // JSON numbers cannot carry NaN or infinities
        match Number::from_f64(n) {
            Some(n) => SseValue::Number(n),
            None => SseValue::Text(n.to_string()),
        }
    }
}

impl From<f32> for SseValue {
    fn from(n: f32) -> Self {
        SseValue::from(f64::from(n))
    }
}

impl From<Value> for SseValue {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => SseValue::Text(s),
            Value::Number(n) => SseValue::Number(n),
            Value::Bool(b) => SseValue::Bool(b),
            other => SseValue::Json(other),
        }
    }
}

impl From<Bytes> for SseValue {
    fn from(b: Bytes) -> Self {
        SseValue::Bytes(b)
    }
}

impl From<Vec<u8>> for SseValue {
    fn from(b: Vec<u8>) -> Self {
        SseValue::Bytes(Bytes::from(b))
    }
}

impl From<&'static [u8]> for SseValue {
    fn from(b: &'static [u8]) -> Self {
        SseValue::Bytes(Bytes::from_static(b))
    }
}

impl<T: Into<SseValue>> From<Option<T>> for SseValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SseValue::Absent, Into::into)
    }
}
