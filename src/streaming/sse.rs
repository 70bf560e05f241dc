//! SSE (Server-Sent Events) wire formatting.
//!
//! A frame is `id: <id>\n`, optional `event:`/`retry:` label lines,
//! `data: <payload>\n`, then a blank line. The label is precomputed by the
//! engine and passed in as bytes.

use bytes::{BufMut, Bytes, BytesMut};

const ID_PREFIX: &str = "id: ";
const EVENT_PREFIX: &str = "event: ";
const RETRY_PREFIX: &str = "retry: ";
const DATA_PREFIX: &str = "data: ";

/// Marker identifying text that is already a formatted frame.
const ID_MARKER: &str = "id:";
const EVENT_FIELD: &str = "event:";
const RETRY_FIELD: &str = "retry:";

/// Generate a fresh frame id.
pub fn new_frame_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Strip line breaks so a label value cannot split a frame.
pub fn sanitize_label(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// Encode the `event:`/`retry:` prefix. Empty when neither is set.
pub fn format_label(event: Option<&str>, retry: Option<u64>) -> Bytes {
    let mut label = String::new();
    if let Some(event) = event {
        label.push_str(EVENT_PREFIX);
        label.push_str(event);
        label.push('\n');
    }
    if let Some(retry) = retry {
        label.push_str(RETRY_PREFIX);
        label.push_str(&retry.to_string());
        label.push('\n');
    }
    label.into()
}

/// Format a complete enveloped frame.
///
/// Multi-line payloads get one `data:` line per line so the blank-line
/// terminator stays unambiguous.
pub fn format_frame(id: &str, label: &[u8], payload: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(
        ID_PREFIX.len() + id.len() + 1 + label.len() + DATA_PREFIX.len() + payload.len() + 2,
    );
    buf.put_slice(ID_PREFIX.as_bytes());
    buf.put_slice(id.as_bytes());
    buf.put_u8(b'\n');
    buf.put_slice(label);
    for line in payload.split('\n') {
        buf.put_slice(DATA_PREFIX.as_bytes());
        buf.put_slice(line.strip_suffix('\r').unwrap_or(line).as_bytes());
        buf.put_u8(b'\n');
    }
    buf.put_u8(b'\n');
    buf.freeze()
}

/// Whether the text already carries its own frame envelope.
pub fn is_preformatted(text: &str) -> bool {
    text.contains(ID_MARKER)
}

/// Complete a pre-formatted frame with the label lines it lacks.
///
/// A missing `event:` line goes right after the `id:` line and a missing
/// `retry:` line after the last `id:`/`event:` line, keeping the field order
/// of a synthesized frame. Lines the caller already wrote are left untouched,
/// and only line starts count as fields, not text inside a payload.
pub fn patch_preformatted(text: &str, event: Option<&str>, retry: Option<u64>) -> Bytes {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let has_field = |prefix: &str| lines.iter().any(|line| line.starts_with(prefix));

    let event = event.filter(|_| !has_field(EVENT_FIELD));
    let retry = retry.filter(|_| !has_field(RETRY_FIELD));
    let Some(id_line) = lines.iter().position(|line| line.starts_with(ID_MARKER)) else {
        return Bytes::copy_from_slice(text.as_bytes());
    };
    if event.is_none() && retry.is_none() {
        return Bytes::copy_from_slice(text.as_bytes());
    }

    let retry_after = lines
        .iter()
        .rposition(|line| line.starts_with(ID_MARKER) || line.starts_with(EVENT_FIELD))
        .unwrap_or(id_line);

    let mut buf = BytesMut::with_capacity(text.len() + 64);
    for (i, line) in lines.iter().enumerate() {
        buf.put_slice(line.as_bytes());

        let insert_event = i == id_line && event.is_some();
        let insert_retry = i == retry_after && retry.is_some();
        if !(insert_event || insert_retry) {
            continue;
        }
        if !line.ends_with('\n') {
            // Last line without a terminator
            buf.put_u8(b'\n');
        }
        if insert_event {
            buf.put_slice(&format_label(event, None));
        }
        if insert_retry {
            buf.put_slice(&format_label(None, retry));
        }
    }
    buf.freeze()
}

/// Prefix a raw chunk with the label. Zero-copy when there is no label.
pub fn prefix_chunk(label: &Bytes, chunk: Bytes) -> Bytes {
    if label.is_empty() {
        return chunk;
    }
    let mut buf = BytesMut::with_capacity(label.len() + chunk.len());
    buf.put_slice(label);
    buf.put_slice(&chunk);
    buf.freeze()
}
