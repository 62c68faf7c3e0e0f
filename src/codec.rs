//! Line protocol encoder and decoder.
//!
//! Every protocol event is one `;`-delimited UTF-8 line terminated by
//! `\n`. Two wire variants exist: the chapter variant, where positions are
//! compound [`Mark`]s, and the offset variant, where positions are flat
//! integers. Both are [`FrameCodec`] implementations so the session logic
//! is written once.
//!
//! There is no escaping: a `;` inside a topic or message shifts every
//! following field.
//!
//! # Example wire format
//! ```text
//! sr;reader-1;3;120        handshake (chapter read)
//! ok                       handshake accepted
//! msg;3;121;false;orders;created
//! ok                       ack
//! ```

use bytes::{Buf, BufMut, BytesMut};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::{Delivery, Mark, Position, SessionKind};

/// Field delimiter.
pub const DELIMITER: char = ';';

/// Positive acknowledgment token, both for handshakes and deliveries.
pub const ACK: &str = "ok";

/// Negative acknowledgment token.
pub const NAK: &str = "nok";

/// Leading token of a delivery line in the chapter variant.
pub const DELIVERY_TAG: &str = "msg";

/// Number of parameter slots in a handshake line.
const HANDSHAKE_SLOTS: usize = 3;

/// Wire format strategy shared by the tailing and append sessions.
pub trait FrameCodec: Clone + Send + Sync + 'static {
    /// What a successful append returns.
    type Receipt: Clone + std::fmt::Debug + Send + 'static;

    /// Build the handshake line for a session.
    fn encode_command(&self, kind: SessionKind, params: &[String]) -> String {
        encode_command(kind, params)
    }

    /// Build an append request line.
    fn encode_append(&self, topic: &str, message: &str) -> String {
        format!("{}{}{}", topic, DELIMITER, message)
    }

    /// Parse a delivery line.
    ///
    /// Returns `None` for lines that are not deliveries. The parse itself
    /// never fails: malformed fields degrade to zero values.
    fn decode_delivery(&self, line: &str) -> Option<Delivery>;

    /// Parse the broker's answer to an append request.
    fn decode_ack_response(&self, line: &str) -> Result<Self::Receipt>;
}

/// Build a handshake line: the kind tag followed by three parameter slots,
/// unused slots left empty. Sync subscriptions carry no parameters.
pub fn encode_command(kind: SessionKind, params: &[String]) -> String {
    let mut line = String::from(kind.tag());
    line.push(DELIMITER);
    if kind == SessionKind::Sync {
        return line;
    }

    let slots = params.len().max(HANDSHAKE_SLOTS);
    for i in 0..slots {
        if i > 0 {
            line.push(DELIMITER);
        }
        if let Some(param) = params.get(i) {
            line.push_str(param);
        }
    }
    line
}

/// Chapter/line variant: compound marks in deliveries and append receipts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChapterCodec;

impl FrameCodec for ChapterCodec {
    type Receipt = Mark;

    fn decode_delivery(&self, line: &str) -> Option<Delivery> {
        let mut fields = line.split(DELIMITER);
        if fields.next() != Some(DELIVERY_TAG) {
            return None;
        }

        let segment = parse_u64(fields.next());
        let index = parse_u64(fields.next());
        let review = parse_bool(fields.next());
        let topic = fields.next().unwrap_or_default().to_string();
        let message = fields.next().unwrap_or_default().to_string();

        let mut delivery = Delivery {
            topic,
            position: Position::Mark(Mark::new(segment, index)),
            message,
            review,
        };
        overlay_structured(line, &mut delivery);
        Some(delivery)
    }

    fn decode_ack_response(&self, line: &str) -> Result<Mark> {
        let mut fields = line.split(DELIMITER);
        if fields.next() != Some(ACK) {
            return Err(Error::Rejected(line.to_string()));
        }
        // Malformed numbers degrade to zero, but a missing position is
        // never filled in.
        match (fields.next(), fields.next()) {
            (Some(segment), Some(index)) => {
                Ok(Mark::new(parse_u64(Some(segment)), parse_u64(Some(index))))
            }
            _ => Err(Error::Protocol(format!(
                "append response without a mark: {}",
                line
            ))),
        }
    }
}

/// Flat-offset variant: integer offsets in deliveries, opaque ids in
/// append receipts.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffsetCodec;

impl FrameCodec for OffsetCodec {
    type Receipt = String;

    fn decode_delivery(&self, line: &str) -> Option<Delivery> {
        let mut fields = line.split(DELIMITER);
        let offset = parse_u64(fields.next());
        let topic = fields.next().unwrap_or_default().to_string();
        let message = fields.next().unwrap_or_default().to_string();

        let mut delivery = Delivery {
            topic,
            position: Position::Offset(offset),
            message,
            review: false,
        };
        overlay_structured(line, &mut delivery);
        Some(delivery)
    }

    fn decode_ack_response(&self, line: &str) -> Result<String> {
        let (head, id) = line.split_once(DELIMITER).unwrap_or((line, ""));
        if head != ACK {
            return Err(Error::Rejected(line.to_string()));
        }
        Ok(id.to_string())
    }
}

/// Optional fields of a structured (JSON) delivery line. Keys are matched
/// after lowercasing.
#[derive(Debug, Default, Deserialize)]
struct StructuredDelivery {
    topic: Option<String>,
    #[serde(alias = "chapter")]
    segment: Option<u64>,
    #[serde(alias = "line")]
    index: Option<u64>,
    offset: Option<u64>,
    review: Option<bool>,
    message: Option<String>,
}

/// Best-effort re-decode of the whole line as JSON. Field names match
/// case-insensitively. Fields that decode overwrite the positional values;
/// a decode error leaves the delivery untouched.
fn overlay_structured(line: &str, delivery: &mut Delivery) {
    let Ok(serde_json::Value::Object(fields)) = serde_json::from_str::<serde_json::Value>(line) else {
        return;
    };
    let folded: serde_json::Map<String, serde_json::Value> = fields
        .into_iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect();
    let Ok(structured) =
        serde_json::from_value::<StructuredDelivery>(serde_json::Value::Object(folded))
    else {
        return;
    };

    if let Some(topic) = structured.topic {
        delivery.topic = topic;
    }
    if let Some(message) = structured.message {
        delivery.message = message;
    }
    if let Some(review) = structured.review {
        delivery.review = review;
    }
    match &mut delivery.position {
        Position::Mark(mark) => {
            if let Some(segment) = structured.segment {
                mark.segment = segment;
            }
            if let Some(index) = structured.index {
                mark.index = index;
            }
        }
        Position::Offset(offset) => {
            if let Some(o) = structured.offset {
                *offset = o;
            }
        }
    }
}

/// Malformed or missing numeric fields become zero.
fn parse_u64(field: Option<&str>) -> u64 {
    field.and_then(|f| f.parse().ok()).unwrap_or(0)
}

/// Accepts the usual boolean spellings; anything else is `false`.
fn parse_bool(field: Option<&str>) -> bool {
    matches!(field, Some("1" | "t" | "T" | "true" | "TRUE" | "True"))
}

// ── Line framing ────────────────────────────────────────────────────────────

/// Append `line` and its terminator to the buffer.
pub fn encode_line(line: &str, buf: &mut BytesMut) {
    buf.reserve(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(b'\n');
}

/// Attempt to take one line from the buffer.
///
/// Returns `Ok(Some(line))` without its terminator (a trailing `\r` is
/// dropped too), `Ok(None)` if more data is needed, or `Err` if the
/// buffered line already exceeds `max_len` bytes.
pub fn decode_line(buf: &mut BytesMut, max_len: usize) -> Result<Option<String>> {
    let Some(pos) = buf.iter().position(|b| *b == b'\n') else {
        if buf.len() > max_len {
            return Err(line_too_long(max_len));
        }
        return Ok(None);
    };

    if pos > max_len {
        return Err(line_too_long(max_len));
    }

    let mut end = pos;
    if end > 0 && buf[end - 1] == b'\r' {
        end -= 1;
    }
    let line = String::from_utf8_lossy(&buf[..end]).into_owned();
    buf.advance(pos + 1);
    Ok(Some(line))
}

fn line_too_long(max_len: usize) -> Error {
    Error::Protocol(format!("line exceeds {} bytes", max_len))
}
