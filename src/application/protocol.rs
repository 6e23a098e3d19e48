//! # Stream Line Protocol
//!
//! The chat transport delivers the model response as prefixed records, one per line:
//! `0:` text, `2:` data, `8:` annotations, `3:` error, `e:`/`d:` finish metadata.
//! [`LineDecoder`] turns arbitrary transport chunks into whole lines and
//! [`StreamRecord::parse`] classifies each line.

use serde_json::Value;

/// Splits a byte stream into lines. A UTF-8 sequence cut across chunks is kept
/// in the buffer until its line is complete.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every line completed by them, without terminators.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=end).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Flushes the final unterminated line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        Some(decode_line(&line))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamRecord {
    /// `0:` a text token for the response accumulator.
    Text(String),
    /// `2:` out-of-band progress events.
    Data(Vec<Value>),
    /// `8:` message annotations.
    Annotations(Vec<Value>),
    /// `3:` transport error; aborts the turn.
    Error(String),
    /// `e:` / `d:` trailing metadata such as usage.
    Finish(Value),
    Unknown,
}

impl StreamRecord {
    pub fn parse(line: &str) -> Self {
        let Some((prefix, payload)) = line.split_once(':') else {
            return StreamRecord::Unknown;
        };

        match prefix {
            "0" => StreamRecord::Text(json_or_bare(payload)),
            "2" => json_array(payload).map_or(StreamRecord::Unknown, StreamRecord::Data),
            "8" => json_array(payload).map_or(StreamRecord::Unknown, StreamRecord::Annotations),
            "3" => StreamRecord::Error(json_or_bare(payload)),
            "e" | "d" => StreamRecord::Finish(serde_json::from_str(payload).unwrap_or(Value::Null)),
            _ => StreamRecord::Unknown,
        }
    }

    /// The `usage` object of a finish record.
    pub fn usage(&self) -> Option<&Value> {
        match self {
            StreamRecord::Finish(meta) => meta.get("usage"),
            _ => None,
        }
    }

    /// Encodes a text token as a `0:` line.
    pub fn text_line(text: &str) -> String {
        format!("0:{}", Value::String(text.to_string()))
    }
}

/// A JSON string payload, or the payload verbatim when it is not one.
fn json_or_bare(payload: &str) -> String {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::String(text)) => text,
        _ => payload.to_string(),
    }
}

fn json_array(payload: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(payload).ok()? {
        Value::Array(items) => Some(items),
        other => Some(vec![other]),
    }
}
