//! Incremental extraction of structured tool payloads.
//!
//! Tool results may arrive as text split at arbitrary points. The extractor
//! accumulates each tool's text and yields a [`ToolPayload`] for every
//! balanced, parseable JSON span, no matter where the splits fell.

mod scan;

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::trace;

/// Structured data decoded from a tool result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolPayload {
    pub tool_name: String,
    /// A JSON array (rows) or object (mapping).
    pub value: Value,
}

impl ToolPayload {
    /// The payload as table rows.
    ///
    /// An array yields its object elements; a lone object is a single row.
    pub fn rows(&self) -> Vec<&Map<String, Value>> {
        match &self.value {
            Value::Array(items) => items.iter().filter_map(Value::as_object).collect(),
            Value::Object(map) => vec![map],
            _ => Vec::new(),
        }
    }
}

/// Undecoded text for one tool within one turn.
#[derive(Debug, Default, Clone)]
pub struct ExtractionBuffer {
    text: String,
    consumed: usize,
}

impl ExtractionBuffer {
    /// Append an increment.
    pub fn push(&mut self, increment: &str) {
        if self.consumed == self.text.len() {
            self.text.clear();
            self.consumed = 0;
        }
        self.text.push_str(increment);
    }

    /// Text not yet consumed by an emitted payload.
    pub fn pending(&self) -> &str {
        &self.text[self.consumed..]
    }

    /// Decode the next payload from the unconsumed text, if one is complete.
    ///
    /// Arrays are preferred, so rows of a table are never emitted one by one.
    /// An object that closes before the first array candidate starts comes
    /// first. Objects that enclose that candidate, or start after a still-open
    /// array, wait for the array to finish.
    fn next_value(&mut self) -> Option<Value> {
        let pending = &self.text[self.consumed..];
        let array = first_array(pending);
        let limit = match &array {
            ArrayScan::Complete { start, .. } | ArrayScan::Open { start } => Some(*start),
            ArrayScan::Absent => None,
        };

        if let Some((end, value)) = first_object(pending, limit) {
            self.consumed += end;
            return Some(value);
        }
        match array {
            ArrayScan::Complete { end, value, .. } => {
                self.consumed += end;
                Some(value)
            }
            ArrayScan::Open { .. } | ArrayScan::Absent => None,
        }
    }
}

enum ArrayScan {
    Complete { start: usize, end: usize, value: Value },
    Open { start: usize },
    Absent,
}

/// First array candidate: a parseable closed span, or an open one that can
/// still become JSON. Unclosed prose brackets such as `[region North` are
/// passed over.
fn first_array(pending: &str) -> ArrayScan {
    let bytes = pending.as_bytes();
    for start in scan::positions(bytes, b'[') {
        match scan::span_end(bytes, start) {
            Some(end) => {
                if let Some(value) = parse_candidate(&pending[start..end]) {
                    return ArrayScan::Complete { start, end, value };
                }
            }
            None if scan::may_open_array(&bytes[start + 1..]) => {
                return ArrayScan::Open { start };
            }
            None => trace!(offset = start, "passing over unclosed bracket in prose"),
        }
    }
    ArrayScan::Absent
}

/// First parseable object starting before `limit`, returned with its end.
///
/// With no array candidate, an open object holds back everything after it.
fn first_object(pending: &str, limit: Option<usize>) -> Option<(usize, Value)> {
    let bytes = pending.as_bytes();
    for start in scan::positions(bytes, b'{') {
        if limit.is_some_and(|limit| start >= limit) {
            break;
        }
        match scan::span_end(bytes, start) {
            Some(end) if limit.map_or(true, |limit| end <= limit) => {
                if let Some(value) = parse_candidate(&pending[start..end]) {
                    return Some((end, value));
                }
            }
            Some(_) => {}
            None if !scan::may_open_object(&bytes[start + 1..]) => {}
            None if limit.is_none() => return None,
            None => {}
        }
    }
    None
}

fn parse_candidate(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => Some(value),
        Err(error) => {
            trace!(%error, len = candidate.len(), "discarding unparseable candidate span");
            None
        }
    }
}

/// Per-turn payload extractor, keyed by tool name.
///
/// Build a new one for every turn; buffers never outlive the turn that filled
/// them.
#[derive(Debug, Default)]
pub struct PayloadExtractor {
    buffers: HashMap<String, ExtractionBuffer>,
    emitted: usize,
}

impl PayloadExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one tool-result value.
    ///
    /// Strings are appended to the tool's buffer and scanned; arrays and
    /// objects are already structured and are accepted as-is.
    pub fn feed(&mut self, tool_name: &str, value: &Value) -> Vec<ToolPayload> {
        match value {
            Value::String(text) => self.push_text(tool_name, text),
            Value::Array(_) | Value::Object(_) => {
                self.emitted += 1;
                vec![ToolPayload {
                    tool_name: tool_name.to_string(),
                    value: value.clone(),
                }]
            }
            other => {
                trace!(tool = tool_name, value = %other, "ignoring scalar tool result");
                Vec::new()
            }
        }
    }

    /// Append a text increment for `tool_name` and return any payloads it
    /// completed.
    pub fn push_text(&mut self, tool_name: &str, increment: &str) -> Vec<ToolPayload> {
        let buffer = self.buffers.entry(tool_name.to_string()).or_default();
        buffer.push(increment);

        let mut payloads = Vec::new();
        while let Some(value) = buffer.next_value() {
            payloads.push(ToolPayload {
                tool_name: tool_name.to_string(),
                value,
            });
        }
        self.emitted += payloads.len();
        payloads
    }

    /// Unconsumed text buffered for `tool_name`.
    pub fn pending(&self, tool_name: &str) -> Option<&str> {
        self.buffers.get(tool_name).map(ExtractionBuffer::pending)
    }

    /// Payloads emitted so far this turn.
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}
