//! Canonical stream events.
//!
//! Every upstream chunk is normalized into a [`StreamEvent`] at the provider
//! boundary, so nothing downstream has to inspect chunk shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event from a model's response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental assistant text.
    TextDelta { text: String },
    /// The model asked for a tool to be invoked.
    ToolRequest {
        id: String,
        name: String,
        arguments: Value,
    },
    /// Output of a tool invocation. A `Value::String` is raw text that may
    /// carry an embedded JSON payload; arrays and objects are already
    /// structured.
    ToolResult { id: String, name: String, value: Value },
    /// Anything else the adapter chose to surface (reasoning, keep-alives).
    Other { kind: String },
}

impl StreamEvent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn tool_request(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self::ToolRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn tool_result(id: impl Into<String>, name: impl Into<String>, value: Value) -> Self {
        Self::ToolResult {
            id: id.into(),
            name: name.into(),
            value,
        }
    }
}

/// A single user turn sent to a model connection.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub message: String,
    pub system_prompt: Option<String>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = StreamEvent::tool_request("call_1", "get_sales_data", json!({"region": "North"}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_request");
        assert_eq!(value["name"], "get_sales_data");
        assert_eq!(value["arguments"]["region"], "North");
    }
}
