//! Model identifier parsing.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

static MODEL_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9][a-z0-9._-]*)/([A-Za-z0-9][A-Za-z0-9._:-]*)$")
        .expect("model id validation regex must compile")
});

/// A routed model identifier of the form `vendor/model`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelId {
    vendor: String,
    name: String,
}

impl ModelId {
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.vendor, self.name)
    }
}

impl TryFrom<String> for ModelId {
    type Error = ChatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ModelSelector::parse(&value)
    }
}

impl From<ModelId> for String {
    fn from(id: ModelId) -> Self {
        id.to_string()
    }
}

impl FromStr for ModelId {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelSelector::parse(s)
    }
}

/// Parse "vendor/model" strings.
pub struct ModelSelector;

impl ModelSelector {
    /// Examples: "openai/gpt-4o", "qwen/qwen3-30b-a3b-thinking-2507".
    pub fn parse(s: &str) -> Result<ModelId, ChatError> {
        let captures = MODEL_ID_RE.captures(s.trim()).ok_or_else(|| {
            ChatError::InvalidArgument(format!(
                "Invalid model id '{s}': expected 'vendor/model'"
            ))
        })?;
        Ok(ModelId {
            vendor: captures[1].to_string(),
            name: captures[2].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_vendor_and_name() {
        let id = ModelSelector::parse("deepseek/deepseek-chat-v3.1").unwrap();
        assert_eq!(id.vendor(), "deepseek");
        assert_eq!(id.name(), "deepseek-chat-v3.1");
        assert_eq!(id.to_string(), "deepseek/deepseek-chat-v3.1");
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        for bad in ["gpt-4o", "openai:gpt-4o", "/gpt-4o", "openai/", "open ai/gpt"] {
            assert!(ModelSelector::parse(bad).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn serde_goes_through_validation() {
        let id: ModelId = serde_json::from_str("\"openai/gpt-4.1\"").unwrap();
        assert_eq!(id.name(), "gpt-4.1");
        assert!(serde_json::from_str::<ModelId>("\"gpt-4.1\"").is_err());
    }
}
