//! Fixed list of models offered for switching.

use super::selector::{ModelId, ModelSelector};
use crate::error::ChatError;

const DEFAULT_MODELS: &[&str] = &[
    "openai/gpt-4o",
    "openai/gpt-oss-120b",
    "openai/gpt-4.1",
    "anthropic/claude-sonnet-4",
    "deepseek/deepseek-chat-v3.1",
    "qwen/qwen3-30b-a3b",
    "qwen/qwen3-30b-a3b-thinking-2507",
];

/// Ordered model catalog; the first entry is the default model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    models: Vec<ModelId>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let models = DEFAULT_MODELS
            .iter()
            .filter_map(|id| ModelSelector::parse(id).ok())
            .collect();
        Self { models }
    }
}

impl ModelCatalog {
    /// Build a catalog from identifiers, rejecting malformed ones.
    pub fn new<I, S>(ids: I) -> Result<Self, ChatError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let models = ids
            .into_iter()
            .map(|id| ModelSelector::parse(id.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if models.is_empty() {
            return Err(ChatError::Configuration("model catalog is empty".into()));
        }
        Ok(Self { models })
    }

    pub fn models(&self) -> &[ModelId] {
        &self.models
    }

    pub fn default_model(&self) -> Option<&ModelId> {
        self.models.first()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.iter().any(|m| m.to_string() == id)
    }

    /// Resolve `id` against the catalog.
    pub fn resolve(&self, id: &str) -> Result<&ModelId, ChatError> {
        let parsed = ModelSelector::parse(id)?;
        self.models
            .iter()
            .find(|m| **m == parsed)
            .ok_or_else(|| ChatError::ModelNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_starts_with_gpt_4o() {
        let catalog = ModelCatalog::default();
        assert_eq!(catalog.models().len(), 7);
        assert_eq!(catalog.default_model().unwrap().to_string(), "openai/gpt-4o");
        assert!(catalog.contains("anthropic/claude-sonnet-4"));
    }

    #[test]
    fn resolve_unknown_model_is_not_found() {
        let catalog = ModelCatalog::default();
        assert!(matches!(
            catalog.resolve("meta/llama-9000"),
            Err(ChatError::ModelNotFound(_))
        ));
        assert!(matches!(
            catalog.resolve("nonsense"),
            Err(ChatError::InvalidArgument(_))
        ));
    }

    #[test]
    fn custom_catalog_validates_ids() {
        assert!(ModelCatalog::new(["openai/gpt-4o", "bad id"]).is_err());
        assert!(ModelCatalog::new(Vec::<String>::new()).is_err());
        let catalog = ModelCatalog::new(["qwen/qwen3-30b-a3b"]).unwrap();
        assert_eq!(catalog.default_model().unwrap().vendor(), "qwen");
    }
}
