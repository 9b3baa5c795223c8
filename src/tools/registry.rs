//! Tool registry and the registration-service seam.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::tool::Tool;
use crate::error::ChatError;

/// Tool definition sent to the model API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// How to launch and filter an external tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolServerSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Label for the tool server session; recorded on every registered tool.
    pub namespace: String,
    /// Allow-list of tool names. Empty means every advertised tool.
    #[serde(default)]
    pub include_tools: Vec<String>,
}

impl ToolServerSpec {
    pub fn allows(&self, tool_name: &str) -> bool {
        self.include_tools.is_empty() || self.include_tools.iter().any(|t| t == tool_name)
    }
}

#[derive(Clone)]
struct RegisteredTool {
    namespace: String,
    tool: Arc<dyn Tool>,
}

/// Tools currently callable by one model connection.
///
/// Clones share the same table, so a background registration task can fill
/// it while the connection is in use.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<BTreeMap<String, RegisteredTool>>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `tool` callable, replacing any tool with the same name.
    pub fn register(&self, namespace: &str, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let mut tools = self.tools.write().unwrap_or_else(|e| e.into_inner());
        tools.insert(
            name,
            RegisteredTool {
                namespace: namespace.to_string(),
                tool,
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().unwrap_or_else(|e| e.into_inner());
        tools.get(name).map(|entry| entry.tool.clone())
    }

    /// Names of registered tools, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let tools = self.tools.read().unwrap_or_else(|e| e.into_inner());
        tools.keys().cloned().collect()
    }

    pub fn namespace_of(&self, name: &str) -> Option<String> {
        let tools = self.tools.read().unwrap_or_else(|e| e.into_inner());
        tools.get(name).map(|entry| entry.namespace.clone())
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().unwrap_or_else(|e| e.into_inner());
        tools
            .values()
            .map(|entry| ToolDefinition {
                name: entry.tool.name().to_string(),
                description: entry.tool.description().to_string(),
                parameters: entry.tool.parameters().clone(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

/// External service that makes a tool server's tools callable.
#[async_trait]
pub trait ToolRegistrar: Send + Sync {
    /// Register the allow-listed tools of `spec` into `registry`, returning
    /// their names.
    async fn register(
        &self,
        registry: &ToolRegistry,
        spec: &ToolServerSpec,
    ) -> Result<Vec<String>, ChatError>;
}
