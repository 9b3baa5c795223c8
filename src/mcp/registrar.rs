//! Registration of MCP tools into a tool registry.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::client::{McpClient, McpToolSchema};
use crate::error::ChatError;
use crate::tools::{Tool, ToolRegistrar, ToolRegistry, ToolServerSpec};

/// One MCP server tool exposed through the [`Tool`] trait.
pub struct McpTool {
    client: Arc<McpClient>,
    name: String,
    description: String,
    parameters: Value,
}

impl McpTool {
    pub fn new(client: Arc<McpClient>, schema: McpToolSchema) -> Self {
        Self {
            client,
            description: schema.description.unwrap_or_default(),
            name: schema.name,
            parameters: schema.input_schema,
        }
    }
}

impl std::fmt::Debug for McpTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpTool").field("name", &self.name).finish()
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &Value {
        &self.parameters
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ChatError> {
        let result = self.client.call_tool(&self.name, arguments).await?;
        Ok(result.into_value_or_text())
    }
}

/// Spawns stdio MCP servers and registers their allow-listed tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct McpRegistrar;

impl McpRegistrar {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRegistrar for McpRegistrar {
    async fn register(
        &self,
        registry: &ToolRegistry,
        spec: &ToolServerSpec,
    ) -> Result<Vec<String>, ChatError> {
        let client = Arc::new(McpClient::connect_stdio(&spec.command, &spec.args).await?);
        let advertised = client.list_tools().await?;
        let selected = select_tools(spec, advertised)?;

        let names: Vec<String> = selected.iter().map(|s| s.name.clone()).collect();
        for schema in selected {
            registry.register(&spec.namespace, Arc::new(McpTool::new(client.clone(), schema)));
        }
        info!(namespace = %spec.namespace, tools = ?names, "registered MCP tools");
        Ok(names)
    }
}

/// Keep the allow-listed tools, warning about listed names the server lacks.
fn select_tools(
    spec: &ToolServerSpec,
    advertised: Vec<McpToolSchema>,
) -> Result<Vec<McpToolSchema>, ChatError> {
    for wanted in &spec.include_tools {
        if !advertised.iter().any(|t| &t.name == wanted) {
            warn!(namespace = %spec.namespace, tool = %wanted, "allow-listed tool not advertised");
        }
    }

    let selected: Vec<McpToolSchema> = advertised
        .into_iter()
        .filter(|t| spec.allows(&t.name))
        .collect();
    if selected.is_empty() {
        return Err(ChatError::Registration(format!(
            "tool server '{}' offers none of the requested tools",
            spec.namespace
        )));
    }
    Ok(selected)
}
