//! MCP client over an rmcp running service.

use rmcp::{
    model::{CallToolRequestParams, CallToolResult, ClientInfo, Content, JsonObject, ResourceContents},
    service::{ClientInitializeError, DynService, RoleClient, RunningService, ServiceError, ServiceExt},
    transport::TokioChildProcess,
};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::ChatError;

type DynClientService = Box<dyn DynService<RoleClient>>;
pub type McpRunningService = RunningService<RoleClient, DynClientService>;

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolSchema {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct McpToolCallResult {
    pub structured_content: Option<serde_json::Value>,
    pub text_content: Option<String>,
    pub content: Vec<serde_json::Value>,
}

impl McpToolCallResult {
    /// Structured content if present, else joined text, else raw content.
    ///
    /// Text output stays a `Value::String` so payload extraction can scan it.
    pub fn into_value_or_text(self) -> serde_json::Value {
        if let Some(structured) = self.structured_content {
            return structured;
        }
        if let Some(text) = self.text_content {
            return serde_json::Value::String(text);
        }
        serde_json::Value::Array(self.content)
    }
}

/// Initialized client session with one MCP server.
pub struct McpClient {
    session: McpRunningService,
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("closed", &self.session.is_closed())
            .finish()
    }
}

impl McpClient {
    /// Spawn `command args..` and complete the initialize handshake over its stdio.
    pub async fn connect_stdio(command: &str, args: &[String]) -> Result<Self, ChatError> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        let transport = TokioChildProcess::new(cmd)?;
        debug!(command, ?args, "spawned MCP tool server");

        let session = ClientInfo::default()
            .into_dyn()
            .serve(transport)
            .await
            .map_err(map_client_initialize_error)?;
        Ok(Self { session })
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    /// List every tool the server advertises.
    pub async fn list_tools(&self) -> Result<Vec<McpToolSchema>, ChatError> {
        if self.session.is_closed() {
            return Err(ChatError::Connection("MCP session is closed".into()));
        }

        let tools = match self.session.list_all_tools().await {
            Ok(tools) => tools,
            Err(ServiceError::UnexpectedResponse) => {
                let page = self
                    .session
                    .list_tools(None)
                    .await
                    .map_err(|e| map_service_error("list_tools", e))?;
                page.tools
            }
            Err(e) => return Err(map_service_error("list_tools", e)),
        };

        Ok(tools.into_iter().map(map_mcp_tool_schema).collect())
    }

    /// Execute a tool on the server.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<McpToolCallResult, ChatError> {
        if self.session.is_closed() {
            return Err(ChatError::Connection("MCP session is closed".into()));
        }
        let arguments = coerce_tool_arguments(arguments)?;

        let result = self
            .session
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|e| map_service_error("call_tool", e))?;

        map_call_result(name, result)
    }
}

fn map_mcp_tool_schema(tool: rmcp::model::Tool) -> McpToolSchema {
    McpToolSchema {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()),
        input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
    }
}

fn coerce_tool_arguments(value: serde_json::Value) -> Result<Option<JsonObject>, ChatError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let parsed: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
                ChatError::InvalidArgument(format!("MCP tool arguments must be valid JSON: {e}"))
            })?;
            coerce_tool_arguments(parsed)
        }
        other => Err(ChatError::InvalidArgument(format!(
            "MCP tool arguments must be a JSON object; got {other}"
        ))),
    }
}

fn extract_text_content(content: &[Content]) -> Option<String> {
    let mut lines = Vec::new();
    for item in content {
        if let Some(text) = item.as_text() {
            lines.push(text.text.clone());
            continue;
        }
        if let Some(resource) = item.as_resource() {
            if let ResourceContents::TextResourceContents { text, .. } = &resource.resource {
                lines.push(text.clone());
            }
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn map_call_result(name: &str, result: CallToolResult) -> Result<McpToolCallResult, ChatError> {
    let text_content = extract_text_content(&result.content);
    let content = result
        .content
        .iter()
        .filter_map(|item| serde_json::to_value(item).ok())
        .collect::<Vec<_>>();

    if result.is_error.unwrap_or(false) {
        let message = text_content
            .clone()
            .or_else(|| result.structured_content.as_ref().map(|v| v.to_string()))
            .unwrap_or_else(|| "MCP tool returned an error result".into());

        return Err(ChatError::ToolExecution {
            tool_name: name.to_string(),
            message,
        });
    }

    Ok(McpToolCallResult {
        structured_content: result.structured_content,
        text_content,
        content,
    })
}

fn map_client_initialize_error(error: ClientInitializeError) -> ChatError {
    match error {
        ClientInitializeError::ConnectionClosed(context) => {
            ChatError::Registration(format!("MCP initialize connection closed: {context}"))
        }
        ClientInitializeError::TransportError { error, context } => ChatError::Registration(
            format!("MCP initialize transport error ({context}): {error}"),
        ),
        ClientInitializeError::JsonRpcError(error) => ChatError::Registration(format!(
            "MCP initialize JSON-RPC error {}: {}",
            error.code.0, error.message
        )),
        ClientInitializeError::Cancelled => {
            ChatError::Registration("MCP initialize cancelled".into())
        }
        other => ChatError::Registration(format!("MCP initialize error: {other}")),
    }
}

fn map_service_error(context: &str, error: ServiceError) -> ChatError {
    match error {
        ServiceError::McpError(error) => ChatError::Protocol(format!(
            "{context}: MCP error {}: {}",
            error.code.0, error.message
        )),
        ServiceError::TransportSend(error) => {
            ChatError::Connection(format!("{context}: MCP transport send failed: {error}"))
        }
        ServiceError::TransportClosed => {
            ChatError::Connection(format!("{context}: MCP transport closed"))
        }
        ServiceError::UnexpectedResponse => {
            ChatError::Protocol(format!("{context}: unexpected MCP response"))
        }
        ServiceError::Cancelled { reason } => {
            let suffix = reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            ChatError::Connection(format!("{context}: MCP request cancelled{suffix}"))
        }
        ServiceError::Timeout { timeout } => ChatError::Timeout(timeout.as_millis() as u64),
        other => ChatError::Protocol(format!("{context}: MCP service error: {other}")),
    }
}
