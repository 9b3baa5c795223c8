//! OpenRouter Chat Completions adapter.
//!
//! Streams `POST {base_url}/chat/completions`, normalizes each SSE chunk into
//! [`StreamEvent`]s, and runs requested tools through the connection's
//! [`ToolRegistry`] until the model stops asking for them.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::http::{
    bearer_headers, is_sse_done, parse_sse_data, shared_client, status_to_error, SseLineBuffer,
};
use super::{ConnectionFactory, ModelConnection};
use crate::config::{ChatConfig, DEFAULT_BASE_URL};
use crate::error::ChatError;
use crate::models::ModelCatalog;
use crate::tools::ToolRegistry;
use crate::types::{StreamEvent, TurnRequest, Usage};
use crate::util::usage::UsageTracker;

const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

/// Streaming connection to one OpenRouter-routed model.
///
/// Keeps the conversation history of completed turns; a failed turn leaves
/// the history untouched.
pub struct OpenRouterConnection {
    model_id: String,
    api_key: String,
    base_url: String,
    max_tool_rounds: u32,
    tools: ToolRegistry,
    usage: UsageTracker,
    history: Arc<Mutex<Vec<Value>>>,
}

impl std::fmt::Debug for OpenRouterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterConnection")
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .field("tools", &self.tools)
            .finish()
    }
}

impl OpenRouterConnection {
    pub fn new(model_id: impl Into<String>, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            tools: ToolRegistry::new(),
            usage: UsageTracker::new(),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Messages of completed turns (user, assistant and tool messages).
    pub fn history(&self) -> Vec<Value> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    fn request_context(&self) -> RequestContext {
        RequestContext {
            model_id: self.model_id.clone(),
            api_key: self.api_key.clone(),
            url: format!("{}/chat/completions", self.base_url),
            tools: self.tools.clone(),
        }
    }
}

#[async_trait]
impl ModelConnection for OpenRouterConnection {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn open_stream(
        &self,
        request: &TurnRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent, ChatError>>, ChatError> {
        let ctx = self.request_context();
        let mut messages = Vec::new();
        if let Some(prompt) = &request.system_prompt {
            messages.push(json!({ "role": "system", "content": prompt }));
        }
        let preamble = messages.len();
        messages.extend(self.history());
        messages.push(json!({ "role": "user", "content": request.message }));

        debug!(model = %ctx.model_id, tools = ctx.tools.tool_names().len(), "OpenRouter open_stream");
        let first = ctx.send(&messages).await?;

        let usage = self.usage.clone();
        let history = self.history.clone();
        let max_rounds = self.max_tool_rounds;

        let stream = async_stream::stream! {
            let mut response = Some(first);
            let mut rounds = 0u32;

            loop {
                let resp = match response.take() {
                    Some(resp) => resp,
                    None => match ctx.send(&messages).await {
                        Ok(resp) => resp,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                };

                let mut state = RoundState::default();
                let mut lines = SseLineBuffer::new();
                let byte_stream = resp.bytes_stream();
                futures::pin_mut!(byte_stream);

                'read: while let Some(chunk_result) = byte_stream.next().await {
                    let chunk = match chunk_result {
                        Ok(c) => c,
                        Err(e) => {
                            yield Err(ChatError::Network(e));
                            return;
                        }
                    };

                    lines.push(&chunk);

                    while let Some(line) = lines.next_line() {
                        match decode_line(&line, &mut state) {
                            Ok(Decoded::Chunk { events, usage: chunk_usage }) => {
                                if let Some(u) = chunk_usage {
                                    usage.record(&u);
                                }
                                for event in events {
                                    yield Ok(event);
                                }
                            }
                            Ok(Decoded::Done) => break 'read,
                            Ok(Decoded::Skip) => {}
                            Err(e) => {
                                yield Err(e);
                                return;
                            }
                        }
                    }
                }

                let (text, calls) = state.finish();
                if calls.is_empty() || rounds >= max_rounds {
                    if !calls.is_empty() {
                        warn!(rounds, "tool round limit reached; ignoring further tool calls");
                    }
                    messages.push(json!({ "role": "assistant", "content": text }));
                    break;
                }

                messages.push(assistant_with_calls(&text, &calls));
                for call in calls {
                    yield Ok(StreamEvent::tool_request(&call.id, &call.name, call.arguments.clone()));
                    let value = run_tool(&ctx.tools, &call).await;
                    messages.push(json!({
                        "role": "tool",
                        "tool_call_id": call.id,
                        "content": tool_content(&value),
                    }));
                    yield Ok(StreamEvent::tool_result(call.id, call.name, value));
                }
                rounds += 1;
            }

            match history.lock() {
                Ok(mut h) => *h = messages.split_off(preamble),
                Err(_) => warn!("history lock poisoned; turn not recorded"),
            }
        };

        Ok(Box::pin(stream))
    }

    fn usage_snapshot(&self) -> Option<Usage> {
        self.usage.snapshot()
    }

    fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

#[derive(Clone)]
struct RequestContext {
    model_id: String,
    api_key: String,
    url: String,
    tools: ToolRegistry,
}

impl RequestContext {
    fn body(&self, messages: &[Value]) -> Value {
        let mut body = json!({
            "model": self.model_id,
            "messages": messages,
            "stream": true,
            "usage": { "include": true },
        });

        let definitions = self.tools.definitions();
        if !definitions.is_empty() {
            body["tools"] = definitions
                .into_iter()
                .map(|d| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": d.name,
                            "description": d.description,
                            "parameters": d.parameters,
                        }
                    })
                })
                .collect();
        }
        body
    }

    async fn send(&self, messages: &[Value]) -> Result<reqwest::Response, ChatError> {
        let resp = shared_client()
            .post(&self.url)
            .headers(bearer_headers(&self.api_key))
            .json(&self.body(messages))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), &body_text));
        }
        Ok(resp)
    }
}

enum Decoded {
    Chunk {
        events: Vec<StreamEvent>,
        usage: Option<Usage>,
    },
    Done,
    Skip,
}

/// Decode one SSE line, folding tool-call fragments into `state`.
fn decode_line(line: &str, state: &mut RoundState) -> Result<Decoded, ChatError> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(Decoded::Skip);
    }
    if is_sse_done(line) {
        return Ok(Decoded::Done);
    }
    let Some(data) = parse_sse_data(line) else {
        return Ok(Decoded::Skip);
    };

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!(error = %e, "skipping unparseable chunk");
            return Ok(Decoded::Skip);
        }
    };

    if let Some(error) = chunk.error {
        return Err(ChatError::Protocol(error.message));
    }

    let mut events = Vec::new();
    for choice in chunk.choices {
        let delta = choice.delta;
        if delta.reasoning.as_deref().is_some_and(|r| !r.is_empty()) && !state.reasoning_seen {
            state.reasoning_seen = true;
            events.push(StreamEvent::Other {
                kind: "reasoning".to_string(),
            });
        }
        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            state.text.push_str(&text);
            events.push(StreamEvent::text(text));
        }
        for fragment in delta.tool_calls.unwrap_or_default() {
            state.absorb(fragment);
        }
    }

    let usage = chunk.usage.map(Usage::from);
    if events.is_empty() && usage.is_none() {
        return Ok(Decoded::Skip);
    }
    Ok(Decoded::Chunk { events, usage })
}

/// Text and tool-call fragments collected during one request.
#[derive(Debug, Default)]
struct RoundState {
    text: String,
    calls: BTreeMap<u32, PendingCall>,
    reasoning_seen: bool,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

#[derive(Debug)]
struct ToolCall {
    id: String,
    name: String,
    arguments: Value,
    raw_arguments: String,
}

impl RoundState {
    fn absorb(&mut self, fragment: ToolCallDelta) {
        let pending = self.calls.entry(fragment.index).or_default();
        if let Some(id) = fragment.id.filter(|id| !id.is_empty()) {
            pending.id = Some(id);
        }
        if let Some(function) = fragment.function {
            if let Some(name) = function.name {
                pending.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                pending.arguments.push_str(&arguments);
            }
        }
    }

    fn finish(self) -> (String, Vec<ToolCall>) {
        let calls = self
            .calls
            .into_values()
            .filter(|pending| !pending.name.is_empty())
            .map(|pending| {
                let raw_arguments = if pending.arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    pending.arguments
                };
                let arguments = serde_json::from_str(&raw_arguments)
                    .unwrap_or_else(|_| Value::String(raw_arguments.clone()));
                ToolCall {
                    id: pending
                        .id
                        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                    name: pending.name,
                    arguments,
                    raw_arguments,
                }
            })
            .collect();
        (self.text, calls)
    }
}

fn assistant_with_calls(text: &str, calls: &[ToolCall]) -> Value {
    let tool_calls: Vec<Value> = calls
        .iter()
        .map(|call| {
            json!({
                "id": call.id,
                "type": "function",
                "function": {
                    "name": call.name,
                    "arguments": call.raw_arguments,
                }
            })
        })
        .collect();
    json!({
        "role": "assistant",
        "content": if text.is_empty() { Value::Null } else { Value::String(text.to_string()) },
        "tool_calls": tool_calls,
    })
}

/// Run one requested tool. Failures become error text for the model.
async fn run_tool(tools: &ToolRegistry, call: &ToolCall) -> Value {
    let Some(tool) = tools.get(&call.name) else {
        warn!(tool = %call.name, "model requested an unregistered tool");
        return Value::String(format!("Error: tool '{}' is not available", call.name));
    };
    match tool.execute(call.arguments.clone()).await {
        Ok(value) => value,
        Err(e) => {
            warn!(tool = %call.name, error = %e, "tool execution failed");
            Value::String(format!("Error: {e}"))
        }
    }
}

fn tool_content(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// OpenRouter stream chunk types (internal)

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<ChunkUsage>,
    error: Option<ChunkError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct ChunkUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u32,
}

impl From<ChunkUsage> for Usage {
    fn from(u: ChunkUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            cache_read_tokens: u.prompt_tokens_details.map(|d| d.cached_tokens),
        }
    }
}

#[derive(Deserialize)]
struct ChunkError {
    message: String,
}

/// Builds [`OpenRouterConnection`]s for catalog models.
#[derive(Debug, Clone)]
pub struct OpenRouterFactory {
    catalog: ModelCatalog,
    api_key: Option<String>,
    base_url: String,
    max_tool_rounds: u32,
}

impl OpenRouterFactory {
    pub fn new(catalog: ModelCatalog, api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            catalog,
            api_key,
            base_url: base_url.into(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn from_config(config: &ChatConfig, catalog: ModelCatalog) -> Self {
        Self {
            catalog,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            max_tool_rounds: config.max_tool_rounds,
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }
}

impl ConnectionFactory for OpenRouterFactory {
    fn connect(&self, model_id: &str) -> Result<Arc<dyn ModelConnection>, ChatError> {
        let model = self.catalog.resolve(model_id)?;
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| ChatError::Configuration("OPENROUTER_API_KEY is not set".into()))?;
        debug!(model = %model, "building OpenRouter connection");
        Ok(Arc::new(
            OpenRouterConnection::new(model.to_string(), api_key, Some(self.base_url.clone()))
                .with_max_tool_rounds(self.max_tool_rounds),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn events(decoded: Decoded) -> Vec<StreamEvent> {
        match decoded {
            Decoded::Chunk { events, .. } => events,
            _ => panic!("expected a chunk"),
        }
    }

    #[test]
    fn decodes_text_delta() {
        let mut state = RoundState::default();
        let decoded = decode_line(
            r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#,
            &mut state,
        )
        .unwrap();
        assert_eq!(events(decoded), vec![StreamEvent::text("Hello")]);
        assert_eq!(state.text, "Hello");
    }

    #[test]
    fn assembles_tool_call_fragments_by_index() {
        let mut state = RoundState::default();
        for line in [
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"get_sales_data","arguments":""}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"region\":"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"West\"}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"function":{"name":"get_current_date"}}]}}]}"#,
        ] {
            assert!(matches!(decode_line(line, &mut state).unwrap(), Decoded::Skip));
        }

        let (_, calls) = state.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].arguments, json!({"region": "West"}));
        assert_eq!(calls[1].name, "get_current_date");
        assert!(calls[1].id.starts_with("call_"));
        assert_eq!(calls[1].arguments, json!({}));
    }

    #[test]
    fn usage_chunk_reads_cached_tokens() {
        let mut state = RoundState::default();
        let decoded = decode_line(
            r#"data: {"choices":[],"usage":{"prompt_tokens":120,"completion_tokens":45,"total_tokens":165,"prompt_tokens_details":{"cached_tokens":64}}}"#,
            &mut state,
        )
        .unwrap();
        match decoded {
            Decoded::Chunk {
                events,
                usage: Some(usage),
            } => {
                assert!(events.is_empty());
                assert_eq!(usage.input_tokens, 120);
                assert_eq!(usage.cache_read_tokens, Some(64));
            }
            _ => panic!("expected usage"),
        }
    }

    #[test]
    fn error_payload_is_protocol_error() {
        let mut state = RoundState::default();
        let err = decode_line(
            r#"data: {"error":{"message":"Provider returned error","code":502}}"#,
            &mut state,
        )
        .err()
        .unwrap();
        assert!(matches!(err, ChatError::Protocol(ref m) if m == "Provider returned error"));
    }

    #[test]
    fn comments_done_and_garbage() {
        let mut state = RoundState::default();
        assert!(matches!(
            decode_line(": OPENROUTER PROCESSING", &mut state).unwrap(),
            Decoded::Skip
        ));
        assert!(matches!(
            decode_line("data: [DONE]", &mut state).unwrap(),
            Decoded::Done
        ));
        assert!(matches!(
            decode_line("data: {not json", &mut state).unwrap(),
            Decoded::Skip
        ));
    }

    #[test]
    fn reasoning_surfaces_once_per_round() {
        let mut state = RoundState::default();
        let line = r#"data: {"choices":[{"delta":{"reasoning":"thinking"}}]}"#;
        let first = events(decode_line(line, &mut state).unwrap());
        assert_eq!(first, vec![StreamEvent::Other { kind: "reasoning".into() }]);
        assert!(matches!(decode_line(line, &mut state).unwrap(), Decoded::Skip));
    }

    #[test]
    fn factory_checks_catalog_then_key() {
        let factory = OpenRouterFactory::new(ModelCatalog::default(), None, DEFAULT_BASE_URL);
        assert!(matches!(
            factory.connect("meta/unknown"),
            Err(ChatError::ModelNotFound(_))
        ));
        assert!(matches!(
            factory.connect("openai/gpt-4o"),
            Err(ChatError::Configuration(_))
        ));

        let factory = OpenRouterFactory::new(
            ModelCatalog::default(),
            Some("sk-or-test".into()),
            DEFAULT_BASE_URL,
        );
        let conn = factory.connect("openai/gpt-4.1").unwrap();
        assert_eq!(conn.model_id(), "openai/gpt-4.1");
        assert!(conn.tools().is_empty());
    }
}
