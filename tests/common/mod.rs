//! Shared test helpers: scripted connections, factories and registrars.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::{json, Value};

use tabletalk::error::ChatError;
use tabletalk::provider::{ConnectionFactory, ModelConnection};
use tabletalk::tools::{FnTool, ToolRegistrar, ToolRegistry, ToolServerSpec};
use tabletalk::types::{StreamEvent, TurnRequest, Usage};

pub type Script = Vec<Result<StreamEvent, ChatError>>;

/// A connection that replays queued event scripts, one per turn.
///
/// A hanging turn replays its script and then never ends.
pub struct ScriptedConnection {
    model_id: String,
    turns: Mutex<VecDeque<(Script, bool)>>,
    requests: Mutex<Vec<TurnRequest>>,
    usage: Mutex<Option<Usage>>,
    usage_on_open: Mutex<VecDeque<Usage>>,
    tools: ToolRegistry,
}

impl ScriptedConnection {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            turns: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            usage: Mutex::new(Some(Usage::default())),
            usage_on_open: Mutex::new(VecDeque::new()),
            tools: ToolRegistry::new(),
        }
    }

    pub fn queue_turn(&self, script: Script) -> &Self {
        self.turns.lock().unwrap().push_back((script, false));
        self
    }

    pub fn queue_hanging_turn(&self, script: Script) -> &Self {
        self.turns.lock().unwrap().push_back((script, true));
        self
    }

    /// Cumulative usage the connection reports once the next turn opens.
    pub fn queue_usage(&self, usage: Usage) -> &Self {
        self.usage_on_open.lock().unwrap().push_back(usage);
        self
    }

    pub fn set_usage(&self, usage: Option<Usage>) {
        *self.usage.lock().unwrap() = usage;
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelConnection for ScriptedConnection {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn open_stream(
        &self,
        request: &TurnRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent, ChatError>>, ChatError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(next) = self.usage_on_open.lock().unwrap().pop_front() {
            *self.usage.lock().unwrap() = Some(next);
        }
        let (script, hangs) = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChatError::Connection("no scripted turn left".into()))?;
        let head = stream::iter(script);
        if hangs {
            Ok(head.chain(stream::pending()).boxed())
        } else {
            Ok(head.boxed())
        }
    }

    fn usage_snapshot(&self) -> Option<Usage> {
        self.usage.lock().unwrap().clone()
    }

    fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}

/// Factory over a fixed set of scripted connections.
#[derive(Default)]
pub struct ScriptedFactory {
    connections: HashMap<String, Arc<ScriptedConnection>>,
}

impl ScriptedFactory {
    pub fn with(mut self, connection: Arc<ScriptedConnection>) -> Self {
        self.connections
            .insert(connection.model_id().to_string(), connection);
        self
    }
}

impl ConnectionFactory for ScriptedFactory {
    fn connect(&self, model_id: &str) -> Result<Arc<dyn ModelConnection>, ChatError> {
        self.connections
            .get(model_id)
            .map(|c| c.clone() as Arc<dyn ModelConnection>)
            .ok_or_else(|| ChatError::ModelNotFound(model_id.to_string()))
    }
}

pub fn sales_spec() -> ToolServerSpec {
    ToolServerSpec {
        command: "python3".into(),
        args: vec!["-u".into(), "mcp_sales_server.py".into()],
        namespace: "sales_mcp".into(),
        include_tools: vec!["get_sales_data".into(), "get_current_date".into()],
    }
}

fn register_fake_tools(registry: &ToolRegistry, spec: &ToolServerSpec) -> Vec<String> {
    for name in &spec.include_tools {
        registry.register(
            &spec.namespace,
            Arc::new(FnTool::new(
                name.clone(),
                "fake tool",
                json!({"type": "object"}),
                |_| async { Ok(Value::String("ok".into())) },
            )),
        );
    }
    spec.include_tools.clone()
}

/// Registers the allow-listed names after an optional delay.
#[derive(Default)]
pub struct FakeRegistrar {
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeRegistrar {
    pub fn immediate() -> Self {
        Self::default()
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ToolRegistrar for FakeRegistrar {
    async fn register(
        &self,
        registry: &ToolRegistry,
        spec: &ToolServerSpec,
    ) -> Result<Vec<String>, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(register_fake_tools(registry, spec))
    }
}

/// Never finishes registering.
pub struct StuckRegistrar;

#[async_trait]
impl ToolRegistrar for StuckRegistrar {
    async fn register(
        &self,
        _registry: &ToolRegistry,
        _spec: &ToolServerSpec,
    ) -> Result<Vec<String>, ChatError> {
        futures::future::pending().await
    }
}

/// Always fails to register.
pub struct FailingRegistrar;

#[async_trait]
impl ToolRegistrar for FailingRegistrar {
    async fn register(
        &self,
        _registry: &ToolRegistry,
        spec: &ToolServerSpec,
    ) -> Result<Vec<String>, ChatError> {
        Err(ChatError::Registration(format!(
            "could not start '{}'",
            spec.command
        )))
    }
}

/// First call completes after `delay`; later calls never finish.
pub struct SlowOnceRegistrar {
    pub delay: Duration,
    calls: AtomicUsize,
}

impl SlowOnceRegistrar {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ToolRegistrar for SlowOnceRegistrar {
    async fn register(
        &self,
        registry: &ToolRegistry,
        spec: &ToolServerSpec,
    ) -> Result<Vec<String>, ChatError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return futures::future::pending().await;
        }
        tokio::time::sleep(self.delay).await;
        Ok(register_fake_tools(registry, spec))
    }
}

/// Tool output in the sales server's "description, table, JSON" layout.
pub fn sales_output(rows: Value) -> Value {
    Value::String(format!(
        "Sales data by product\n\nProduct | Sales\n--- | ---\n\nJSON: {rows}"
    ))
}

pub fn usage(input: u32, output: u32, cached: u32) -> Usage {
    Usage {
        input_tokens: input,
        output_tokens: output,
        total_tokens: input + output,
        cache_read_tokens: Some(cached),
    }
}
