//! Conversation session: one active model connection, its readiness gate,
//! and the transcript.
//!
//! Turns run through `&mut self`, so they are serialized; the only
//! background work is tool registration for the current connection.

pub mod switcher;

use std::sync::Arc;
use std::time::Duration;

use strum::Display;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::coordinator::{StreamCoordinator, TurnOutcome};
use crate::error::ChatError;
use crate::gate::{wait_until_ready, Readiness, ReadinessPolicy, ToolReadinessGate};
use crate::metrics::{MetricsAccumulator, MetricsSnapshot};
use crate::provider::ModelConnection;
use crate::render::{artifact_id, ArtifactRenderer, TabularRenderer};
use crate::tools::{ToolRegistrar, ToolServerSpec};
use crate::transcript::{Transcript, TranscriptSink, TranscriptUnit};
use crate::types::TurnRequest;

pub use switcher::ModelSwitcher;

/// Where the session is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    AwaitingReadiness,
    Streaming,
    Finalizing,
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub readiness: Readiness,
    pub outcome: TurnOutcome,
    pub metrics: MetricsSnapshot,
}

pub struct Session {
    connection: Arc<dyn ModelConnection>,
    gate: ToolReadinessGate,
    transcript: Transcript,
    renderer: Arc<dyn ArtifactRenderer>,
    registrar: Option<Arc<dyn ToolRegistrar>>,
    tool_server: Option<ToolServerSpec>,
    registration: Option<JoinHandle<()>>,
    phase: SessionPhase,
    chart_counter: u64,
    last_metrics: Option<MetricsSnapshot>,
    plots_enabled: bool,
    system_prompt: Option<String>,
    readiness: ReadinessPolicy,
    read_timeout: Option<Duration>,
    chart_tools: Vec<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("model", &self.connection.model_id())
            .field("phase", &self.phase)
            .field("tools_ready", &self.gate.get())
            .field("transcript_len", &self.transcript.len())
            .field("chart_counter", &self.chart_counter)
            .field("plots_enabled", &self.plots_enabled)
            .finish()
    }
}

impl Session {
    pub fn new(connection: Arc<dyn ModelConnection>) -> Self {
        let defaults = ChatConfig::default();
        Self {
            connection,
            gate: ToolReadinessGate::new(),
            transcript: Transcript::new(),
            renderer: Arc::new(TabularRenderer::new()),
            registrar: None,
            tool_server: None,
            registration: None,
            phase: SessionPhase::Idle,
            chart_counter: 0,
            last_metrics: None,
            plots_enabled: defaults.plots_enabled,
            system_prompt: Some(defaults.system_prompt),
            readiness: defaults.readiness,
            read_timeout: defaults.stream_timeout,
            chart_tools: defaults.chart_tools,
        }
    }

    /// Apply turn settings from `config` (tool server included).
    pub fn with_config(mut self, config: &ChatConfig) -> Self {
        self.plots_enabled = config.plots_enabled;
        self.system_prompt = Some(config.system_prompt.clone()).filter(|p| !p.is_empty());
        self.readiness = config.readiness;
        self.read_timeout = config.stream_timeout;
        self.chart_tools = config.chart_tools.clone();
        self.tool_server = config.tool_server.clone();
        self
    }

    pub fn with_registrar(
        mut self,
        registrar: Arc<dyn ToolRegistrar>,
        tool_server: ToolServerSpec,
    ) -> Self {
        self.registrar = Some(registrar);
        self.tool_server = Some(tool_server);
        self
    }

    /// Registrar only; the tool server comes from [`with_config`](Self::with_config).
    pub fn with_tool_registrar(mut self, registrar: Arc<dyn ToolRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ArtifactRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn with_system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn with_readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn model_id(&self) -> &str {
        self.connection.model_id()
    }

    pub fn connection(&self) -> &Arc<dyn ModelConnection> {
        &self.connection
    }

    pub fn gate(&self) -> &ToolReadinessGate {
        &self.gate
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn last_metrics(&self) -> Option<&MetricsSnapshot> {
        self.last_metrics.as_ref()
    }

    pub fn chart_counter(&self) -> u64 {
        self.chart_counter
    }

    pub fn plots_enabled(&self) -> bool {
        self.plots_enabled
    }

    /// Takes effect from the next turn.
    pub fn set_plots_enabled(&mut self, enabled: bool) {
        self.plots_enabled = enabled;
    }

    /// Register tools for the current connection in the background.
    ///
    /// Without a configured tool server there is nothing to wait for and the
    /// gate latches immediately. Must be called inside a tokio runtime.
    pub fn start_registration(&mut self) {
        if let Some(previous) = self.registration.take() {
            previous.abort();
        }
        let epoch = self.gate.epoch();

        let (Some(registrar), Some(spec)) = (self.registrar.clone(), self.tool_server.clone())
        else {
            debug!("no tool server configured; tools ready");
            self.gate.set_for_epoch(epoch);
            return;
        };

        let gate = self.gate.clone();
        let registry = self.connection.tools().clone();
        let model = self.connection.model_id().to_string();
        self.registration = Some(tokio::spawn(async move {
            match registrar.register(&registry, &spec).await {
                Ok(names) => {
                    if gate.set_for_epoch(epoch) {
                        info!(%model, namespace = %spec.namespace, tools = ?names, "tools ready");
                    }
                }
                Err(e) => warn!(
                    %model,
                    namespace = %spec.namespace,
                    error = %e,
                    "tool registration failed; turns will run without tools"
                ),
            }
        }));
    }

    /// Run one user turn to completion.
    ///
    /// An upstream failure has already been recorded as an `Error` unit when
    /// this returns `Err`. The session is back to `Idle` either way, also when
    /// the returned future is dropped mid-turn.
    pub async fn submit(&mut self, message: impl Into<String>) -> Result<TurnReport, ChatError> {
        let message = message.into();
        self.transcript.append(TranscriptUnit::UserMessage {
            text: message.clone(),
        });

        let mut phase = PhaseGuard::new(&mut self.phase);
        let mut metrics = MetricsAccumulator::start(self.connection.usage_snapshot());

        phase.set(SessionPhase::AwaitingReadiness);
        let readiness = wait_until_ready(&self.gate, self.readiness).await;

        phase.set(SessionPhase::Streaming);
        let mut request = TurnRequest::new(message);
        if let Some(prompt) = &self.system_prompt {
            request = request.with_system_prompt(prompt.clone());
        }
        let coordinator =
            StreamCoordinator::new(self.renderer.clone(), artifact_id(self.chart_counter + 1))
                .plots_enabled(self.plots_enabled)
                .read_timeout(self.read_timeout)
                .extract_tools(self.chart_tools.iter().cloned());

        let connection = self.connection.clone();
        let outcome = coordinator
            .run(connection.as_ref(), &request, &mut self.transcript, &mut metrics)
            .await?;

        phase.set(SessionPhase::Finalizing);
        if outcome.artifact_emitted {
            self.chart_counter += 1;
        }

        let snapshot = metrics.finish(connection.usage_snapshot());
        self.transcript.append(TranscriptUnit::Metrics {
            metrics: snapshot.clone(),
        });
        self.last_metrics = Some(snapshot.clone());

        Ok(TurnReport {
            readiness,
            outcome,
            metrics: snapshot,
        })
    }

    /// Swap in a new connection: reset the gate and re-register tools.
    pub(crate) fn replace_connection(&mut self, connection: Arc<dyn ModelConnection>) {
        info!(from = %self.connection.model_id(), to = %connection.model_id(), "switching model");
        self.connection = connection;
        self.gate.reset();
        self.start_registration();
    }

    pub(crate) fn record_error(&mut self, message: String) {
        self.transcript.append(TranscriptUnit::Error { message });
    }
}

/// Holds the session phase for one turn and returns it to `Idle` on drop.
struct PhaseGuard<'a> {
    phase: &'a mut SessionPhase,
}

impl<'a> PhaseGuard<'a> {
    fn new(phase: &'a mut SessionPhase) -> Self {
        Self { phase }
    }

    fn set(&mut self, next: SessionPhase) {
        debug!(from = %self.phase, to = %next, "session phase");
        *self.phase = next;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.phase = SessionPhase::Idle;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.registration.take() {
            handle.abort();
        }
    }
}
