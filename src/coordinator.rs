//! Per-turn stream driver.
//!
//! Forwards every upstream event to the transcript as it arrives, mirrors
//! tool results into the payload extractor, and holds back at most one
//! rendered artifact until the stream has closed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::extract::{PayloadExtractor, ToolPayload};
use crate::metrics::MetricsAccumulator;
use crate::provider::ModelConnection;
use crate::render::{Artifact, ArtifactRenderer};
use crate::transcript::{TranscriptSink, TranscriptUnit};
use crate::types::{StreamEvent, TurnRequest};
use crate::util::timeout::maybe_timeout;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(120);

/// What a completed turn produced besides the forwarded events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    /// Events forwarded to the transcript.
    pub events: usize,
    /// Every payload extracted during the turn, in order.
    pub payloads: Vec<ToolPayload>,
    /// Whether an artifact was appended after the stream closed.
    pub artifact_emitted: bool,
}

/// Drives one turn. Build a fresh one per turn.
pub struct StreamCoordinator {
    extractor: PayloadExtractor,
    renderer: Arc<dyn ArtifactRenderer>,
    artifact_id: String,
    plots_enabled: bool,
    read_timeout: Option<Duration>,
    extract_tools: HashSet<String>,
    deferred: Option<Artifact>,
    payloads: Vec<ToolPayload>,
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator")
            .field("artifact_id", &self.artifact_id)
            .field("plots_enabled", &self.plots_enabled)
            .field("read_timeout", &self.read_timeout)
            .field("extract_tools", &self.extract_tools)
            .finish()
    }
}

impl StreamCoordinator {
    pub fn new(renderer: Arc<dyn ArtifactRenderer>, artifact_id: impl Into<String>) -> Self {
        Self {
            extractor: PayloadExtractor::new(),
            renderer,
            artifact_id: artifact_id.into(),
            plots_enabled: true,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            extract_tools: HashSet::from(["get_sales_data".to_string()]),
            deferred: None,
            payloads: Vec::new(),
        }
    }

    pub fn plots_enabled(mut self, enabled: bool) -> Self {
        self.plots_enabled = enabled;
        self
    }

    /// Bound on opening the stream and on each chunk read.
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Tool names whose results are scanned for payloads.
    pub fn extract_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extract_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Run the turn to completion.
    ///
    /// On a turn-fatal upstream failure a single `Error` unit is appended, no
    /// deferred artifact is emitted, and the error is returned. Other failed
    /// items are logged and skipped.
    pub async fn run(
        mut self,
        connection: &dyn ModelConnection,
        request: &TurnRequest,
        sink: &mut dyn TranscriptSink,
        metrics: &mut MetricsAccumulator,
    ) -> Result<TurnOutcome, ChatError> {
        let opened = maybe_timeout(self.read_timeout, connection.open_stream(request))
            .await
            .and_then(|result| result);
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => return Err(abort(sink, e)),
        };

        let mut events = 0usize;
        loop {
            let next = match maybe_timeout(self.read_timeout, stream.next()).await {
                Ok(next) => next,
                Err(e) => return Err(abort(sink, e)),
            };
            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) if !e.is_turn_fatal() => {
                    warn!(error = %e, "skipping failed stream item");
                    continue;
                }
                Some(Err(e)) => return Err(abort(sink, e)),
                None => break,
            };

            sink.append(TranscriptUnit::from(event.clone()));
            events += 1;
            self.observe(&event, metrics);
        }

        let artifact_emitted = match self.deferred.take() {
            Some(artifact) if self.plots_enabled => {
                debug!(id = %artifact.id, "emitting deferred artifact");
                sink.append(TranscriptUnit::Artifact { artifact });
                true
            }
            _ => false,
        };

        Ok(TurnOutcome {
            events,
            payloads: self.payloads,
            artifact_emitted,
        })
    }

    fn observe(&mut self, event: &StreamEvent, metrics: &mut MetricsAccumulator) {
        let StreamEvent::ToolResult { name, value, .. } = event else {
            return;
        };
        metrics.record_tool_result();
        if !self.extract_tools.contains(name) {
            return;
        }

        for payload in self.extractor.feed(name, value) {
            if self.plots_enabled {
                match self.renderer.render(&payload, &self.artifact_id) {
                    Ok(artifact) => self.deferred = Some(artifact),
                    Err(e) => warn!(tool = %name, error = %e, "could not render tool payload"),
                }
            }
            self.payloads.push(payload);
        }
    }
}

fn abort(sink: &mut dyn TranscriptSink, error: ChatError) -> ChatError {
    warn!(error = %error, "turn aborted");
    sink.append(TranscriptUnit::Error {
        message: error.to_string(),
    });
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ArtifactKind, TabularRenderer};
    use crate::tools::ToolRegistry;
    use crate::types::Usage;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    type Script = Vec<Result<StreamEvent, ChatError>>;

    struct Scripted {
        script: std::sync::Mutex<Option<Script>>,
        hang_after: bool,
        tools: ToolRegistry,
    }

    impl Scripted {
        fn new(script: Script) -> Self {
            Self {
                script: std::sync::Mutex::new(Some(script)),
                hang_after: false,
                tools: ToolRegistry::new(),
            }
        }

        fn hanging(script: Script) -> Self {
            Self {
                hang_after: true,
                ..Self::new(script)
            }
        }
    }

    #[async_trait]
    impl ModelConnection for Scripted {
        fn model_id(&self) -> &str {
            "test/scripted"
        }

        async fn open_stream(
            &self,
            _request: &TurnRequest,
        ) -> Result<BoxStream<'static, Result<StreamEvent, ChatError>>, ChatError> {
            let script = self
                .script
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| ChatError::Connection("script already used".into()))?;
            let head = stream::iter(script);
            if self.hang_after {
                Ok(head.chain(stream::pending()).boxed())
            } else {
                Ok(head.boxed())
            }
        }

        fn usage_snapshot(&self) -> Option<Usage> {
            None
        }

        fn tools(&self) -> &ToolRegistry {
            &self.tools
        }
    }

    fn coordinator() -> StreamCoordinator {
        StreamCoordinator::new(Arc::new(TabularRenderer::new()), "sales_chart_1_0")
    }

    fn sales_result(id: &str, rows: &str) -> StreamEvent {
        StreamEvent::tool_result(
            id,
            "get_sales_data",
            json!(format!("Top products\n\nJSON: {rows}")),
        )
    }

    async fn run(
        coordinator: StreamCoordinator,
        connection: &Scripted,
    ) -> (Result<TurnOutcome, ChatError>, Vec<TranscriptUnit>, u32) {
        let mut sink = Vec::new();
        let mut metrics = MetricsAccumulator::start(None);
        let result = coordinator
            .run(connection, &TurnRequest::new("show sales"), &mut sink, &mut metrics)
            .await;
        (result, sink, metrics.tool_calls())
    }

    #[tokio::test]
    async fn events_forwarded_in_order_with_artifact_last() {
        let script = vec![
            Ok(StreamEvent::text("Let me check. ")),
            Ok(StreamEvent::tool_request("c1", "get_sales_data", json!({}))),
            Ok(sales_result("c1", r#"[{"Product":"Widget","Sales":10}]"#)),
            Ok(StreamEvent::text("Widgets lead.")),
        ];
        let expected: Vec<TranscriptUnit> = script
            .iter()
            .map(|e| TranscriptUnit::from(e.as_ref().unwrap().clone()))
            .collect();
        let connection = Scripted::new(script);

        let (result, sink, tool_calls) = run(coordinator(), &connection).await;
        let outcome = result.unwrap();

        assert_eq!(&sink[..4], expected.as_slice());
        assert_eq!(sink.len(), 5);
        match &sink[4] {
            TranscriptUnit::Artifact { artifact } => {
                assert_eq!(artifact.id, "sales_chart_1_0");
                assert_eq!(artifact.kind, ArtifactKind::Chart);
            }
            other => panic!("expected artifact, got {other:?}"),
        }
        assert_eq!(tool_calls, 1);
        assert_eq!(outcome.events, 4);
        assert_eq!(outcome.payloads.len(), 1);
        assert!(outcome.artifact_emitted);
    }

    #[tokio::test]
    async fn later_payload_replaces_deferred_artifact() {
        let connection = Scripted::new(vec![
            Ok(sales_result("c1", r#"[{"Product":"Widget","Sales":10}]"#)),
            Ok(sales_result("c2", r#"[{"Region":"West","TotalSales":99}]"#)),
        ]);

        let (result, sink, tool_calls) = run(coordinator(), &connection).await;

        assert_eq!(result.unwrap().payloads.len(), 2);
        assert_eq!(tool_calls, 2);
        let artifacts: Vec<&Artifact> = sink
            .iter()
            .filter_map(|u| match u {
                TranscriptUnit::Artifact { artifact } => Some(artifact),
                _ => None,
            })
            .collect();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].x_column.as_deref(), Some("Region"));
    }

    #[tokio::test]
    async fn plots_disabled_suppresses_artifact() {
        let connection = Scripted::new(vec![Ok(sales_result(
            "c1",
            r#"[{"Product":"Widget","Sales":10}]"#,
        ))]);

        let (result, sink, _) = run(coordinator().plots_enabled(false), &connection).await;

        let outcome = result.unwrap();
        assert!(!outcome.artifact_emitted);
        assert_eq!(outcome.payloads.len(), 1);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn mid_stream_failure_appends_one_error_and_no_artifact() {
        let connection = Scripted::new(vec![
            Ok(sales_result("c1", r#"[{"Product":"Widget","Sales":10}]"#)),
            Ok(StreamEvent::text("partial")),
            Err(ChatError::Connection("reset by peer".into())),
        ]);

        let (result, sink, _) = run(coordinator(), &connection).await;

        assert!(matches!(result, Err(ChatError::Connection(_))));
        assert_eq!(sink.len(), 3);
        assert!(matches!(sink[2], TranscriptUnit::Error { .. }));
        assert!(!sink
            .iter()
            .any(|u| matches!(u, TranscriptUnit::Artifact { .. })));
    }

    #[tokio::test]
    async fn local_item_failure_does_not_end_the_turn() {
        let connection = Scripted::new(vec![
            Ok(StreamEvent::text("Checking. ")),
            Err(ChatError::ToolExecution {
                tool_name: "get_sales_data".into(),
                message: "bad arguments".into(),
            }),
            Ok(sales_result("c1", r#"[{"Product":"Widget","Sales":10}]"#)),
        ]);

        let (result, sink, _) = run(coordinator(), &connection).await;

        let outcome = result.unwrap();
        assert_eq!(outcome.events, 2);
        assert!(outcome.artifact_emitted);
        assert!(!sink
            .iter()
            .any(|u| matches!(u, TranscriptUnit::Error { .. })));
    }

    #[tokio::test]
    async fn open_failure_appends_error() {
        let connection = Scripted::new(vec![]);
        connection.script.lock().unwrap().take();

        let (result, sink, _) = run(coordinator(), &connection).await;

        assert!(result.is_err());
        assert_eq!(sink.len(), 1);
        assert!(matches!(sink[0], TranscriptUnit::Error { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out() {
        let connection = Scripted::hanging(vec![Ok(StreamEvent::text("hello"))]);

        let (result, sink, _) = run(
            coordinator().read_timeout(Some(Duration::from_secs(5))),
            &connection,
        )
        .await;

        assert!(matches!(result, Err(ChatError::Timeout(5000))));
        assert_eq!(sink.len(), 2);
        assert!(matches!(sink[1], TranscriptUnit::Error { .. }));
    }

    #[tokio::test]
    async fn unlisted_tools_are_counted_not_extracted() {
        let connection = Scripted::new(vec![Ok(StreamEvent::tool_result(
            "c1",
            "get_current_date",
            json!("Today is 2024-06-01. JSON: [{\"Sales\": 1}]"),
        ))]);

        let (result, _, tool_calls) = run(coordinator(), &connection).await;

        assert_eq!(tool_calls, 1);
        assert!(result.unwrap().payloads.is_empty());
    }

    #[tokio::test]
    async fn render_failure_keeps_turn_going() {
        let connection = Scripted::new(vec![
            Ok(sales_result("c1", "[]")),
            Ok(StreamEvent::text("No rows matched.")),
        ]);

        let (result, sink, _) = run(coordinator(), &connection).await;

        let outcome = result.unwrap();
        assert_eq!(outcome.payloads.len(), 1);
        assert!(!outcome.artifact_emitted);
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn replaying_a_stream_gives_identical_transcripts() {
        let script = || {
            vec![
                Ok(StreamEvent::text("a")),
                Ok(sales_result("c1", r#"[{"Period":"2024-01","TotalSales":5}]"#)),
                Ok(StreamEvent::text("b")),
            ]
        };

        let (_, first, _) = run(coordinator(), &Scripted::new(script())).await;
        let (_, second, _) = run(coordinator(), &Scripted::new(script())).await;

        assert_eq!(first, second);
    }
}
