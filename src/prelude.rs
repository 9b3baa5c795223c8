//! Convenience re-exports for common use.

pub use crate::config::ChatConfig;
pub use crate::coordinator::{StreamCoordinator, TurnOutcome};
pub use crate::error::{ChatError, Result};
pub use crate::extract::{PayloadExtractor, ToolPayload};
pub use crate::gate::{Readiness, ReadinessPolicy, ToolReadinessGate};
pub use crate::metrics::{MetricsAccumulator, MetricsSnapshot};
pub use crate::models::{ModelCatalog, ModelId};
pub use crate::provider::{ConnectionFactory, ModelConnection, OpenRouterFactory};
pub use crate::render::{Artifact, ArtifactKind, ArtifactRenderer, TabularRenderer};
pub use crate::session::{ModelSwitcher, Session, SessionPhase, TurnReport};
pub use crate::tools::{Tool, ToolRegistrar, ToolRegistry, ToolServerSpec};
pub use crate::transcript::{Transcript, TranscriptSink, TranscriptUnit};
pub use crate::types::{StreamEvent, TurnRequest, Usage};
