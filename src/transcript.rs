//! Append-only conversation transcript.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::metrics::MetricsSnapshot;
use crate::render::Artifact;
use crate::types::StreamEvent;

/// One visible unit of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum TranscriptUnit {
    UserMessage { text: String },
    /// An upstream stream event, exactly as it arrived.
    Event { event: StreamEvent },
    Artifact { artifact: Artifact },
    Metrics { metrics: MetricsSnapshot },
    Error { message: String },
}

impl From<StreamEvent> for TranscriptUnit {
    fn from(event: StreamEvent) -> Self {
        Self::Event { event }
    }
}

/// Anything that accepts transcript units in order.
pub trait TranscriptSink: Send {
    fn append(&mut self, unit: TranscriptUnit);
}

/// Callback invoked for every appended unit (for live display).
pub type TranscriptObserver = Arc<dyn Fn(&TranscriptUnit) + Send + Sync>;

/// In-memory transcript with an optional live observer.
#[derive(Default, Clone)]
pub struct Transcript {
    units: Vec<TranscriptUnit>,
    observer: Option<TranscriptObserver>,
}

impl fmt::Debug for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcript")
            .field("units", &self.units)
            .field("observer", &self.observer.as_ref().map(|_| ".."))
            .finish()
    }
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: TranscriptObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn units(&self) -> &[TranscriptUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Concatenated assistant text.
    pub fn assistant_text(&self) -> String {
        self.units
            .iter()
            .filter_map(|unit| match unit {
                TranscriptUnit::Event {
                    event: StreamEvent::TextDelta { text },
                } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.units.iter().filter_map(|unit| match unit {
            TranscriptUnit::Artifact { artifact } => Some(artifact),
            _ => None,
        })
    }
}

impl TranscriptSink for Transcript {
    fn append(&mut self, unit: TranscriptUnit) {
        if let Some(observer) = &self.observer {
            observer(&unit);
        }
        self.units.push(unit);
    }
}

impl TranscriptSink for Vec<TranscriptUnit> {
    fn append(&mut self, unit: TranscriptUnit) {
        self.push(unit);
    }
}
