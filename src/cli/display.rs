//! Terminal rendering of transcript units.

use std::io::Write;

use serde_json::Value;

use crate::error::{ChatError, RecoverySuggestion};
use crate::render::{Artifact, ArtifactKind};
use crate::transcript::TranscriptUnit;
use crate::types::StreamEvent;

const MAX_ROWS: usize = 20;
const BAR_WIDTH: f64 = 40.0;
const RESULT_PREVIEW: usize = 200;

/// Print one unit as it is appended. Assistant text goes to stdout, the rest
/// to stderr.
pub fn print_unit(unit: &TranscriptUnit) {
    match unit {
        TranscriptUnit::Event {
            event: StreamEvent::TextDelta { text },
        } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        TranscriptUnit::UserMessage { .. } => {}
        other => {
            if let Some(line) = format_unit(other) {
                eprintln!("{line}");
            }
        }
    }
}

/// Non-text rendering of a unit, or `None` for units shown elsewhere.
pub fn format_unit(unit: &TranscriptUnit) -> Option<String> {
    match unit {
        TranscriptUnit::Event { event } => match event {
            StreamEvent::ToolRequest { name, id, .. } => Some(format!("\n⚡ {name} ({id})")),
            StreamEvent::ToolResult { value, .. } => {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some(format!("  ✅ {}", truncate(&text, RESULT_PREVIEW)))
            }
            _ => None,
        },
        TranscriptUnit::Artifact { artifact } => Some(format_artifact(artifact)),
        TranscriptUnit::Metrics { metrics } => Some(format!("\n── {metrics}")),
        TranscriptUnit::Error { message } => Some(format!("\n❌ {message}")),
        TranscriptUnit::UserMessage { .. } => None,
    }
}

/// Error line for the terminal, with a hint on what to try next.
pub fn format_error(error: &ChatError) -> String {
    let hint = match error.recovery_suggestion() {
        RecoverySuggestion::RetryWithBackoff => "try again in a moment",
        RecoverySuggestion::CheckCredentials => "check OPENROUTER_API_KEY",
        RecoverySuggestion::CheckConfiguration => "check the config file and model id",
        RecoverySuggestion::IncreaseTimeout => "raise stream_timeout_secs",
        RecoverySuggestion::CheckToolServer => "check the tool server command",
        RecoverySuggestion::ReportIssue => return format!("Error: {error}"),
    };
    format!("Error: {error} ({hint})")
}

/// Text chart (horizontal bars) or table for an artifact.
pub fn format_artifact(artifact: &Artifact) -> String {
    let mut out = format!("\n📊 {}\n", artifact.caption());
    match (artifact.kind, &artifact.x_column, &artifact.y_column) {
        (ArtifactKind::Chart, Some(x), Some(y)) => {
            let points: Vec<(String, f64)> = artifact
                .rows
                .iter()
                .take(MAX_ROWS)
                .map(|row| {
                    let label = row.get(x).map(cell).unwrap_or_default();
                    let value = row.get(y).and_then(Value::as_f64).unwrap_or(0.0);
                    (label, value)
                })
                .collect();
            let max = points.iter().map(|(_, v)| v.abs()).fold(0.0, f64::max);
            let label_width = points.iter().map(|(l, _)| l.chars().count()).max().unwrap_or(0);
            for (label, value) in &points {
                let len = if max > 0.0 {
                    (value.abs() / max * BAR_WIDTH).round() as usize
                } else {
                    0
                };
                out.push_str(&format!(
                    "{label:<label_width$} │{} {value}\n",
                    "█".repeat(len)
                ));
            }
        }
        _ => {
            out.push_str(&artifact.columns.join(" | "));
            out.push('\n');
            for row in artifact.rows.iter().take(MAX_ROWS) {
                let cells: Vec<String> = artifact
                    .columns
                    .iter()
                    .map(|c| row.get(c).map(cell).unwrap_or_default())
                    .collect();
                out.push_str(&cells.join(" | "));
                out.push('\n');
            }
        }
    }
    if artifact.rows.len() > MAX_ROWS {
        out.push_str(&format!("… {} more rows\n", artifact.rows.len() - MAX_ROWS));
    }
    out
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
