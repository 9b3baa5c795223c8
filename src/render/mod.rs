//! Chart/table artifacts built from tool payloads.
//!
//! Drawing is left to whatever front end displays the transcript; an
//! [`Artifact`] carries the rows plus the axes a chart should use.

use serde::Serialize;
use serde_json::{Map, Value};
use strum::Display;

use crate::error::ChatError;
use crate::extract::ToolPayload;

/// How a front end should present an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ArtifactKind {
    /// Bar chart of `y_column` over `x_column`, with the rows as a data tab.
    Chart,
    /// Rows only; nothing numeric to plot.
    Table,
}

/// A rendered tool payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub id: String,
    pub title: String,
    pub kind: ArtifactKind,
    pub x_column: Option<String>,
    pub y_column: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl Artifact {
    /// One-line description for plain-text front ends.
    pub fn caption(&self) -> String {
        match (&self.kind, &self.x_column, &self.y_column) {
            (ArtifactKind::Chart, Some(x), Some(y)) => format!(
                "{} [{}] {y} by {x}, {} rows",
                self.title,
                self.id,
                self.rows.len()
            ),
            _ => format!("{} [{}] {} rows", self.title, self.id, self.rows.len()),
        }
    }
}

/// Turns a payload into an artifact. Must not keep state keyed on anything
/// but the `id` it is given.
pub trait ArtifactRenderer: Send + Sync {
    fn render(&self, payload: &ToolPayload, id: &str) -> Result<Artifact, ChatError>;
}

/// Unique artifact id from a session counter and the current time.
pub fn artifact_id(counter: u64) -> String {
    format!("sales_chart_{counter}_{}", chrono::Utc::now().timestamp_millis())
}

/// Default renderer: picks chart axes from well-known sales columns, falling
/// back to the first numeric column.
#[derive(Debug, Clone)]
pub struct TabularRenderer {
    title: String,
}

impl Default for TabularRenderer {
    fn default() -> Self {
        Self {
            title: "Sales Data Visualization".to_string(),
        }
    }
}

impl TabularRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactRenderer for TabularRenderer {
    fn render(&self, payload: &ToolPayload, id: &str) -> Result<Artifact, ChatError> {
        let rows: Vec<Map<String, Value>> = payload.rows().into_iter().cloned().collect();
        if rows.is_empty() {
            return Err(ChatError::Render(format!(
                "{} returned no tabular rows",
                payload.tool_name
            )));
        }

        let columns = column_order(&rows);
        let (x_column, y_column) = choose_axes(&columns, &rows);
        let kind = if x_column.is_some() && y_column.is_some() {
            ArtifactKind::Chart
        } else {
            ArtifactKind::Table
        };

        tracing::debug!(
            id,
            %kind,
            rows = rows.len(),
            x = x_column.as_deref().unwrap_or("-"),
            y = y_column.as_deref().unwrap_or("-"),
            "rendered artifact"
        );

        Ok(Artifact {
            id: id.to_string(),
            title: self.title.clone(),
            kind,
            x_column,
            y_column,
            columns,
            rows,
        })
    }
}

/// Column names in first-seen order across all rows.
fn column_order(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn is_numeric(column: &str, rows: &[Map<String, Value>]) -> bool {
    let mut seen = false;
    for value in rows.iter().filter_map(|row| row.get(column)) {
        match value {
            Value::Number(_) => seen = true,
            Value::Null => {}
            _ => return false,
        }
    }
    seen
}

fn choose_axes(columns: &[String], rows: &[Map<String, Value>]) -> (Option<String>, Option<String>) {
    let has = |name: &str| columns.iter().any(|c| c == name);
    let first_other = |skip: &str| columns.iter().find(|c| c.as_str() != skip).cloned();

    for (x, y) in [
        ("Product", "Sales"),
        ("Period", "TotalSales"),
        ("Region", "TotalSales"),
    ] {
        if has(x) && has(y) {
            return (Some(x.to_string()), Some(y.to_string()));
        }
    }

    for y in ["Sales", "TotalSales"] {
        if has(y) && columns.len() >= 2 {
            return (first_other(y), Some(y.to_string()));
        }
    }

    match columns.iter().find(|c| is_numeric(c, rows)) {
        Some(y) => (first_other(y.as_str()), Some(y.clone())),
        None => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> ToolPayload {
        ToolPayload {
            tool_name: "get_sales_data".into(),
            value,
        }
    }

    fn axes(value: Value) -> (Option<String>, Option<String>, ArtifactKind) {
        let artifact = TabularRenderer::new().render(&payload(value), "id").unwrap();
        (artifact.x_column, artifact.y_column, artifact.kind)
    }

    #[test]
    fn product_sales_rows_chart_product_against_sales() {
        let (x, y, kind) = axes(json!([
            {"Date": "2024-01-01", "Product": "Product A", "Sales": 4, "Region": "North"}
        ]));
        assert_eq!(x.as_deref(), Some("Product"));
        assert_eq!(y.as_deref(), Some("Sales"));
        assert_eq!(kind, ArtifactKind::Chart);
    }

    #[test]
    fn grouped_rows_use_period_or_region() {
        let (x, y, _) = axes(json!([{"Period": "2024-05", "TotalSales": 310}]));
        assert_eq!((x.as_deref(), y.as_deref()), (Some("Period"), Some("TotalSales")));

        let (x, y, _) = axes(json!([{"Region": "East", "TotalSales": 88}]));
        assert_eq!((x.as_deref(), y.as_deref()), (Some("Region"), Some("TotalSales")));
    }

    #[test]
    fn sales_column_pairs_with_first_other_column() {
        let (x, y, _) = axes(json!([{"Week": "2024-W3", "Sales": 9}]));
        assert_eq!((x.as_deref(), y.as_deref()), (Some("Week"), Some("Sales")));
    }

    #[test]
    fn falls_back_to_first_numeric_column() {
        let (x, y, _) = axes(json!([{"Store": "Main", "Units": 3}, {"Store": "Annex", "Units": null}]));
        assert_eq!((x.as_deref(), y.as_deref()), (Some("Store"), Some("Units")));
    }

    #[test]
    fn no_numeric_column_becomes_table() {
        let (x, y, kind) = axes(json!([{"Name": "a", "Note": "b"}]));
        assert_eq!((x, y), (None, None));
        assert_eq!(kind, ArtifactKind::Table);
    }

    #[test]
    fn empty_payload_is_a_render_error() {
        let err = TabularRenderer::new().render(&payload(json!([])), "id").unwrap_err();
        assert!(matches!(err, ChatError::Render(_)));
    }

    #[test]
    fn artifact_ids_embed_counter() {
        assert!(artifact_id(3).starts_with("sales_chart_3_"));
    }
}
