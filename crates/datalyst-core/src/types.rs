use serde::{Deserialize, Serialize};

/// Classification of a user question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// The question needs a lookup against the ingested dataset.
    Database,
    /// General conversation, answered without touching the store.
    General,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::Database => write!(f, "database"),
            Intent::General => write!(f, "general"),
        }
    }
}

/// A single result row: column name to scalar value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Outcome of executing SQL against the tabular store.
///
/// SQL syntax/semantic failures are data (they feed the self-correction
/// loop), not `Err` — only store-level failures (missing database file,
/// I/O) surface as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Vec<Row>),
    SqlError(String),
}

/// Result shape requested from the oracle for a structured completion.
///
/// The oracle must return a JSON object conforming to `schema`; the caller
/// validates the payload on receipt and treats non-conforming output as an
/// `OracleParse` error.
#[derive(Debug, Clone, Serialize)]
pub struct OutputShape {
    /// Name of the shape (sent to the provider as the schema name).
    pub name: String,
    /// JSON Schema the response object must conform to.
    pub schema: serde_json::Value,
}

impl OutputShape {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Final result of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Natural-language answer produced by the terminal stage.
    pub final_answer: String,
    /// The last generated query, kept for traceability.
    pub generated_sql: String,
}

/// Report returned after ingesting a dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Sanitized column names of the ingested table.
    pub columns: Vec<String>,
    /// Number of data rows loaded.
    pub row_count: usize,
    /// "column: value" strings for the entity index, built from distinct
    /// values of text-typed columns.
    #[serde(skip)]
    pub entity_strings: Vec<String>,
}

/// Render rows as a compact textual block for the synthesizer prompt.
pub fn render_rows(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "[]".to_string();
    }
    let values: Vec<serde_json::Value> = rows
        .iter()
        .map(|r| serde_json::Value::Object(r.clone()))
        .collect();
    serde_json::to_string(&values).unwrap_or_else(|_| "[]".to_string())
}
