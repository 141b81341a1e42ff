use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{OutputShape, QueryOutcome};

/// Reasoning oracle — the opaque text/structured-completion service used
/// for every natural-language reasoning step.
pub trait Oracle: Send + Sync + 'static {
    /// Free-text completion.
    fn complete(&self, prompt: &str) -> BoxFuture<'_, Result<String>>;

    /// Completion constrained to a JSON object conforming to `shape`.
    ///
    /// Implementations must validate the payload against the requested
    /// shape and return `AnalystError::OracleParse` on non-conforming
    /// output.
    fn complete_structured(
        &self,
        prompt: &str,
        shape: &OutputShape,
    ) -> BoxFuture<'_, Result<serde_json::Value>>;
}

/// Tabular store holding the single ingested dataset.
///
/// Implementations must tolerate concurrent calls; each call opens an
/// independent connection.
pub trait TabularStore: Send + Sync + 'static {
    /// Textual enumeration of column name/type pairs, regenerated on
    /// demand.
    fn schema(&self) -> BoxFuture<'_, Result<String>>;

    /// Execute an ad-hoc query. All rows or none: a failed statement
    /// yields `QueryOutcome::SqlError` with no partial results.
    fn execute(&self, sql: &str) -> BoxFuture<'_, Result<QueryOutcome>>;
}

/// Nearest-neighbor lookup over indexed "column: value" strings.
pub trait EntityIndex: Send + Sync + 'static {
    /// The `k` most similar indexed strings, nearest first. Returns an
    /// empty vec when no index has been built — callers degrade to
    /// pass-through, never fail.
    fn search(&self, text: &str, k: usize) -> BoxFuture<'_, Result<Vec<String>>>;
}
