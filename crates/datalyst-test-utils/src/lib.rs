//! Scripted fakes for the three workflow collaborators. Replies are
//! consumed front to back; running out is a loud failure so tests notice
//! missing expectations.

use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;

use datalyst_core::error::{AnalystError, Result};
use datalyst_core::traits::{EntityIndex, Oracle, TabularStore};
use datalyst_core::types::{OutputShape, QueryOutcome, Row};

/// One recorded oracle invocation.
#[derive(Debug, Clone)]
pub struct OracleCall {
    pub prompt: String,
    /// Shape name for structured calls, `None` for free text.
    pub shape: Option<String>,
}

enum ScriptedReply {
    Text(String),
    Json(serde_json::Value),
    ParseError(String),
    RequestError(String),
}

/// Oracle returning a scripted sequence of replies.
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<OracleCall>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Text(text.into()));
    }

    pub fn push_json(&self, value: serde_json::Value) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Json(value));
    }

    pub fn push_parse_error(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::ParseError(message.into()));
    }

    pub fn push_request_error(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::RequestError(message.into()));
    }

    /// All invocations, in order.
    pub fn calls(&self) -> Vec<OracleCall> {
        self.calls.lock().unwrap().clone()
    }

    fn pop(&self, call: OracleCall) -> Result<ScriptedReply> {
        self.calls.lock().unwrap().push(call);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AnalystError::OracleRequest("scripted oracle exhausted".into()))
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, prompt: &str) -> BoxFuture<'_, Result<String>> {
        let reply = self.pop(OracleCall {
            prompt: prompt.to_string(),
            shape: None,
        });
        Box::pin(async move {
            match reply? {
                ScriptedReply::Text(text) => Ok(text),
                ScriptedReply::Json(value) => Ok(value.to_string()),
                ScriptedReply::ParseError(msg) => Err(AnalystError::OracleParse(msg)),
                ScriptedReply::RequestError(msg) => Err(AnalystError::OracleRequest(msg)),
            }
        })
    }

    fn complete_structured(
        &self,
        prompt: &str,
        shape: &OutputShape,
    ) -> BoxFuture<'_, Result<serde_json::Value>> {
        let reply = self.pop(OracleCall {
            prompt: prompt.to_string(),
            shape: Some(shape.name.clone()),
        });
        Box::pin(async move {
            match reply? {
                ScriptedReply::Json(value) => Ok(value),
                ScriptedReply::Text(text) => serde_json::from_str(&text)
                    .map_err(|e| AnalystError::OracleParse(e.to_string())),
                ScriptedReply::ParseError(msg) => Err(AnalystError::OracleParse(msg)),
                ScriptedReply::RequestError(msg) => Err(AnalystError::OracleRequest(msg)),
            }
        })
    }
}

/// Tabular store with scripted query outcomes and a fixed schema text.
pub struct ScriptedStore {
    schema: Mutex<String>,
    outcomes: Mutex<VecDeque<QueryOutcome>>,
    default_outcome: Mutex<Option<QueryOutcome>>,
    executed: Mutex<Vec<String>>,
}

impl Default for ScriptedStore {
    fn default() -> Self {
        Self {
            schema: Mutex::new(
                "Table 'dataset' columns:\n- Company_Name (TEXT)\n- Revenue (INTEGER)\n"
                    .to_string(),
            ),
            outcomes: Mutex::new(VecDeque::new()),
            default_outcome: Mutex::new(None),
            executed: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_schema(&self, schema: impl Into<String>) {
        *self.schema.lock().unwrap() = schema.into();
    }

    pub fn push_outcome(&self, outcome: QueryOutcome) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Outcome used once the scripted queue is drained. Lets a test model
    /// a store that always fails.
    pub fn set_default_outcome(&self, outcome: QueryOutcome) {
        *self.default_outcome.lock().unwrap() = Some(outcome);
    }

    /// Every SQL string executed, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl TabularStore for ScriptedStore {
    fn schema(&self) -> BoxFuture<'_, Result<String>> {
        let schema = self.schema.lock().unwrap().clone();
        Box::pin(async move { Ok(schema) })
    }

    fn execute(&self, sql: &str) -> BoxFuture<'_, Result<QueryOutcome>> {
        self.executed.lock().unwrap().push(sql.to_string());
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.default_outcome.lock().unwrap().clone())
            .unwrap_or(QueryOutcome::Rows(vec![]));
        Box::pin(async move { Ok(outcome) })
    }
}

/// Entity index returning a fixed candidate list.
#[derive(Default)]
pub struct ScriptedIndex {
    candidates: Vec<String>,
    searches: Mutex<Vec<(String, usize)>>,
}

impl ScriptedIndex {
    pub fn new(candidates: Vec<String>) -> Self {
        Self {
            candidates,
            searches: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Every (query, k) pair searched, in order.
    pub fn searches(&self) -> Vec<(String, usize)> {
        self.searches.lock().unwrap().clone()
    }
}

impl EntityIndex for ScriptedIndex {
    fn search(&self, text: &str, k: usize) -> BoxFuture<'_, Result<Vec<String>>> {
        self.searches.lock().unwrap().push((text.to_string(), k));
        let results: Vec<String> = self.candidates.iter().take(k).cloned().collect();
        Box::pin(async move { Ok(results) })
    }
}

/// Build a result row from (column, value) pairs.
pub fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    let mut row = Row::new();
    for (key, value) in pairs {
        row.insert((*key).to_string(), value.clone());
    }
    row
}
