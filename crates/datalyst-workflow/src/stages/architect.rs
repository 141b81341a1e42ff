use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use datalyst_core::error::{AnalystError, Result};
use datalyst_core::traits::{Oracle, TabularStore};
use datalyst_core::types::OutputShape;

use crate::context::{AnalystContext, ContextUpdate};
use crate::stages::Stage;
use crate::transition::StageId;

/// Generates the SQL query from the mapped question and the live schema.
///
/// On a retry pass the previous failing query and its error text are
/// prepended to the prompt — that feedback is the self-correction
/// signal. The schema description is regenerated from the store on every
/// invocation, never cached in the context.
pub struct SqlArchitect {
    oracle: Arc<dyn Oracle>,
    store: Arc<dyn TabularStore>,
    row_limit: usize,
}

#[derive(Debug, Deserialize)]
struct SqlDraft {
    sql_query: String,
}

impl SqlArchitect {
    pub fn new(oracle: Arc<dyn Oracle>, store: Arc<dyn TabularStore>, row_limit: usize) -> Self {
        Self {
            oracle,
            store,
            row_limit,
        }
    }

    fn shape() -> OutputShape {
        OutputShape::new(
            "sql_draft",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "sql_query": {
                        "type": "string",
                        "description": "A single SQLite query answering the question."
                    }
                },
                "required": ["sql_query"],
                "additionalProperties": false
            }),
        )
    }

    fn prompt(&self, schema: &str, question: &str, error_context: &str) -> String {
        format!(
            "You are a SQLite SQL expert. Write a SQL query to answer the \
             user's question.\n\n\
             SCHEMA:\n{}\n\n\
             {}\
             QUESTION: {}\n\n\
             RULES:\n\
             1. Output ONLY valid SQLite SQL.\n\
             2. Ensure column names match the schema exactly.\n\
             3. Use LIMIT {} to avoid massive outputs unless aggregating.",
            schema, error_context, question, self.row_limit
        )
    }

    fn error_context(ctx: &AnalystContext) -> String {
        match &ctx.sql_error {
            Some(error) => format!(
                "PREVIOUS ERROR: {}\nPREVIOUS SQL: {}\nFix the SQL!\n\n",
                error, ctx.generated_sql
            ),
            None => String::new(),
        }
    }
}

impl Stage for SqlArchitect {
    fn id(&self) -> StageId {
        StageId::SqlArchitect
    }

    fn run(&self, ctx: &AnalystContext) -> BoxFuture<'_, Result<ContextUpdate>> {
        let question = ctx.mapped_question.clone();
        let error_context = Self::error_context(ctx);
        Box::pin(async move {
            let schema = self.store.schema().await?;
            let prompt = self.prompt(&schema, &question, &error_context);

            let value = self
                .oracle
                .complete_structured(&prompt, &Self::shape())
                .await?;
            let draft: SqlDraft = serde_json::from_value(value)
                .map_err(|e| AnalystError::OracleParse(format!("sql draft: {}", e)))?;

            debug!(sql = %draft.sql_query, "SQL generated");

            Ok(ContextUpdate {
                generated_sql: Some(draft.sql_query.trim().to_string()),
                ..Default::default()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_empty_on_first_pass() {
        let ctx = AnalystContext::new("q");
        assert_eq!(SqlArchitect::error_context(&ctx), "");
    }

    #[test]
    fn test_error_context_carries_failure_verbatim() {
        let mut ctx = AnalystContext::new("q");
        ctx.generated_sql = "SELECT revenu FROM dataset".into();
        ctx.sql_error = Some("no such column: revenu".into());

        let block = SqlArchitect::error_context(&ctx);
        assert!(block.contains("PREVIOUS ERROR: no such column: revenu"));
        assert!(block.contains("PREVIOUS SQL: SELECT revenu FROM dataset"));
    }

    #[test]
    fn test_draft_parsing() {
        let draft: SqlDraft = serde_json::from_value(
            serde_json::json!({"sql_query": "SELECT SUM(Revenue) FROM dataset"}),
        )
        .unwrap();
        assert!(draft.sql_query.starts_with("SELECT"));
    }

    #[test]
    fn test_shape_requires_sql_query() {
        let shape = SqlArchitect::shape();
        assert_eq!(shape.schema["required"][0], "sql_query");
    }
}
