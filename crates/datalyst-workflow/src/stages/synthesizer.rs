use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use datalyst_core::error::Result;
use datalyst_core::traits::Oracle;
use datalyst_core::types::{render_rows, Intent};

use crate::context::{AnalystContext, ContextUpdate};
use crate::stages::Stage;
use crate::transition::StageId;

/// Produces the final natural-language answer. Always the terminal stage.
///
/// General questions get open-ended chat. Database questions get an
/// answer grounded strictly in the executed rows. A run that exhausted
/// its retry budget is reported as a failed query, distinct from a query
/// that legitimately returned no rows.
pub struct Synthesizer {
    oracle: Arc<dyn Oracle>,
    max_retries: u32,
}

impl Synthesizer {
    pub fn new(oracle: Arc<dyn Oracle>, max_retries: u32) -> Self {
        Self {
            oracle,
            max_retries,
        }
    }

    fn general_prompt(question: &str) -> String {
        format!("Answer the user's question conversationally: {}", question)
    }

    fn grounded_prompt(question: &str, data: &str) -> String {
        format!(
            "Answer the user's question based strictly on the SQL Data \
             Result.\n\n\
             Question: {}\n\
             SQL Data Result: {}\n\n\
             If the data result is empty, say no data was found.\n\
             Format the answer professionally for a non-technical reader.",
            question, data
        )
    }

    fn failed_query_prompt(question: &str, error: &str, attempts: u32) -> String {
        format!(
            "The SQL query for the user's question could not be executed \
             after {} attempts.\n\n\
             Question: {}\n\
             Last error: {}\n\n\
             Tell the user that no valid result could be obtained because \
             the query failed. Do not invent data. Keep the tone \
             professional and suggest rephrasing the question.",
            attempts, question, error
        )
    }

    fn build_prompt(&self, ctx: &AnalystContext) -> String {
        if ctx.intent != Some(Intent::Database) {
            return Self::general_prompt(&ctx.question);
        }

        match (&ctx.sql_result, &ctx.sql_error) {
            (Some(rows), _) => Self::grounded_prompt(&ctx.mapped_question, &render_rows(rows)),
            (None, Some(error)) => {
                Self::failed_query_prompt(&ctx.mapped_question, error, self.max_retries)
            }
            // Database intent but nothing executed; treat as empty data
            (None, None) => Self::grounded_prompt(&ctx.mapped_question, "[]"),
        }
    }
}

impl Stage for Synthesizer {
    fn id(&self) -> StageId {
        StageId::Synthesizer
    }

    fn run(&self, ctx: &AnalystContext) -> BoxFuture<'_, Result<ContextUpdate>> {
        let prompt = self.build_prompt(ctx);
        Box::pin(async move {
            let answer = self.oracle.complete(&prompt).await?;
            debug!(chars = answer.len(), "Answer synthesized");

            Ok(ContextUpdate {
                final_answer: Some(answer.trim().to_string()),
                ..Default::default()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalyst_core::types::Row;
    use datalyst_test_utils::ScriptedOracle;

    fn synthesizer() -> Synthesizer {
        Synthesizer::new(Arc::new(ScriptedOracle::new()), 3)
    }

    #[test]
    fn test_general_intent_uses_raw_question() {
        let mut ctx = AnalystContext::new("Hello, how are you?");
        ctx.intent = Some(Intent::General);
        // mapped_question never set on the general path
        let prompt = synthesizer().build_prompt(&ctx);
        assert!(prompt.contains("Hello, how are you?"));
        assert!(!prompt.contains("SQL Data Result"));
    }

    #[test]
    fn test_database_intent_grounds_in_rows() {
        let mut ctx = AnalystContext::new("What is the total revenue?");
        ctx.intent = Some(Intent::Database);
        ctx.mapped_question = "What is the total Revenue?".into();
        let mut row = Row::new();
        row.insert("total".into(), serde_json::json!(1000));
        ctx.sql_result = Some(vec![row]);

        let prompt = synthesizer().build_prompt(&ctx);
        assert!(prompt.contains("based strictly on the SQL Data Result"));
        assert!(prompt.contains("1000"));
    }

    #[test]
    fn test_exhausted_retries_reported_as_failure() {
        let mut ctx = AnalystContext::new("q");
        ctx.intent = Some(Intent::Database);
        ctx.mapped_question = "q".into();
        ctx.sql_error = Some("no such column: revenu".into());
        ctx.error_count = 3;

        let prompt = synthesizer().build_prompt(&ctx);
        assert!(prompt.contains("could not be executed after 3 attempts"));
        assert!(prompt.contains("no such column: revenu"));
        assert!(prompt.contains("Do not invent data"));
        // Failure framing, not the empty-rows framing
        assert!(!prompt.contains("say no data was found"));
    }

    #[test]
    fn test_empty_rows_use_no_data_framing() {
        let mut ctx = AnalystContext::new("q");
        ctx.intent = Some(Intent::Database);
        ctx.mapped_question = "q".into();
        ctx.sql_result = Some(vec![]);

        let prompt = synthesizer().build_prompt(&ctx);
        assert!(prompt.contains("say no data was found"));
    }
}
