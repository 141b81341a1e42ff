use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use datalyst_core::error::{AnalystError, Result};
use datalyst_core::traits::Oracle;
use datalyst_core::types::{Intent, OutputShape};

use crate::context::{AnalystContext, ContextUpdate};
use crate::stages::Stage;
use crate::transition::StageId;

/// Classifies the question as dataset analysis or general chat.
///
/// The oracle call is schema-constrained to one of the two labels so the
/// verdict never needs free-text parsing. Also resets the retry budget —
/// a fresh run starts clean regardless of context reuse mistakes
/// upstream.
pub struct Router {
    oracle: Arc<dyn Oracle>,
}

#[derive(Debug, Deserialize)]
struct RouterVerdict {
    intent: Intent,
}

impl Router {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    fn shape() -> OutputShape {
        OutputShape::new(
            "router_verdict",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "intent": {
                        "type": "string",
                        "enum": ["database", "general"],
                        "description": "'database' if the question requires data analysis, else 'general'"
                    }
                },
                "required": ["intent"],
                "additionalProperties": false
            }),
        )
    }

    fn prompt(question: &str) -> String {
        format!(
            "Is this question asking about analysis of the ingested dataset, \
             or is it general chat? Question: {}",
            question
        )
    }
}

impl Stage for Router {
    fn id(&self) -> StageId {
        StageId::Router
    }

    fn run(&self, ctx: &AnalystContext) -> BoxFuture<'_, Result<ContextUpdate>> {
        let prompt = Self::prompt(&ctx.question);
        Box::pin(async move {
            let value = self
                .oracle
                .complete_structured(&prompt, &Self::shape())
                .await?;

            // Non-conforming label is a run-level failure, never retried
            let verdict: RouterVerdict = serde_json::from_value(value)
                .map_err(|e| AnalystError::OracleParse(format!("router verdict: {}", e)))?;

            debug!(intent = %verdict.intent, "Question routed");

            Ok(ContextUpdate {
                intent: Some(verdict.intent),
                reset_error_count: true,
                ..Default::default()
            })
        })
    }
}
