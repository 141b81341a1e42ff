use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use datalyst_core::error::Result;
use datalyst_core::traits::{EntityIndex, Oracle};

use crate::context::{AnalystContext, ContextUpdate};
use crate::stages::Stage;
use crate::transition::StageId;

/// Entity resolution: rewrites fuzzy user terms to exact values known to
/// exist in the dataset.
///
/// Pulls the top-k "column: value" candidates from the entity index and
/// asks the oracle to substitute them only where applicable. When the
/// index yields no candidates there is nothing to substitute, so the
/// stage short-circuits to pass-through without an oracle call — the
/// mapped question is the original question, verbatim.
pub struct Mapper {
    oracle: Arc<dyn Oracle>,
    index: Arc<dyn EntityIndex>,
    candidates: usize,
}

impl Mapper {
    pub fn new(oracle: Arc<dyn Oracle>, index: Arc<dyn EntityIndex>, candidates: usize) -> Self {
        Self {
            oracle,
            index,
            candidates,
        }
    }

    fn prompt(question: &str, entities: &str) -> String {
        format!(
            "Rewrite the user's question to use the exact database values \
             provided below, if applicable.\n\
             If no exact values apply, return the original question.\n\n\
             Original Question: {}\n\
             Exact Database Values Available:\n{}\n\n\
             Rewritten Question:",
            question, entities
        )
    }
}

impl Stage for Mapper {
    fn id(&self) -> StageId {
        StageId::Mapper
    }

    fn run(&self, ctx: &AnalystContext) -> BoxFuture<'_, Result<ContextUpdate>> {
        let question = ctx.question.clone();
        Box::pin(async move {
            let candidates = self.index.search(&question, self.candidates).await?;

            if candidates.is_empty() {
                debug!("No entity candidates, mapper passes the question through");
                return Ok(ContextUpdate {
                    mapped_question: Some(question),
                    potential_entities: Some(String::new()),
                    ..Default::default()
                });
            }

            let entities = candidates.join("\n");
            let mapped = self
                .oracle
                .complete(&Self::prompt(&question, &entities))
                .await?;

            debug!(candidates = candidates.len(), "Entities resolved");

            Ok(ContextUpdate {
                mapped_question: Some(mapped.trim().to_string()),
                potential_entities: Some(entities),
                ..Default::default()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_candidates() {
        let prompt = Mapper::prompt(
            "revenue for acmi?",
            "Company_Name: Acme Corp\nCompany_Name: Globex",
        );
        assert!(prompt.contains("Original Question: revenue for acmi?"));
        assert!(prompt.contains("Company_Name: Acme Corp"));
        assert!(prompt.contains("return the original question"));
    }
}
