use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use datalyst_core::config::WorkflowConfig;
use datalyst_core::error::{AnalystError, Result};
use datalyst_core::traits::{EntityIndex, Oracle, TabularStore};
use datalyst_core::types::RunOutcome;

use crate::context::AnalystContext;
use crate::stages::{Mapper, Router, SqlArchitect, SqlExecutor, Stage, Synthesizer};
use crate::transition::{next_target, transition_table, StageId, Target, Transition};

/// The workflow engine: a generic driver loop over the stage map and the
/// transition table.
///
/// Constructed once per process with injected collaborators; `run` takes
/// `&self`, so concurrent runs proceed independently, each owning its own
/// context.
pub struct AnalystEngine {
    stages: HashMap<StageId, Box<dyn Stage>>,
    transitions: Vec<Transition>,
    max_steps: usize,
}

impl AnalystEngine {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        store: Arc<dyn TabularStore>,
        index: Arc<dyn EntityIndex>,
        config: WorkflowConfig,
    ) -> Self {
        let mut stages: HashMap<StageId, Box<dyn Stage>> = HashMap::new();
        stages.insert(StageId::Router, Box::new(Router::new(oracle.clone())));
        stages.insert(
            StageId::Mapper,
            Box::new(Mapper::new(
                oracle.clone(),
                index,
                config.entity_candidates,
            )),
        );
        stages.insert(
            StageId::SqlArchitect,
            Box::new(SqlArchitect::new(
                oracle.clone(),
                store.clone(),
                config.row_limit,
            )),
        );
        stages.insert(StageId::Executor, Box::new(SqlExecutor::new(store)));
        stages.insert(
            StageId::Synthesizer,
            Box::new(Synthesizer::new(oracle, config.max_sql_retries)),
        );

        // The longest path visits every stage once plus one
        // architect/executor pair per retry; anything beyond that means a
        // broken table.
        let max_steps = 5 + 2 * config.max_sql_retries as usize;

        Self {
            stages,
            transitions: transition_table(config.max_sql_retries),
            max_steps,
        }
    }

    /// Execute one full run: question in, answer plus generated SQL out.
    pub async fn run(&self, question: &str) -> Result<RunOutcome> {
        let start = Instant::now();
        let mut ctx = AnalystContext::new(question);
        let mut current = StageId::Router;
        let mut steps = 0usize;

        info!(question = %ctx.question, "Workflow run started");

        loop {
            steps += 1;
            if steps > self.max_steps {
                warn!(steps, "Step guard tripped, terminating run");
                return Err(AnalystError::UnknownStage(format!(
                    "workflow exceeded {} steps at stage '{}'",
                    self.max_steps, current
                )));
            }

            let stage = self
                .stages
                .get(&current)
                .ok_or_else(|| AnalystError::UnknownStage(current.to_string()))?;

            debug!(stage = %current, "Executing workflow stage");
            let update = stage.run(&ctx).await?;
            ctx.apply(update);

            match next_target(&self.transitions, current, &ctx) {
                Some(Target::Stage(next)) => {
                    debug!(from = %current, to = %next, "Transition");
                    current = next;
                }
                Some(Target::End) => break,
                None => {
                    return Err(AnalystError::UnknownStage(format!(
                        "no transition matched from stage '{}'",
                        current
                    )));
                }
            }
        }

        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            sql_retries = ctx.error_count,
            "Workflow run complete"
        );

        Ok(RunOutcome {
            final_answer: ctx.final_answer,
            generated_sql: ctx.generated_sql,
        })
    }
}
