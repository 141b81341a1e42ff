use datalyst_core::types::Intent;

use crate::context::AnalystContext;

/// The reasoning stages of the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    Router,
    Mapper,
    SqlArchitect,
    Executor,
    Synthesizer,
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageId::Router => "router",
            StageId::Mapper => "mapper",
            StageId::SqlArchitect => "sql_architect",
            StageId::Executor => "executor",
            StageId::Synthesizer => "synthesizer",
        };
        write!(f, "{}", name)
    }
}

/// Where a transition leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Stage(StageId),
    End,
}

/// Predicate over the run context guarding a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCondition {
    Always,
    IntentIs(Intent),
    /// The last execution failed and the retry budget is not exhausted.
    SqlFailedUnderCap { max_retries: u32 },
}

impl TransitionCondition {
    pub fn eval(&self, ctx: &AnalystContext) -> bool {
        match self {
            TransitionCondition::Always => true,
            TransitionCondition::IntentIs(intent) => ctx.intent == Some(*intent),
            TransitionCondition::SqlFailedUnderCap { max_retries } => {
                ctx.sql_error.is_some() && ctx.error_count < *max_retries
            }
        }
    }
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub from: StageId,
    pub condition: TransitionCondition,
    pub to: Target,
}

impl Transition {
    pub fn new(from: StageId, condition: TransitionCondition, to: Target) -> Self {
        Self {
            from,
            condition,
            to,
        }
    }
}

/// The full transition table. Evaluated top to bottom; the first matching
/// row from the current stage wins.
pub fn transition_table(max_retries: u32) -> Vec<Transition> {
    use StageId::*;
    use Target::Stage;
    use TransitionCondition::*;

    vec![
        Transition::new(Router, IntentIs(Intent::Database), Stage(Mapper)),
        Transition::new(Router, IntentIs(Intent::General), Stage(Synthesizer)),
        Transition::new(Mapper, Always, Stage(SqlArchitect)),
        Transition::new(SqlArchitect, Always, Stage(Executor)),
        Transition::new(Executor, SqlFailedUnderCap { max_retries }, Stage(SqlArchitect)),
        Transition::new(Executor, Always, Stage(Synthesizer)),
        Transition::new(Synthesizer, Always, Target::End),
    ]
}

/// Pick the next target for `from` given the current context, or `None`
/// when no row matches (a malformed table).
pub fn next_target(
    table: &[Transition],
    from: StageId,
    ctx: &AnalystContext,
) -> Option<Target> {
    table
        .iter()
        .find(|t| t.from == from && t.condition.eval(ctx))
        .map(|t| t.to)
}
