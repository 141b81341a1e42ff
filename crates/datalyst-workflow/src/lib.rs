//! Workflow engine — the multi-step reasoning pipeline that turns a
//! plain-language question into a validated answer.
//!
//! A run walks an explicit finite-state machine over a shared mutable
//! [`AnalystContext`]: intent routing, entity resolution, SQL generation,
//! execution, and answer synthesis, with a bounded self-correction loop
//! feeding execution errors back into generation.
//!
//! Each stage is a pure function of the current context producing a
//! [`ContextUpdate`]; the engine merges updates and evaluates the
//! transition table to pick the next stage.

pub mod context;
pub mod engine;
pub mod stages;
pub mod transition;

pub use context::{AnalystContext, ContextUpdate};
pub use engine::AnalystEngine;
pub use transition::{StageId, Target, Transition, TransitionCondition};
