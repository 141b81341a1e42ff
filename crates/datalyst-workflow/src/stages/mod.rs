//! The five reasoning stages. Each is a pure function of the current
//! context producing a partial update; all control flow lives in the
//! transition table, not in the stages.

pub mod architect;
pub mod executor;
pub mod mapper;
pub mod router;
pub mod synthesizer;

use futures::future::BoxFuture;

use datalyst_core::error::Result;

use crate::context::{AnalystContext, ContextUpdate};
use crate::transition::StageId;

pub use architect::SqlArchitect;
pub use executor::SqlExecutor;
pub use mapper::Mapper;
pub use router::Router;
pub use synthesizer::Synthesizer;

/// A single reasoning stage.
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Run the stage against the current context. Errors returned here
    /// are run-level failures; designed retries (SQL errors) travel as
    /// data inside the update instead.
    fn run(&self, ctx: &AnalystContext) -> BoxFuture<'_, Result<ContextUpdate>>;
}
