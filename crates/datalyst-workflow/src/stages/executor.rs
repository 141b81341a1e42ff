use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use datalyst_core::error::Result;
use datalyst_core::traits::TabularStore;
use datalyst_core::types::QueryOutcome;

use crate::context::{AnalystContext, ContextUpdate};
use crate::stages::Stage;
use crate::transition::StageId;

/// Runs the generated query against the tabular store.
///
/// SQL failures are data for the self-correction loop, not errors: the
/// outcome flows into the context and the transition table decides
/// whether to bounce back to the architect. Only store-level failures
/// (missing database, I/O) escape as run errors.
pub struct SqlExecutor {
    store: Arc<dyn TabularStore>,
}

impl SqlExecutor {
    pub fn new(store: Arc<dyn TabularStore>) -> Self {
        Self { store }
    }
}

impl Stage for SqlExecutor {
    fn id(&self) -> StageId {
        StageId::Executor
    }

    fn run(&self, ctx: &AnalystContext) -> BoxFuture<'_, Result<ContextUpdate>> {
        let sql = ctx.generated_sql.clone();
        Box::pin(async move {
            let outcome = self.store.execute(&sql).await?;

            match &outcome {
                QueryOutcome::Rows(rows) => {
                    debug!(rows = rows.len(), "SQL executed");
                }
                QueryOutcome::SqlError(error) => {
                    warn!(error = %error, "SQL execution failed");
                }
            }

            Ok(ContextUpdate {
                sql_outcome: Some(outcome),
                ..Default::default()
            })
        })
    }
}
