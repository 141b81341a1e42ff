use std::sync::Arc;

use tokio::sync::RwLock;

use datalyst_index::SqliteEntityIndex;
use datalyst_store::DatasetStore;
use datalyst_workflow::AnalystEngine;

/// Shared application state for axum handlers.
pub struct AppState {
    pub engine: Arc<AnalystEngine>,
    pub store: Arc<DatasetStore>,
    /// Present only when an embedding endpoint is configured.
    pub index: Option<Arc<SqliteEntityIndex>>,
    /// Ingestion rebuilds the dataset and the index, so it is exclusive
    /// with query runs: queries take a read guard, ingest takes write.
    pub ingest_gate: RwLock<()>,
}

impl AppState {
    pub fn new(
        engine: Arc<AnalystEngine>,
        store: Arc<DatasetStore>,
        index: Option<Arc<SqliteEntityIndex>>,
    ) -> Self {
        Self {
            engine,
            store,
            index,
            ingest_gate: RwLock::new(()),
        }
    }
}
