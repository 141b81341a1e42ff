use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use datalyst_core::error::AnalystError;
use datalyst_store::CsvDataset;

use crate::state::AppState;

/// Run-level failures mapped to a JSON error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<AnalystError> for ApiError {
    fn from(e: AnalystError) -> Self {
        let status = match &e {
            AnalystError::Ingest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub generated_sql: String,
}

// POST /api/query — runs the workflow
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    if body.question.trim().is_empty() {
        return Err(ApiError::bad_request("question must not be empty"));
    }

    // Hold a read guard so ingestion cannot rebuild the store mid-run
    let _guard = state.ingest_gate.read().await;

    let outcome = state.engine.run(&body.question).await.map_err(|e| {
        error!(error = %e, "Workflow run failed");
        ApiError::from(e)
    })?;

    Ok(Json(QueryResponse {
        answer: outcome.final_answer,
        generated_sql: outcome.generated_sql,
    }))
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub columns: Vec<String>,
    pub rows: usize,
}

// POST /api/ingest — multipart CSV upload, rebuilds store and index
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let mut payload: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {}", e)))?
    {
        if field.name() == Some("file") || field.file_name().is_some() {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?;
            payload = Some(bytes.to_vec());
            break;
        }
    }

    let payload = payload.ok_or_else(|| ApiError::bad_request("no file in upload"))?;

    // Exclusive with query runs
    let _guard = state.ingest_gate.write().await;

    let dataset = CsvDataset::parse(payload.as_slice())?;
    let report = state.store.ingest(&dataset)?;

    if let Some(index) = &state.index {
        index.rebuild(&report.entity_strings).await?;
    }

    info!(
        columns = report.columns.len(),
        rows = report.row_count,
        indexed = state.index.is_some(),
        "Ingest complete"
    );

    Ok(Json(IngestResponse {
        status: "success".to_string(),
        columns: report.columns,
        rows: report.row_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use datalyst_core::config::WorkflowConfig;
    use datalyst_core::traits::{Oracle, TabularStore};
    use datalyst_store::DatasetStore;
    use datalyst_test_utils::ScriptedOracle;
    use datalyst_workflow::AnalystEngine;
    use tempfile::tempdir;

    #[test]
    fn test_query_request_parsing() {
        let body: QueryRequest =
            serde_json::from_str(r#"{"question": "total revenue?"}"#).unwrap();
        assert_eq!(body.question, "total revenue?");
    }

    #[test]
    fn test_api_error_status_mapping() {
        let e = ApiError::from(AnalystError::Ingest("bad csv".into()));
        assert_eq!(e.status, StatusCode::BAD_REQUEST);

        let e = ApiError::from(AnalystError::OracleRequest("down".into()));
        assert_eq!(e.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_query_handler_runs_the_workflow() {
        let dir = tempdir().unwrap();
        let store = Arc::new(DatasetStore::new(dir.path().join("dataset.db")));
        let dataset =
            CsvDataset::parse("Company Name,Revenue\nAcme Corp,1000\n".as_bytes()).unwrap();
        store.ingest(&dataset).unwrap();

        let oracle = Arc::new(ScriptedOracle::new());
        oracle.push_json(serde_json::json!({"intent": "database"}));
        // No index configured, so the mapper never calls the oracle
        oracle.push_json(
            serde_json::json!({"sql_query": "SELECT SUM(Revenue) AS total FROM dataset"}),
        );
        oracle.push_text("Total revenue is 1000.");

        let engine = Arc::new(AnalystEngine::new(
            oracle.clone() as Arc<dyn Oracle>,
            store.clone() as Arc<dyn TabularStore>,
            Arc::new(datalyst_index::NullEntityIndex),
            WorkflowConfig::default(),
        ));
        let state = Arc::new(AppState::new(engine, store, None));

        let response = query(
            State(state),
            Json(QueryRequest {
                question: "what is the total revenue?".into(),
            }),
        )
        .await
        .expect("query should succeed");

        assert_eq!(response.answer, "Total revenue is 1000.");
        assert_eq!(
            response.generated_sql,
            "SELECT SUM(Revenue) AS total FROM dataset"
        );
    }

    #[tokio::test]
    async fn test_query_handler_rejects_blank_question() {
        let dir = tempdir().unwrap();
        let store = Arc::new(DatasetStore::new(dir.path().join("dataset.db")));
        let engine = Arc::new(AnalystEngine::new(
            Arc::new(ScriptedOracle::new()) as Arc<dyn Oracle>,
            store.clone() as Arc<dyn TabularStore>,
            Arc::new(datalyst_index::NullEntityIndex),
            WorkflowConfig::default(),
        ));
        let state = Arc::new(AppState::new(engine, store, None));

        let err = query(
            State(state),
            Json(QueryRequest {
                question: "   ".into(),
            }),
        )
        .await
        .expect_err("blank question should be rejected");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
