use std::path::{Path, PathBuf};

use futures::future::BoxFuture;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::{debug, info};

use datalyst_core::error::{AnalystError, Result};
use datalyst_core::traits::TabularStore;
use datalyst_core::types::{IngestReport, QueryOutcome, Row};

use crate::ingest::CsvDataset;

/// SQLite-backed store holding the single ingested dataset.
///
/// Every call opens its own connection and closes it on return, so
/// concurrent query runs never share a cursor and ingestion can rebuild
/// the table between runs.
pub struct DatasetStore {
    db_path: PathBuf,
}

impl DatasetStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AnalystError::Database(format!("failed to create data directory: {}", e))
            })?;
        }
        Connection::open(&self.db_path).map_err(|e| AnalystError::Database(e.to_string()))
    }

    /// Replace the dataset table with the contents of a parsed CSV and
    /// return what was loaded.
    pub fn ingest(&self, dataset: &CsvDataset) -> Result<IngestReport> {
        let mut conn = self.open()?;

        let column_defs: Vec<String> = dataset
            .columns
            .iter()
            .zip(&dataset.types)
            .map(|(name, ty)| format!("\"{}\" {}", name, ty.sql_name()))
            .collect();

        let tx = conn
            .transaction()
            .map_err(|e| AnalystError::Database(e.to_string()))?;

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS dataset;
             CREATE TABLE dataset ({});",
            column_defs.join(", ")
        ))
        .map_err(|e| AnalystError::Database(e.to_string()))?;

        {
            let placeholders: Vec<String> =
                (1..=dataset.columns.len()).map(|i| format!("?{}", i)).collect();
            let insert_sql = format!("INSERT INTO dataset VALUES ({})", placeholders.join(", "));
            let mut stmt = tx
                .prepare(&insert_sql)
                .map_err(|e| AnalystError::Database(e.to_string()))?;

            for row in &dataset.rows {
                let params: Vec<rusqlite::types::Value> = row
                    .iter()
                    .map(|v| {
                        let v = v.trim();
                        if v.is_empty() {
                            rusqlite::types::Value::Null
                        } else if let Ok(i) = v.parse::<i64>() {
                            rusqlite::types::Value::Integer(i)
                        } else if let Ok(f) = v.parse::<f64>() {
                            rusqlite::types::Value::Real(f)
                        } else {
                            rusqlite::types::Value::Text(v.to_string())
                        }
                    })
                    .collect();
                stmt.execute(rusqlite::params_from_iter(params))
                    .map_err(|e| AnalystError::Database(e.to_string()))?;
            }
        }

        tx.commit()
            .map_err(|e| AnalystError::Database(e.to_string()))?;

        info!(
            columns = dataset.columns.len(),
            rows = dataset.rows.len(),
            "Dataset ingested"
        );

        Ok(IngestReport {
            columns: dataset.columns.clone(),
            row_count: dataset.rows.len(),
            entity_strings: dataset.entity_strings(),
        })
    }

    fn schema_text(&self) -> Result<String> {
        if !self.db_path.exists() {
            return Ok("No data loaded yet.".to_string());
        }

        let conn = self.open()?;
        let mut stmt = conn
            .prepare("PRAGMA table_info('dataset')")
            .map_err(|e| AnalystError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let ty: String = row.get(2)?;
                Ok((name, ty))
            })
            .map_err(|e| AnalystError::Database(e.to_string()))?;

        let mut schema = String::from("Table 'dataset' columns:\n");
        let mut any = false;
        for row in rows {
            let (name, ty) = row.map_err(|e| AnalystError::Database(e.to_string()))?;
            schema.push_str(&format!("- {} ({})\n", name, ty));
            any = true;
        }

        if !any {
            return Ok("No data loaded yet.".to_string());
        }
        Ok(schema)
    }

    fn run_query(&self, sql: &str) -> Result<QueryOutcome> {
        let conn = self.open()?;

        let mut stmt = match conn.prepare(sql) {
            Ok(stmt) => stmt,
            Err(e) => return Ok(QueryOutcome::SqlError(e.to_string())),
        };

        let column_names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = Vec::new();
        let mut raw_rows = match stmt.query([]) {
            Ok(r) => r,
            Err(e) => return Ok(QueryOutcome::SqlError(e.to_string())),
        };

        loop {
            match raw_rows.next() {
                Ok(Some(raw)) => {
                    let mut row = Row::new();
                    for (i, name) in column_names.iter().enumerate() {
                        let value = match raw.get_ref(i) {
                            Ok(v) => value_ref_to_json(v),
                            Err(e) => return Ok(QueryOutcome::SqlError(e.to_string())),
                        };
                        row.insert(name.clone(), value);
                    }
                    rows.push(row);
                }
                Ok(None) => break,
                // No partial results: a mid-scan failure discards everything
                Err(e) => return Ok(QueryOutcome::SqlError(e.to_string())),
            }
        }

        debug!(rows = rows.len(), "Query executed");
        Ok(QueryOutcome::Rows(rows))
    }
}

fn value_ref_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::String(format!("<blob {} bytes>", b.len())),
    }
}

impl TabularStore for DatasetStore {
    fn schema(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { self.schema_text() })
    }

    fn execute(&self, sql: &str) -> BoxFuture<'_, Result<QueryOutcome>> {
        let sql = sql.to_string();
        Box::pin(async move { self.run_query(&sql) })
    }
}
