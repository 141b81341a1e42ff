use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use datalyst_core::error::{AnalystError, Result};
use datalyst_core::traits::EntityIndex;

use crate::embeddings::{cosine_similarity, EmbeddingProvider};

const EMBED_BATCH_SIZE: usize = 64;

/// SQLite-persisted entity index: "column: value" strings with their
/// embedding vectors stored as f32 little-endian blobs, searched by a
/// full cosine-similarity scan.
///
/// Dataset dictionaries are small (distinct text values only), so a scan
/// beats maintaining an ANN structure.
pub struct SqliteEntityIndex {
    db_path: PathBuf,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SqliteEntityIndex {
    pub fn new(db_path: impl Into<PathBuf>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            db_path: db_path.into(),
            provider,
        }
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AnalystError::Index(format!("failed to create index directory: {}", e))
            })?;
        }
        Connection::open(&self.db_path).map_err(|e| AnalystError::Index(e.to_string()))
    }

    /// Drop and re-embed the whole dictionary. Called from ingestion,
    /// which is exclusive with query runs.
    pub async fn rebuild(&self, entries: &[String]) -> Result<()> {
        let mut vectors = Vec::with_capacity(entries.len());
        for batch in entries.chunks(EMBED_BATCH_SIZE) {
            let mut embedded = self.provider.embed(batch).await?;
            if embedded.len() != batch.len() {
                return Err(AnalystError::Index(format!(
                    "embedding count mismatch: sent {}, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            vectors.append(&mut embedded);
        }

        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .map_err(|e| AnalystError::Index(e.to_string()))?;

        tx.execute_batch(
            "DROP TABLE IF EXISTS entities;
             CREATE TABLE entities (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 text TEXT NOT NULL,
                 embedding BLOB NOT NULL
             );",
        )
        .map_err(|e| AnalystError::Index(e.to_string()))?;

        for (text, vector) in entries.iter().zip(&vectors) {
            let blob: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();
            tx.execute(
                "INSERT INTO entities (text, embedding) VALUES (?1, ?2)",
                params![text, blob],
            )
            .map_err(|e| AnalystError::Index(e.to_string()))?;
        }

        tx.commit().map_err(|e| AnalystError::Index(e.to_string()))?;
        info!(entries = entries.len(), "Entity index rebuilt");
        Ok(())
    }

    fn scan(&self, query_vec: &[f32], k: usize) -> Result<Vec<String>> {
        let conn = self.open()?;

        let mut stmt = match conn.prepare("SELECT text, embedding FROM entities") {
            Ok(stmt) => stmt,
            // Index file exists but was never built
            Err(_) => return Ok(vec![]),
        };

        let rows = stmt
            .query_map([], |row| {
                let text: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((text, blob))
            })
            .map_err(|e| AnalystError::Index(e.to_string()))?;

        let mut scored: Vec<(f32, String)> = Vec::new();
        for row in rows {
            let (text, blob) = row.map_err(|e| AnalystError::Index(e.to_string()))?;
            let embedding: Vec<f32> = blob
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();
            scored.push((cosine_similarity(query_vec, &embedding), text));
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, text)| text).collect())
    }
}

impl EntityIndex for SqliteEntityIndex {
    fn search(&self, text: &str, k: usize) -> BoxFuture<'_, Result<Vec<String>>> {
        let text = text.to_string();
        Box::pin(async move {
            // No ingestion yet — degrade to pass-through, never fail
            if !self.db_path.exists() {
                debug!("Entity index not built, returning no candidates");
                return Ok(vec![]);
            }

            let query_vec = self
                .provider
                .embed(std::slice::from_ref(&text))
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| AnalystError::Index("empty embedding response".into()))?;

            self.scan(&query_vec, k)
        })
    }
}

/// Index used when no embedding endpoint is configured. Always returns no
/// candidates, which degrades the mapper to pass-through.
pub struct NullEntityIndex;

impl EntityIndex for NullEntityIndex {
    fn search(&self, _text: &str, _k: usize) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async { Ok(vec![]) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use tempfile::tempdir;

    /// Deterministic provider: maps known strings onto fixed unit vectors.
    struct FakeProvider;

    fn fake_vector(text: &str) -> Vec<f32> {
        if text.contains("Acme") {
            vec![1.0, 0.0, 0.0]
        } else if text.contains("Globex") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.9, 0.1, 0.0]
        }
    }

    impl EmbeddingProvider for FakeProvider {
        fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
            let vectors = texts.iter().map(|t| fake_vector(t)).collect();
            Box::pin(async move { Ok(vectors) })
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn test_search_without_index_is_empty() {
        let dir = tempdir().unwrap();
        let index = SqliteEntityIndex::new(dir.path().join("entities.db"), Arc::new(FakeProvider));
        let results = index.search("anything", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_and_search_nearest_first() {
        let dir = tempdir().unwrap();
        let index = SqliteEntityIndex::new(dir.path().join("entities.db"), Arc::new(FakeProvider));

        let entries = vec![
            "Company_Name: Acme Corp".to_string(),
            "Company_Name: Globex".to_string(),
        ];
        index.rebuild(&entries).await.unwrap();

        let results = index.search("total revenue for acmi?", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        // Query vector is closest to the Acme embedding
        assert_eq!(results[0], "Company_Name: Acme Corp");
    }

    #[tokio::test]
    async fn test_search_respects_k() {
        let dir = tempdir().unwrap();
        let index = SqliteEntityIndex::new(dir.path().join("entities.db"), Arc::new(FakeProvider));

        let entries = vec![
            "Company_Name: Acme Corp".to_string(),
            "Company_Name: Globex".to_string(),
        ];
        index.rebuild(&entries).await.unwrap();

        let results = index.search("acme", 1).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_entries() {
        let dir = tempdir().unwrap();
        let index = SqliteEntityIndex::new(dir.path().join("entities.db"), Arc::new(FakeProvider));

        index
            .rebuild(&["Company_Name: Acme Corp".to_string()])
            .await
            .unwrap();
        index
            .rebuild(&["Company_Name: Globex".to_string()])
            .await
            .unwrap();

        let results = index.search("anything", 10).await.unwrap();
        assert_eq!(results, vec!["Company_Name: Globex".to_string()]);
    }

    #[tokio::test]
    async fn test_null_index() {
        let results = NullEntityIndex.search("question", 3).await.unwrap();
        assert!(results.is_empty());
    }
}
