use crate::db::Db;
use crate::error::{DensebenchError, Result};
use rusqlite::params;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Whether a stored vector encodes a corpus document or a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbeddingKind {
    Doc,
    Query,
}

impl EmbeddingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingKind::Doc => "doc",
            EmbeddingKind::Query => "query",
        }
    }
}

impl fmt::Display for EmbeddingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 of the exact encoder input, hex encoded
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Vector as a little-endian f32 BLOB
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(DensebenchError::InvalidInput(format!(
            "Embedding BLOB of {} bytes is not a whole number of f32 values",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Number of stored vectors per (model, dataset, kind)
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingCount {
    pub model: String,
    pub dataset: String,
    pub kind: String,
    pub count: usize,
    pub dimensions: usize,
}

/// Encoded vectors of one model, scoped by dataset and kind.
#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    db: Db,
    model: String,
}

impl EmbeddingStore {
    pub fn new(db: Db, model: &str) -> Self {
        Self {
            db,
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Stored vectors for `wanted` (item id -> content hash).
    ///
    /// A vector is returned only when its hash matches and it has
    /// `dimensions` values; anything else is stale and must be re-encoded.
    pub async fn load(
        &self,
        dataset: &str,
        kind: EmbeddingKind,
        dimensions: usize,
        wanted: HashMap<String, String>,
    ) -> Result<HashMap<String, Vec<f32>>> {
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }
        let model = self.model.clone();
        let dataset = dataset.to_string();

        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT item_id, content_hash, embedding FROM embeddings
                     WHERE model = ?1 AND dataset = ?2 AND kind = ?3",
                )?;
                let mut rows = stmt.query(params![model, dataset, kind.as_str()])?;

                let mut found = HashMap::new();
                while let Some(row) = rows.next()? {
                    let item_id: String = row.get(0)?;
                    let hash: String = row.get(1)?;
                    if wanted.get(&item_id) != Some(&hash) {
                        continue;
                    }
                    let blob: Vec<u8> = row.get(2)?;
                    let embedding = blob_to_embedding(&blob)?;
                    if embedding.len() == dimensions {
                        found.insert(item_id, embedding);
                    }
                }
                Ok(found)
            })
            .await
    }

    /// Insert or replace vectors as (item id, content hash, vector). Returns rows written.
    pub async fn save(
        &self,
        dataset: &str,
        kind: EmbeddingKind,
        rows: Vec<(String, String, Vec<f32>)>,
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let model = self.model.clone();
        let dataset = dataset.to_string();

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR REPLACE INTO embeddings
                         (model, dataset, kind, item_id, content_hash, dimensions, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    )?;
                    for (item_id, hash, embedding) in &rows {
                        stmt.execute(params![
                            model,
                            dataset,
                            kind.as_str(),
                            item_id,
                            hash,
                            embedding.len() as i64,
                            embedding_to_blob(embedding),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await
    }

    /// Per-dataset counts across every model in the database
    pub async fn counts(&self) -> Result<Vec<EmbeddingCount>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT model, dataset, kind, COUNT(*), MAX(dimensions) FROM embeddings
                     GROUP BY model, dataset, kind
                     ORDER BY model, dataset, kind",
                )?;
                let counts = stmt
                    .query_map([], |row| {
                        Ok(EmbeddingCount {
                            model: row.get(0)?,
                            dataset: row.get(1)?,
                            kind: row.get(2)?,
                            count: row.get::<_, i64>(3)? as usize,
                            dimensions: row.get::<_, i64>(4)? as usize,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok(counts)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate::default_migrations_dir;
    use tempfile::TempDir;

    async fn store(temp_dir: &TempDir, model: &str) -> EmbeddingStore {
        let db = Db::open_migrated(&temp_dir.path().join("test.db"), &default_migrations_dir())
            .await
            .unwrap();
        EmbeddingStore::new(db, model)
    }

    fn wanted(items: &[(&str, &str)]) -> HashMap<String, String> {
        items
            .iter()
            .map(|(id, text)| (id.to_string(), content_hash(text)))
            .collect()
    }

    #[test]
    fn test_content_hash() {
        let hash = content_hash("hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, content_hash("hello"));
        assert_ne!(hash, content_hash("hello "));
    }

    #[test]
    fn test_blob_conversion() {
        let v = vec![0.25f32, -1.0, 3.5];
        assert_eq!(blob_to_embedding(&embedding_to_blob(&v)).unwrap(), v);
        assert!(blob_to_embedding(&[0, 1, 2]).is_err());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir, "m1").await;
        let written = store
            .save(
                "scifact",
                EmbeddingKind::Doc,
                vec![
                    ("d1".to_string(), content_hash("one"), vec![1.0, 0.0]),
                    ("d2".to_string(), content_hash("two"), vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(written, 2);

        let found = store
            .load("scifact", EmbeddingKind::Doc, 2, wanted(&[("d1", "one"), ("d2", "two"), ("d3", "three")]))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["d2"], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_changed_text_is_stale() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir, "m1").await;
        store
            .save("scifact", EmbeddingKind::Doc, vec![("d1".to_string(), content_hash("old"), vec![1.0])])
            .await
            .unwrap();

        let found = store
            .load("scifact", EmbeddingKind::Doc, 1, wanted(&[("d1", "new")]))
            .await
            .unwrap();
        assert!(found.is_empty());

        // Wrong width is stale as well
        let found = store
            .load("scifact", EmbeddingKind::Doc, 2, wanted(&[("d1", "old")]))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_scoped_by_model_dataset_and_kind() {
        let temp_dir = TempDir::new().unwrap();
        let m1 = store(&temp_dir, "m1").await;
        m1.save("scifact", EmbeddingKind::Doc, vec![("x".to_string(), content_hash("t"), vec![1.0])])
            .await
            .unwrap();

        let m2 = EmbeddingStore::new(m1.db.clone(), "m2");
        assert!(m2.load("scifact", EmbeddingKind::Doc, 1, wanted(&[("x", "t")])).await.unwrap().is_empty());
        assert!(m1.load("nfcorpus", EmbeddingKind::Doc, 1, wanted(&[("x", "t")])).await.unwrap().is_empty());
        assert!(m1.load("scifact", EmbeddingKind::Query, 1, wanted(&[("x", "t")])).await.unwrap().is_empty());

        let counts = m1.counts().await.unwrap();
        assert_eq!(
            counts,
            vec![EmbeddingCount {
                model: "m1".to_string(),
                dataset: "scifact".to_string(),
                kind: "doc".to_string(),
                count: 1,
                dimensions: 1,
            }]
        );
    }

    #[tokio::test]
    async fn test_save_replaces_existing_row() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir, "m1").await;
        for (text, v) in [("a", 1.0f32), ("b", 2.0)] {
            store
                .save("scifact", EmbeddingKind::Query, vec![("q".to_string(), content_hash(text), vec![v])])
                .await
                .unwrap();
        }
        let found = store
            .load("scifact", EmbeddingKind::Query, 1, wanted(&[("q", "b")]))
            .await
            .unwrap();
        assert_eq!(found["q"], vec![2.0]);
        assert_eq!(store.counts().await.unwrap()[0].count, 1);
    }
}
