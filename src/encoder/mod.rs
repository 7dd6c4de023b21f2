//! Encoder collaborator: turns documents and queries into vectors.

pub mod http;
pub mod store;

pub use http::HttpEncoder;
pub use store::{content_hash, EmbeddingCount, EmbeddingKind, EmbeddingStore};

use crate::dataset::{Corpus, Dataset, Query};
use crate::error::{DensebenchError, Result};
use crate::search::EmbeddingMatrix;
use std::collections::HashMap;
use std::future::Future;

/// Vectors persisted per round trip in [`encode_with_store`]
const PERSIST_CHUNK: usize = 1024;

/// Anything that maps texts to fixed-width vectors, one per input, in order.
pub trait Encoder {
    fn model(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn encode(&self, texts: &[String]) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;
}

/// (document id, encoder input) in corpus order
pub fn document_inputs(corpus: &Corpus) -> Vec<(String, String)> {
    corpus
        .documents()
        .iter()
        .map(|doc| (doc.id.clone(), doc.encoder_input()))
        .collect()
}

/// (query id, text) in the given order
pub fn query_inputs(queries: &[Query]) -> Vec<(String, String)> {
    queries.iter().map(|q| (q.id.clone(), q.text.clone())).collect()
}

/// Encode `items` (id, text), reusing stored vectors whose text is unchanged.
///
/// New vectors are persisted as they are produced, so an interrupted run
/// resumes where it stopped. Rows of the returned matrix follow `items`.
pub async fn encode_with_store<E: Encoder>(
    encoder: &E,
    store: &EmbeddingStore,
    dataset: &str,
    kind: EmbeddingKind,
    items: &[(String, String)],
) -> Result<EmbeddingMatrix> {
    let dim = encoder.dimensions();
    let hashes: HashMap<String, String> = items
        .iter()
        .map(|(id, text)| (id.clone(), content_hash(text)))
        .collect();
    let mut vectors = store.load(dataset, kind, dim, hashes.clone()).await?;

    let missing: Vec<&(String, String)> = items.iter().filter(|(id, _)| !vectors.contains_key(id)).collect();
    log::info!(
        "{} {}: {} of {} embeddings cached, encoding {}",
        dataset,
        kind,
        vectors.len(),
        items.len(),
        missing.len()
    );

    let mut encoded = 0;
    for chunk in missing.chunks(PERSIST_CHUNK) {
        let texts: Vec<String> = chunk.iter().map(|(_, text)| text.clone()).collect();
        let embeddings = encoder.encode(&texts).await?;
        if embeddings.len() != chunk.len() {
            return Err(DensebenchError::Encoder(format!(
                "Encoder returned {} vectors for {} inputs",
                embeddings.len(),
                chunk.len()
            )));
        }

        let rows: Vec<(String, String, Vec<f32>)> = chunk
            .iter()
            .zip(embeddings)
            .map(|((id, _), embedding)| (id.clone(), hashes[id].clone(), embedding))
            .collect();
        store.save(dataset, kind, rows.clone()).await?;
        for (id, _, embedding) in rows {
            vectors.insert(id, embedding);
        }

        encoded += chunk.len();
        log::debug!("{} {}: encoded {}/{}", dataset, kind, encoded, missing.len());
    }

    let mut matrix = EmbeddingMatrix::new(dim);
    for (id, _) in items {
        let embedding = vectors
            .remove(id)
            .ok_or_else(|| DensebenchError::UnknownId(format!("no embedding produced for {}", id)))?;
        matrix.push(id.clone(), &embedding)?;
    }
    Ok(matrix)
}

/// Query and document matrices of one dataset, as (queries, documents)
pub async fn encode_dataset<E: Encoder>(
    encoder: &E,
    store: &EmbeddingStore,
    dataset: &Dataset,
) -> Result<(EmbeddingMatrix, EmbeddingMatrix)> {
    let queries = encode_with_store(
        encoder,
        store,
        &dataset.name,
        EmbeddingKind::Query,
        &query_inputs(dataset.queries()),
    )
    .await?;
    let docs = encode_with_store(
        encoder,
        store,
        &dataset.name,
        EmbeddingKind::Doc,
        &document_inputs(&dataset.corpus),
    )
    .await?;
    Ok((queries, docs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate::default_migrations_dir;
    use crate::db::Db;
    use crate::dataset::Document;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Deterministic encoder: [text length, 1.0]; records every call.
    struct FakeEncoder {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl FakeEncoder {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn encoded_texts(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().flatten().cloned().collect()
        }
    }

    impl Encoder for FakeEncoder {
        fn model(&self) -> &str {
            "fake"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.lock().unwrap().push(texts.to_vec());
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    async fn store(temp_dir: &TempDir) -> EmbeddingStore {
        let db = Db::open_migrated(&temp_dir.path().join("test.db"), &default_migrations_dir())
            .await
            .unwrap();
        EmbeddingStore::new(db, "fake")
    }

    fn items(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()
    }

    #[tokio::test]
    async fn encodes_in_input_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;
        let encoder = FakeEncoder::new();

        let matrix = encode_with_store(&encoder, &store, "toy", EmbeddingKind::Doc, &items(&[("b", "xx"), ("a", "x")]))
            .await
            .unwrap();
        assert_eq!(matrix.ids(), &["b".to_string(), "a".to_string()]);
        assert_eq!(matrix.row(0), &[2.0, 1.0]);
        assert_eq!(matrix.row(1), &[1.0, 1.0]);
    }

    #[tokio::test]
    async fn reuses_unchanged_vectors() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir).await;

        let first = FakeEncoder::new();
        encode_with_store(&first, &store, "toy", EmbeddingKind::Doc, &items(&[("a", "x"), ("b", "yy")]))
            .await
            .unwrap();
        assert_eq!(first.encoded_texts().len(), 2);

        // Only the changed document goes back to the encoder
        let second = FakeEncoder::new();
        let matrix = encode_with_store(&second, &store, "toy", EmbeddingKind::Doc, &items(&[("a", "x"), ("b", "zzz")]))
            .await
            .unwrap();
        assert_eq!(second.encoded_texts(), vec!["zzz".to_string()]);
        assert_eq!(matrix.row(1), &[3.0, 1.0]);

        let third = FakeEncoder::new();
        encode_with_store(&third, &store, "toy", EmbeddingKind::Doc, &items(&[("a", "x"), ("b", "zzz")]))
            .await
            .unwrap();
        assert!(third.encoded_texts().is_empty());
    }

    #[test]
    fn document_input_joins_title_and_text() {
        let mut corpus = Corpus::new();
        corpus
            .push(Document {
                id: "d1".to_string(),
                title: Some("Aspirin".to_string()),
                text: "reduces fever".to_string(),
            })
            .unwrap();
        corpus
            .push(Document {
                id: "d2".to_string(),
                title: None,
                text: "plain".to_string(),
            })
            .unwrap();
        assert_eq!(
            document_inputs(&corpus),
            items(&[("d1", "Aspirin reduces fever"), ("d2", "plain")])
        );
    }
}
