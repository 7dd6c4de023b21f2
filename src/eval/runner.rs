//! Evaluation of one dataset from precomputed embeddings.

use crate::config::RetrievalConfig;
use crate::dataset::Dataset;
use crate::error::{DensebenchError, Result};
use crate::eval::{evaluate, Rankings, ScoreTable};
use crate::search::{EmbeddingMatrix, SimilarityEngine};

/// Rankings and aggregated scores of one dataset.
#[derive(Debug, Clone)]
pub struct DatasetEvaluation {
    pub dataset: String,
    pub rankings: Rankings,
    pub scores: ScoreTable,
}

/// Exact top-k retrieval for every query row.
pub fn retrieve(
    engine: &SimilarityEngine,
    queries: &EmbeddingMatrix,
    docs: &EmbeddingMatrix,
    k: usize,
) -> Result<Rankings> {
    let start = std::time::Instant::now();
    let hits = engine.search(queries, docs, k)?;
    log::debug!(
        "Exact {} search: {} queries x {} documents (k = {}) took {:?}",
        engine.function(),
        queries.len(),
        docs.len(),
        k,
        start.elapsed()
    );
    Rankings::from_hits(queries, docs, hits)
}

/// Retrieve at the largest configured cutoff and compute every metric.
///
/// Embedding rows must belong to the dataset: document ids from its corpus,
/// query ids from its judged queries.
pub fn evaluate_dataset(
    dataset: &Dataset,
    query_embeddings: &EmbeddingMatrix,
    doc_embeddings: &EmbeddingMatrix,
    config: &RetrievalConfig,
) -> Result<DatasetEvaluation> {
    if let Some(id) = doc_embeddings
        .ids()
        .iter()
        .find(|id| dataset.corpus.get(id).is_none())
    {
        return Err(DensebenchError::UnknownId(format!(
            "embedding for document {} which is not in the {} corpus",
            id, dataset.name
        )));
    }
    if let Some(id) = query_embeddings
        .ids()
        .iter()
        .find(|id| dataset.query(id).is_none())
    {
        return Err(DensebenchError::UnknownId(format!(
            "embedding for query {} which is not in the {} query set",
            id, dataset.name
        )));
    }

    let engine = SimilarityEngine::new(config);
    let rankings = retrieve(&engine, query_embeddings, doc_embeddings, config.max_k())?;
    let scores = evaluate(&dataset.qrels, &rankings, dataset.query_ids(), &config.k_values)?;

    log::info!(
        "{}: evaluated {} queries for k in {:?}",
        dataset.name,
        scores.query_count(),
        config.k_values
    );

    Ok(DatasetEvaluation {
        dataset: dataset.name.clone(),
        rankings,
        scores,
    })
}
