use crate::config::RetrievalConfig;
use crate::error::{DensebenchError, Result};
use crate::search::topk::{Hit, TopK};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Similarity function used for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScoreFunction {
    /// Unnormalized inner product
    #[serde(rename = "dot")]
    Dot,
    /// L2-normalized inner product
    #[serde(rename = "cos", alias = "cosine", alias = "cos_sim")]
    Cosine,
}

impl ScoreFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreFunction::Dot => "dot",
            ScoreFunction::Cosine => "cos",
        }
    }
}

impl fmt::Display for ScoreFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreFunction {
    type Err = DensebenchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dot" => Ok(ScoreFunction::Dot),
            "cos" | "cosine" | "cos_sim" => Ok(ScoreFunction::Cosine),
            other => Err(DensebenchError::Config(format!(
                "unknown score function '{}': choose between dot, cos",
                other
            ))),
        }
    }
}

/// Row-major matrix of embeddings, one row per identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    dim: usize,
    ids: Vec<String>,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// Create an empty matrix of fixed dimensionality.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ids: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Build from (id, vector) rows. Every row must have length `dim`.
    pub fn from_rows<I>(dim: usize, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Vec<f32>)>,
    {
        let mut matrix = Self::new(dim);
        for (id, row) in rows {
            matrix.push(id, &row)?;
        }
        Ok(matrix)
    }

    /// Append one row.
    pub fn push(&mut self, id: String, row: &[f32]) -> Result<()> {
        if row.len() != self.dim {
            return Err(DensebenchError::Dimension {
                expected: self.dim,
                got: row.len(),
            });
        }
        self.ids.push(id);
        self.data.extend_from_slice(row);
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }
}

/// Dense Q x D score matrix produced by [`SimilarityEngine::score_matrix`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl ScoreMatrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, query: usize, doc: usize) -> f32 {
        self.data[query * self.cols + doc]
    }

    /// Full score vector of one query over all documents.
    pub fn row(&self, query: usize) -> &[f32] {
        &self.data[query * self.cols..(query + 1) * self.cols]
    }
}

/// Exact (exhaustive) similarity scoring between query and document embeddings.
///
/// Queries and documents are both walked in fixed-size chunks. Every score is a
/// single sequential dot product over the embedding dimension, so the output
/// does not depend on either chunk size.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    function: ScoreFunction,
    query_batch_size: usize,
    corpus_chunk_size: usize,
    ignore_identical_ids: bool,
}

impl SimilarityEngine {
    pub fn new(config: &RetrievalConfig) -> Self {
        Self {
            function: config.score_function,
            query_batch_size: config.query_batch_size.max(1),
            corpus_chunk_size: config.corpus_chunk_size.max(1),
            ignore_identical_ids: config.ignore_identical_ids,
        }
    }

    pub fn function(&self) -> ScoreFunction {
        self.function
    }

    /// Compute every query/document score. Intended for small inputs and tests;
    /// [`search`](Self::search) is the memory-bounded path.
    pub fn score_matrix(
        &self,
        queries: &EmbeddingMatrix,
        docs: &EmbeddingMatrix,
    ) -> Result<ScoreMatrix> {
        check_dimensions(queries, docs)?;
        let doc_norms = self.norms(docs);
        let cols = docs.len();
        let mut data = vec![0.0f32; queries.len() * cols];

        for q_start in (0..queries.len()).step_by(self.query_batch_size) {
            let q_end = (q_start + self.query_batch_size).min(queries.len());
            for d_start in (0..cols).step_by(self.corpus_chunk_size) {
                let d_end = (d_start + self.corpus_chunk_size).min(cols);
                for q in q_start..q_end {
                    let query = queries.row(q);
                    let q_norm = self.norm(query);
                    for d in d_start..d_end {
                        data[q * cols + d] = self.score(query, q_norm, docs.row(d), doc_norms[d]);
                    }
                }
            }
        }

        Ok(ScoreMatrix {
            rows: queries.len(),
            cols,
            data,
        })
    }

    /// Exact top-k search: for every query, the `k` best documents by score
    /// (descending), ties broken by ascending document index.
    ///
    /// Each query in a batch owns its own [`TopK`]; batches are scored in
    /// parallel with rayon and the result equals sequential execution.
    pub fn search(
        &self,
        queries: &EmbeddingMatrix,
        docs: &EmbeddingMatrix,
        k: usize,
    ) -> Result<Vec<Vec<Hit>>> {
        check_dimensions(queries, docs)?;
        let doc_norms = self.norms(docs);
        let k = k.min(docs.len());
        let mut results: Vec<Vec<Hit>> = Vec::with_capacity(queries.len());

        for q_start in (0..queries.len()).step_by(self.query_batch_size) {
            let q_end = (q_start + self.query_batch_size).min(queries.len());
            let mut heaps: Vec<TopK> = (q_start..q_end).map(|_| TopK::new(k)).collect();

            for d_start in (0..docs.len()).step_by(self.corpus_chunk_size) {
                let d_end = (d_start + self.corpus_chunk_size).min(docs.len());
                heaps.par_iter_mut().enumerate().for_each(|(offset, heap)| {
                    let q = q_start + offset;
                    let query = queries.row(q);
                    let q_norm = self.norm(query);
                    let query_id = queries.id(q);
                    for d in d_start..d_end {
                        if self.ignore_identical_ids && docs.id(d) == query_id {
                            continue;
                        }
                        heap.push(d, self.score(query, q_norm, docs.row(d), doc_norms[d]));
                    }
                });
            }

            log::debug!(
                "Scored queries {}..{} against {} documents",
                q_start,
                q_end,
                docs.len()
            );
            results.extend(heaps.into_iter().map(TopK::into_sorted));
        }

        Ok(results)
    }

    fn norms(&self, matrix: &EmbeddingMatrix) -> Vec<f32> {
        (0..matrix.len()).map(|i| self.norm(matrix.row(i))).collect()
    }

    fn norm(&self, v: &[f32]) -> f32 {
        match self.function {
            ScoreFunction::Dot => 1.0,
            ScoreFunction::Cosine => l2_norm(v),
        }
    }

    fn score(&self, query: &[f32], q_norm: f32, doc: &[f32], d_norm: f32) -> f32 {
        let dot = dot_product(query, doc);
        match self.function {
            ScoreFunction::Dot => dot,
            ScoreFunction::Cosine => {
                // Zero-magnitude vectors have no direction
                if q_norm == 0.0 || d_norm == 0.0 {
                    0.0
                } else {
                    dot / (q_norm * d_norm)
                }
            }
        }
    }
}

fn check_dimensions(queries: &EmbeddingMatrix, docs: &EmbeddingMatrix) -> Result<()> {
    if queries.dim() != docs.dim() {
        return Err(DensebenchError::Dimension {
            expected: docs.dim(),
            got: queries.dim(),
        });
    }
    Ok(())
}

/// Sequential inner product of two equal-length vectors.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}
