//! Per-query ranked retrieval output shared by every metric.

use crate::error::{DensebenchError, Result};
use crate::search::{EmbeddingMatrix, Hit};
use serde::Serialize;
use std::collections::BTreeMap;

/// One ranked document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDoc {
    pub doc_id: String,
    pub score: f32,
}

impl ScoredDoc {
    pub fn new(doc_id: impl Into<String>, score: f32) -> Self {
        Self {
            doc_id: doc_id.into(),
            score,
        }
    }
}

/// query id -> documents best-first. Each query is inserted once and never
/// modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Rankings {
    inner: BTreeMap<String, Vec<ScoredDoc>>,
}

impl Rankings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the ranking of one query.
    pub fn insert(&mut self, query_id: impl Into<String>, ranked: Vec<ScoredDoc>) -> Result<()> {
        let query_id = query_id.into();
        if self.inner.contains_key(&query_id) {
            return Err(DensebenchError::DuplicateId(format!(
                "ranking for query {} already stored",
                query_id
            )));
        }
        self.inner.insert(query_id, ranked);
        Ok(())
    }

    /// Translate engine hits (row indices) into id-keyed rankings.
    /// `hits[i]` belongs to `queries.id(i)`.
    pub fn from_hits(
        queries: &EmbeddingMatrix,
        docs: &EmbeddingMatrix,
        hits: Vec<Vec<Hit>>,
    ) -> Result<Self> {
        if hits.len() != queries.len() {
            return Err(DensebenchError::InvalidInput(format!(
                "{} hit lists for {} queries",
                hits.len(),
                queries.len()
            )));
        }
        let mut rankings = Self::new();
        for (q, query_hits) in hits.into_iter().enumerate() {
            let ranked = query_hits
                .into_iter()
                .map(|h| ScoredDoc::new(docs.id(h.index), h.score))
                .collect();
            rankings.insert(queries.id(q), ranked)?;
        }
        Ok(rankings)
    }

    /// Ranked list of a query; empty when the query was never ranked.
    pub fn get(&self, query_id: &str) -> &[ScoredDoc] {
        self.inner.get(query_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, query_id: &str) -> bool {
        self.inner.contains_key(query_id)
    }

    /// Queries in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ScoredDoc])> {
        self.inner.iter().map(|(q, r)| (q.as_str(), r.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
