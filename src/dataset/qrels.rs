//! Relevance judgments: query id -> document id -> grade.

use crate::error::{DensebenchError, Result};
use std::collections::{BTreeMap, HashSet};

/// Judgments of one query. A document absent from the map was never judged.
pub type Judgments = BTreeMap<String, u32>;

/// Largest accepted relevance grade. NDCG gain is 2^grade - 1, which must
/// stay finite when summed over a ranking.
pub const MAX_GRADE: u32 = 64;

/// Graded relevance judgments for a dataset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Qrels {
    inner: BTreeMap<String, Judgments>,
}

impl Qrels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one judgment. Negative grades and grades above [`MAX_GRADE`]
    /// are a data error, never clamped.
    /// A repeated (query, document) pair keeps the last grade.
    pub fn insert(&mut self, query_id: &str, doc_id: &str, grade: i64) -> Result<()> {
        if grade < 0 {
            return Err(DensebenchError::InvalidQrels(format!(
                "negative relevance grade {} for query {} / document {}",
                grade, query_id, doc_id
            )));
        }
        if grade > i64::from(MAX_GRADE) {
            return Err(DensebenchError::InvalidQrels(format!(
                "relevance grade {} above {} for query {} / document {}",
                grade, MAX_GRADE, query_id, doc_id
            )));
        }
        self.inner
            .entry(query_id.to_string())
            .or_default()
            .insert(doc_id.to_string(), grade as u32);
        Ok(())
    }

    /// All judgments of a query, if it has any.
    pub fn judgments(&self, query_id: &str) -> Option<&Judgments> {
        self.inner.get(query_id)
    }

    /// Judged query ids in ascending order.
    pub fn query_ids(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    pub fn contains_query(&self, query_id: &str) -> bool {
        self.inner.contains_key(query_id)
    }

    /// Number of judged queries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Total number of judgment rows.
    pub fn judgment_count(&self) -> usize {
        self.inner.values().map(|j| j.len()).sum()
    }

    /// Every judged query and document must exist in the loaded collections.
    pub fn validate_ids(&self, query_ids: &HashSet<&str>, doc_ids: &HashSet<&str>) -> Result<()> {
        for (query_id, judgments) in &self.inner {
            if !query_ids.contains(query_id.as_str()) {
                return Err(DensebenchError::UnknownId(format!(
                    "qrels reference query {} which is not in the query set",
                    query_id
                )));
            }
            if let Some(doc_id) = judgments.keys().find(|d| !doc_ids.contains(d.as_str())) {
                return Err(DensebenchError::UnknownId(format!(
                    "qrels for query {} reference document {} which is not in the corpus",
                    query_id, doc_id
                )));
            }
        }
        Ok(())
    }
}
