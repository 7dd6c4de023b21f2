//! Mean of every metric at every cutoff across a dataset's queries.

use crate::dataset::{Judgments, Qrels};
use crate::error::{DensebenchError, Result};
use crate::eval::metrics::Metric;
use crate::eval::{Rankings, ScoredDoc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, HashSet};

/// metric -> k -> mean value, for one dataset. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    scores: BTreeMap<Metric, BTreeMap<usize, f64>>,
    query_count: usize,
}

impl ScoreTable {
    pub fn get(&self, metric: Metric, k: usize) -> Option<f64> {
        self.scores.get(&metric).and_then(|by_k| by_k.get(&k)).copied()
    }

    /// All cutoffs of one metric in ascending k.
    pub fn metric(&self, metric: Metric) -> Option<&BTreeMap<usize, f64>> {
        self.scores.get(&metric)
    }

    /// Number of queries that were averaged.
    pub fn query_count(&self) -> usize {
        self.query_count
    }
}

/// Serializes as `{"ndcg": {"NDCG@1": 0.5, ...}, "map": {...}, ...}`.
impl Serialize for ScoreTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut outer = serializer.serialize_map(Some(self.scores.len()))?;
        for metric in Metric::ALL {
            if let Some(by_k) = self.scores.get(&metric) {
                outer.serialize_entry(metric.name(), &LabelledScores(metric, by_k))?;
            }
        }
        outer.end()
    }
}

struct LabelledScores<'a>(Metric, &'a BTreeMap<usize, f64>);

impl Serialize for LabelledScores<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.1.len()))?;
        for (&k, value) in self.1 {
            map.serialize_entry(&self.0.label_at(k), value)?;
        }
        map.end()
    }
}

/// Metric values of one query at every cutoff; None where undefined.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMetrics {
    pub query_id: String,
    pub values: BTreeMap<(Metric, usize), Option<f64>>,
}

impl QueryMetrics {
    pub fn compute(query_id: &str, ranked: &[ScoredDoc], judgments: &Judgments, k_values: &[usize]) -> Self {
        let mut values = BTreeMap::new();
        for metric in Metric::ALL {
            for &k in k_values {
                values.insert((metric, k), metric.evaluate(ranked, judgments, k));
            }
        }
        Self {
            query_id: query_id.to_string(),
            values,
        }
    }

    pub fn get(&self, metric: Metric, k: usize) -> Option<f64> {
        self.values.get(&(metric, k)).copied().flatten()
    }
}

/// Accumulates per-query metrics into a [`ScoreTable`].
///
/// Sums are taken in the order queries are added; adding the same query
/// twice is an error.
#[derive(Debug, Clone)]
pub struct Aggregator {
    k_values: Vec<usize>,
    sums: BTreeMap<(Metric, usize), (f64, usize)>,
    seen: HashSet<String>,
}

impl Aggregator {
    pub fn new(k_values: &[usize]) -> Self {
        Self {
            k_values: k_values.to_vec(),
            sums: BTreeMap::new(),
            seen: HashSet::new(),
        }
    }

    pub fn add(&mut self, query: &QueryMetrics) -> Result<()> {
        if !self.seen.insert(query.query_id.clone()) {
            return Err(DensebenchError::DuplicateId(format!(
                "query {} aggregated twice",
                query.query_id
            )));
        }
        for metric in Metric::ALL {
            for &k in &self.k_values {
                let entry = self.sums.entry((metric, k)).or_insert((0.0, 0));
                if let Some(v) = query.get(metric, k) {
                    entry.0 += v;
                    entry.1 += 1;
                }
            }
        }
        Ok(())
    }

    /// Arithmetic means. A metric no query defines (e.g. recall when no query
    /// has relevant documents) is reported as 0.
    pub fn finish(self) -> ScoreTable {
        let mut scores: BTreeMap<Metric, BTreeMap<usize, f64>> = BTreeMap::new();
        for metric in Metric::ALL {
            let by_k = scores.entry(metric).or_default();
            for &k in &self.k_values {
                let (sum, count) = self.sums.get(&(metric, k)).copied().unwrap_or((0.0, 0));
                let mean = if count == 0 { 0.0 } else { sum / count as f64 };
                by_k.insert(k, mean);
            }
        }
        ScoreTable {
            scores,
            query_count: self.seen.len(),
        }
    }
}

/// Evaluate every query in `query_ids` exactly once against `rankings`.
/// A query without a ranking is scored as an empty ranked list.
pub fn evaluate<'a, I>(qrels: &Qrels, rankings: &Rankings, query_ids: I, k_values: &[usize]) -> Result<ScoreTable>
where
    I: IntoIterator<Item = &'a str>,
{
    let empty = Judgments::new();
    let mut aggregator = Aggregator::new(k_values);
    for query_id in query_ids {
        let judgments = qrels.judgments(query_id).unwrap_or(&empty);
        let metrics = QueryMetrics::compute(query_id, rankings.get(query_id), judgments, k_values);
        aggregator.add(&metrics)?;
    }
    let table = aggregator.finish();
    log::debug!("Aggregated {} queries at k = {:?}", table.query_count(), k_values);
    Ok(table)
}
