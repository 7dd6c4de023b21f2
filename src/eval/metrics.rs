//! Rank-quality metrics for one query at one cutoff.
//!
//! Every function reads the top `k` entries of a ranked list against the
//! query's judgments. Positions past the end of the list count as
//! non-relevant, and each cutoff is computed from scratch.

use crate::dataset::Judgments;
use crate::eval::ScoredDoc;
use serde::Serialize;
use std::fmt;

/// The metric battery reported for every dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Ndcg,
    Map,
    Recall,
    Precision,
    Mrr,
    RecallCap,
    Hole,
}

impl Metric {
    /// Report order.
    pub const ALL: [Metric; 7] = [
        Metric::Ndcg,
        Metric::Map,
        Metric::Recall,
        Metric::Precision,
        Metric::Mrr,
        Metric::RecallCap,
        Metric::Hole,
    ];

    /// Key of the metric in score tables.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Ndcg => "ndcg",
            Metric::Map => "map",
            Metric::Recall => "recall",
            Metric::Precision => "precision",
            Metric::Mrr => "mrr",
            Metric::RecallCap => "recall_cap",
            Metric::Hole => "hole",
        }
    }

    /// Prefix of the per-cutoff label, e.g. "NDCG" in "NDCG@10".
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Ndcg => "NDCG",
            Metric::Map => "MAP",
            Metric::Recall => "Recall",
            Metric::Precision => "P",
            Metric::Mrr => "MRR",
            Metric::RecallCap => "R_cap",
            Metric::Hole => "Hole",
        }
    }

    pub fn label_at(&self, k: usize) -> String {
        format!("{}@{}", self.label(), k)
    }

    /// Value for one query, or None when the metric is undefined for it
    /// (recall variants of a query without relevant documents).
    pub fn evaluate(&self, ranked: &[ScoredDoc], judgments: &Judgments, k: usize) -> Option<f64> {
        match self {
            Metric::Ndcg => Some(ndcg_at_k(ranked, judgments, k)),
            Metric::Map => Some(average_precision_at_k(ranked, judgments, k)),
            Metric::Recall => recall_at_k(ranked, judgments, k),
            Metric::Precision => Some(precision_at_k(ranked, judgments, k)),
            Metric::Mrr => Some(reciprocal_rank_at_k(ranked, judgments, k)),
            Metric::RecallCap => capped_recall_at_k(ranked, judgments, k),
            Metric::Hole => Some(hole_at_k(ranked, judgments, k)),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn grade(judgments: &Judgments, doc_id: &str) -> u32 {
    judgments.get(doc_id).copied().unwrap_or(0)
}

fn is_relevant(judgments: &Judgments, doc_id: &str) -> bool {
    grade(judgments, doc_id) > 0
}

/// R(q): judged documents with grade > 0.
pub fn relevant_count(judgments: &Judgments) -> usize {
    judgments.values().filter(|&&g| g > 0).count()
}

fn hits_in_top_k(ranked: &[ScoredDoc], judgments: &Judgments, k: usize) -> usize {
    ranked
        .iter()
        .take(k)
        .filter(|d| is_relevant(judgments, &d.doc_id))
        .count()
}

/// Precision@k: relevant documents in the top k, divided by k.
pub fn precision_at_k(ranked: &[ScoredDoc], judgments: &Judgments, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    hits_in_top_k(ranked, judgments, k) as f64 / k as f64
}

/// Recall@k: relevant documents in the top k, divided by R(q).
/// None when the query has no relevant documents.
pub fn recall_at_k(ranked: &[ScoredDoc], judgments: &Judgments, k: usize) -> Option<f64> {
    let total = relevant_count(judgments);
    if total == 0 {
        return None;
    }
    Some(hits_in_top_k(ranked, judgments, k) as f64 / total as f64)
}

/// Recall_cap@k: relevant documents in the top k, divided by min(k, R(q)).
/// None when the query has no relevant documents.
pub fn capped_recall_at_k(ranked: &[ScoredDoc], judgments: &Judgments, k: usize) -> Option<f64> {
    let total = relevant_count(judgments);
    if total == 0 || k == 0 {
        return None;
    }
    Some(hits_in_top_k(ranked, judgments, k) as f64 / total.min(k) as f64)
}

/// Reciprocal rank of the first relevant document within the top k; 0 if none.
pub fn reciprocal_rank_at_k(ranked: &[ScoredDoc], judgments: &Judgments, k: usize) -> f64 {
    ranked
        .iter()
        .take(k)
        .position(|d| is_relevant(judgments, &d.doc_id))
        .map(|pos| 1.0 / (pos + 1) as f64)
        .unwrap_or(0.0)
}

/// Average precision at k with the denominator capped at min(k, R(q)).
/// Queries without relevant documents score 0.
pub fn average_precision_at_k(ranked: &[ScoredDoc], judgments: &Judgments, k: usize) -> f64 {
    let denominator = relevant_count(judgments).min(k);
    if denominator == 0 {
        return 0.0;
    }
    let mut hits = 0usize;
    let mut sum_precision = 0.0;
    for (i, doc) in ranked.iter().take(k).enumerate() {
        if is_relevant(judgments, &doc.doc_id) {
            hits += 1;
            sum_precision += hits as f64 / (i + 1) as f64;
        }
    }
    sum_precision / denominator as f64
}

/// NDCG@k with exponential gain 2^rel - 1 and log2(rank + 1) discount.
/// 0 when the ideal DCG is 0.
pub fn ndcg_at_k(ranked: &[ScoredDoc], judgments: &Judgments, k: usize) -> f64 {
    let dcg: f64 = ranked
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, d)| gain(grade(judgments, &d.doc_id)) / discount(i + 1))
        .sum();

    let mut ideal: Vec<u32> = judgments.values().copied().filter(|&g| g > 0).collect();
    ideal.sort_unstable_by(|a, b| b.cmp(a));
    let idcg: f64 = ideal
        .iter()
        .take(k)
        .enumerate()
        .map(|(i, &g)| gain(g) / discount(i + 1))
        .sum();

    if idcg == 0.0 {
        0.0
    } else {
        dcg / idcg
    }
}

/// Hole@k: top-k documents the query has no judgment row for, divided by k.
/// A document judged with grade 0 is not a hole.
pub fn hole_at_k(ranked: &[ScoredDoc], judgments: &Judgments, k: usize) -> f64 {
    if k == 0 {
        return 0.0;
    }
    let holes = ranked
        .iter()
        .take(k)
        .filter(|d| !judgments.contains_key(&d.doc_id))
        .count();
    holes as f64 / k as f64
}

#[inline]
fn gain(grade: u32) -> f64 {
    2f64.powf(grade as f64) - 1.0
}

/// Discount for a 1-based rank.
#[inline]
fn discount(rank: usize) -> f64 {
    ((rank + 1) as f64).log2()
}
