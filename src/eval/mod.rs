//! Evaluation: rankings, per-query metrics, aggregation and reporting.

pub mod aggregate;
pub mod metrics;
pub mod ranking;
pub mod report;
pub mod runner;

pub use aggregate::{evaluate, Aggregator, QueryMetrics, ScoreTable};
pub use metrics::{
    average_precision_at_k, capped_recall_at_k, hole_at_k, ndcg_at_k, precision_at_k,
    recall_at_k, reciprocal_rank_at_k, Metric,
};
pub use ranking::{Rankings, ScoredDoc};
pub use report::{QualitativeSample, SampleHit, ScoreReport, SCORE_FILE};
pub use runner::{evaluate_dataset, retrieve, DatasetEvaluation};
