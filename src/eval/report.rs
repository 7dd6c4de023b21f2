//! Score report serialization and the qualitative spot-check sample.

use crate::dataset::Dataset;
use crate::db::RunRecord;
use crate::error::Result;
use crate::eval::{Rankings, ScoreTable};
use crate::search::ScoreFunction;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const SCORE_FILE: &str = "score.json";

/// Scores of one run across datasets, written as score.json.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub model: String,
    pub score_function: ScoreFunction,
    pub k_values: Vec<usize>,
    /// dataset -> table; a dataset appears only once its table is complete.
    pub scores: BTreeMap<String, ScoreTable>,
}

impl ScoreReport {
    pub fn new(model: &str, score_function: ScoreFunction, k_values: &[usize]) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            model: model.to_string(),
            score_function,
            k_values: k_values.to_vec(),
            scores: BTreeMap::new(),
        }
    }

    /// Record a finished dataset. Re-evaluating a dataset replaces its table.
    pub fn insert(&mut self, dataset: &str, table: ScoreTable) {
        self.scores.insert(dataset.to_string(), table);
    }

    /// History row for one dataset already in the report
    pub fn run_record(&self, dataset: &str) -> Result<Option<RunRecord>> {
        let Some(table) = self.scores.get(dataset) else {
            return Ok(None);
        };
        Ok(Some(RunRecord {
            run_id: self.run_id.to_string(),
            dataset: dataset.to_string(),
            model: self.model.clone(),
            score_function: self.score_function.to_string(),
            query_count: table.query_count(),
            scores_json: serde_json::to_string(table)?,
            created_at: self.generated_at.to_rfc3339(),
        }))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write `score.json` into `dir`, creating it if needed. Returns the file path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SCORE_FILE);
        // Write-then-rename so a reader never sees a partial file
        let tmp = dir.join(format!("{}.tmp", SCORE_FILE));
        std::fs::write(&tmp, self.to_json()?)?;
        std::fs::rename(&tmp, &path)?;
        log::info!("Wrote scores for {} dataset(s) to {}", self.scores.len(), path.display());
        Ok(path)
    }
}

/// One ranked hit of the sample, with the stored document text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleHit {
    pub rank: usize,
    pub doc_id: String,
    pub score: f32,
    pub title: Option<String>,
    pub text: String,
}

/// A query and its top results, for eyeballing retrieval quality.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualitativeSample {
    pub query_id: String,
    pub query: String,
    pub hits: Vec<SampleHit>,
}

impl QualitativeSample {
    /// Pick one ranked query with a seeded RNG and attach up to `top_n` hits.
    ///
    /// Candidates are visited in ascending query-id order, so the same seed
    /// always yields the same query. None when nothing was ranked.
    pub fn pick(dataset: &Dataset, rankings: &Rankings, top_n: usize, seed: u64) -> Option<Self> {
        let candidates: Vec<&str> = rankings.iter().map(|(q, _)| q).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let query_id = *candidates.choose(&mut rng)?;

        let hits = rankings
            .get(query_id)
            .iter()
            .take(top_n)
            .enumerate()
            .map(|(i, scored)| {
                let doc = dataset.corpus.get(&scored.doc_id);
                SampleHit {
                    rank: i + 1,
                    doc_id: scored.doc_id.clone(),
                    score: scored.score,
                    title: doc.and_then(|d| d.title.clone()),
                    text: doc.map(|d| d.text.clone()).unwrap_or_default(),
                }
            })
            .collect();

        Some(Self {
            query_id: query_id.to_string(),
            query: dataset
                .query(query_id)
                .map(|q| q.text.clone())
                .unwrap_or_default(),
            hits,
        })
    }

    /// Emit the sample through the log, one line per rank.
    pub fn log(&self) {
        for line in self.to_string().lines() {
            log::info!("{}", line);
        }
    }
}

impl fmt::Display for QualitativeSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Query : {}", self.query)?;
        for hit in &self.hits {
            writeln!(
                f,
                "Rank {}: {} [{}] - {}",
                hit.rank,
                hit.doc_id,
                hit.title.as_deref().unwrap_or(""),
                hit.text
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Corpus, Document, Qrels, Query};
    use crate::eval::{evaluate, ScoredDoc};
    use tempfile::TempDir;

    fn dataset() -> Dataset {
        let mut corpus = Corpus::new();
        for (id, title) in [("D1", Some("Aspirin")), ("D2", None), ("D3", Some("Other"))] {
            corpus
                .push(Document {
                    id: id.to_string(),
                    title: title.map(String::from),
                    text: format!("text of {}", id),
                })
                .unwrap();
        }
        let queries = (1..=5)
            .map(|i| Query {
                id: format!("Q{}", i),
                text: format!("query {}", i),
            })
            .collect();
        let mut qrels = Qrels::new();
        for i in 1..=5 {
            qrels.insert(&format!("Q{}", i), "D1", 1).unwrap();
        }
        Dataset::new("toy", corpus, queries, qrels).unwrap()
    }

    fn rankings() -> Rankings {
        let mut r = Rankings::new();
        for i in 1..=5 {
            r.insert(
                format!("Q{}", i),
                vec![
                    ScoredDoc::new("D2", 0.9),
                    ScoredDoc::new("D1", 0.8),
                    ScoredDoc::new("D3", 0.1),
                ],
            )
            .unwrap();
        }
        r
    }

    #[test]
    fn sample_is_reproducible_for_a_seed() {
        let ds = dataset();
        let r = rankings();
        let first = QualitativeSample::pick(&ds, &r, 2, 7).unwrap();
        for _ in 0..3 {
            assert_eq!(QualitativeSample::pick(&ds, &r, 2, 7).unwrap(), first);
        }
        assert_eq!(first.hits.len(), 2);
        assert_eq!(first.hits[0].rank, 1);
        assert_eq!(first.hits[0].doc_id, "D2");
        assert_eq!(first.hits[1].title.as_deref(), Some("Aspirin"));
        assert!(first.query.starts_with("query "));
    }

    #[test]
    fn different_seeds_cover_different_queries() {
        let ds = dataset();
        let r = rankings();
        let picked: std::collections::HashSet<String> = (0..50)
            .map(|seed| QualitativeSample::pick(&ds, &r, 1, seed).unwrap().query_id)
            .collect();
        assert!(picked.len() > 1);
    }

    #[test]
    fn sample_of_empty_rankings_is_none() {
        assert!(QualitativeSample::pick(&dataset(), &Rankings::new(), 10, 1).is_none());
    }

    #[test]
    fn sample_display_format() {
        let sample = QualitativeSample {
            query_id: "Q1".to_string(),
            query: "fever".to_string(),
            hits: vec![SampleHit {
                rank: 1,
                doc_id: "D1".to_string(),
                score: 0.5,
                title: Some("Aspirin".to_string()),
                text: "reduces fever".to_string(),
            }],
        };
        assert_eq!(
            sample.to_string(),
            "Query : fever\nRank 1: D1 [Aspirin] - reduces fever\n"
        );
    }

    #[test]
    fn report_writes_score_json() {
        let tmp = TempDir::new().unwrap();
        let ds = dataset();
        let table = evaluate(&ds.qrels, &rankings(), ds.query_ids(), &[1, 3]).unwrap();
        let mut report = ScoreReport::new("bert-mean", ScoreFunction::Dot, &[1, 3]);
        report.insert(&ds.name, table);

        let path = report.write(&tmp.path().join("eval")).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["model"], "bert-mean");
        assert_eq!(json["score_function"], "dot");
        assert_eq!(json["k_values"], serde_json::json!([1, 3]));
        // Every query has D1 (relevant) at rank 2
        assert_eq!(json["scores"]["toy"]["mrr"]["MRR@3"], 0.5);
        assert_eq!(json["scores"]["toy"]["precision"]["P@1"], 0.0);
        assert!(!tmp.path().join("eval").join("score.json.tmp").exists());
    }

    #[test]
    fn dataset_tables_nest_under_scores() {
        let ds = dataset();
        let table = evaluate(&ds.qrels, &rankings(), ds.query_ids(), &[1]).unwrap();
        let mut report = ScoreReport::new("bert-mean", ScoreFunction::Cosine, &[1]);
        report.insert(&ds.name, table);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["generated_at", "k_values", "model", "run_id", "score_function", "scores"]
        );
        let metrics: Vec<&str> = json["scores"]["toy"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(metrics.len(), 7);
        assert_eq!(json["scores"]["toy"]["recall_cap"]["R_cap@1"], 0.0);
        assert_eq!(json["scores"]["toy"]["hole"]["Hole@1"], 1.0);
    }

    #[test]
    fn run_record_carries_the_dataset_table() {
        let ds = dataset();
        let table = evaluate(&ds.qrels, &rankings(), ds.query_ids(), &[1]).unwrap();
        let mut report = ScoreReport::new("bert-mean", ScoreFunction::Cosine, &[1]);
        report.insert(&ds.name, table);

        let record = report.run_record("toy").unwrap().unwrap();
        assert_eq!(record.run_id, report.run_id.to_string());
        assert_eq!(record.score_function, "cos");
        assert_eq!(record.query_count, 5);
        let scores: serde_json::Value = serde_json::from_str(&record.scores_json).unwrap();
        assert_eq!(scores["mrr"]["MRR@1"], 0.0);
        assert!(report.run_record("absent").unwrap().is_none());
    }
}
