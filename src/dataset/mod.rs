//! Benchmark collections: corpus, queries, and relevance judgments.

pub mod loader;
pub mod qrels;

pub use loader::{discover_datasets, load_dataset, resolve_datasets, DatasetDir};
pub use qrels::{Judgments, Qrels, MAX_GRADE};

use crate::error::{DensebenchError, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// BEIR datasets evaluated by default, in evaluation order.
pub const BEIR_DATASETS: &[&str] = &[
    "msmarco",
    "trec-covid",
    "nfcorpus",
    "nq",
    "hotpotqa",
    "fiqa",
    "arguana",
    "webis-touche2020",
    "quora",
    "dbpedia-entity",
    "scidocs",
    "fever",
    "climate-fever",
    "scifact",
];

/// Biomedical subset.
pub const MEDICAL_DATASETS: &[&str] = &["trec-covid", "nfcorpus", "scifact", "scidocs"];

/// A corpus document. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Document {
    #[serde(rename = "_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: String,
}

impl Document {
    /// Text handed to the encoder: title and body joined by a space.
    pub fn encoder_input(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => format!("{} {}", title, self.text),
            _ => self.text.clone(),
        }
    }
}

/// A query. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Query {
    #[serde(rename = "_id", deserialize_with = "string_or_number")]
    pub id: String,
    pub text: String,
}

/// Some collections store numeric ids; they are treated as strings.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

/// Documents in file order. The position of a document is its index for
/// top-k tie-breaking.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    docs: Vec<Document>,
    index: HashMap<String, usize>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document; ids must be unique.
    pub fn push(&mut self, doc: Document) -> Result<()> {
        if self.index.contains_key(&doc.id) {
            return Err(DensebenchError::DuplicateId(format!("document {}", doc.id)));
        }
        self.index.insert(doc.id.clone(), self.docs.len());
        self.docs.push(doc);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.index.get(id).map(|&i| &self.docs[i])
    }

    pub fn documents(&self) -> &[Document] {
        &self.docs
    }

    pub fn ids(&self) -> HashSet<&str> {
        self.docs.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// One loaded benchmark split.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub name: String,
    pub corpus: Corpus,
    pub qrels: Qrels,
    /// Judged queries only, in file order.
    queries: Vec<Query>,
    query_index: HashMap<String, usize>,
}

impl Dataset {
    /// Assemble a split; query ids must be unique.
    pub fn new(name: impl Into<String>, corpus: Corpus, queries: Vec<Query>, qrels: Qrels) -> Result<Self> {
        let mut query_index = HashMap::with_capacity(queries.len());
        for (i, query) in queries.iter().enumerate() {
            if query_index.insert(query.id.clone(), i).is_some() {
                return Err(DensebenchError::DuplicateId(format!("query {}", query.id)));
            }
        }
        Ok(Self {
            name: name.into(),
            corpus,
            qrels,
            queries,
            query_index,
        })
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn query(&self, id: &str) -> Option<&Query> {
        self.query_index.get(id).map(|&i| &self.queries[i])
    }

    pub fn query_ids(&self) -> impl Iterator<Item = &str> {
        self.queries.iter().map(|q| q.id.as_str())
    }
}
