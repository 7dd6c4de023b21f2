use super::{Corpus, Dataset, Document, Qrels, Query};
use crate::error::{DensebenchError, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const CORPUS_FILE: &str = "corpus.jsonl";
const QUERIES_FILE: &str = "queries.jsonl";
const QRELS_DIR: &str = "qrels";

/// A dataset directory in BEIR layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDir {
    /// Path relative to the datasets root, with '/' separators (e.g. "nfcorpus", "cqadupstack/android").
    pub name: String,
    pub path: PathBuf,
}

/// Find every directory under `root` that contains a corpus.jsonl.
///
/// Nested collections (one level of sub-datasets) are included; results are
/// sorted by name.
pub fn discover_datasets(root: &Path) -> Result<Vec<DatasetDir>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(2)
        .max_depth(3)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() || entry.file_name() != CORPUS_FILE {
            continue;
        }
        let dir = match entry.path().parent() {
            Some(d) => d,
            None => continue,
        };
        let name = dir
            .strip_prefix(root)
            .map_err(|e| DensebenchError::InvalidInput(format!("{}: {}", dir.display(), e)))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        found.push(DatasetDir {
            name,
            path: dir.to_path_buf(),
        });
    }

    found.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(found)
}

/// Map configured dataset names to local directories, in the given order.
/// Names without a local corpus are skipped with a warning.
pub fn resolve_datasets(root: &Path, names: &[String]) -> Vec<DatasetDir> {
    names
        .iter()
        .filter_map(|name| {
            let path = root.join(name);
            if path.join(CORPUS_FILE).is_file() {
                Some(DatasetDir {
                    name: name.clone(),
                    path,
                })
            } else {
                log::warn!(
                    "Dataset {} not found under {} (expected {}), skipping",
                    name,
                    root.display(),
                    path.join(CORPUS_FILE).display()
                );
                None
            }
        })
        .collect()
}

/// Load corpus, queries, and the qrels of `split`, validating them against each other.
///
/// Only queries that have judgments in the split are kept.
pub fn load_dataset(dir: &DatasetDir, split: &str) -> Result<Dataset> {
    let start = std::time::Instant::now();

    let corpus = load_corpus(&dir.path.join(CORPUS_FILE))?;
    let all_queries = load_queries(&dir.path.join(QUERIES_FILE))?;
    let qrels = load_qrels(&dir.path.join(QRELS_DIR).join(format!("{}.tsv", split)))?;

    let query_ids: HashSet<&str> = all_queries.iter().map(|q| q.id.as_str()).collect();
    qrels.validate_ids(&query_ids, &corpus.ids())?;

    let queries: Vec<Query> = all_queries
        .into_iter()
        .filter(|q| qrels.contains_query(&q.id))
        .collect();

    log::info!(
        "Loaded {} ({}): {} documents, {} judged queries, {} judgments in {:?}",
        dir.name,
        split,
        corpus.len(),
        queries.len(),
        qrels.judgment_count(),
        start.elapsed()
    );

    Dataset::new(dir.name.clone(), corpus, queries, qrels)
}

/// Parse corpus.jsonl; ids must be unique.
pub fn load_corpus(path: &Path) -> Result<Corpus> {
    let mut corpus = Corpus::new();
    for_each_json_line(path, |doc: Document| corpus.push(doc))?;
    Ok(corpus)
}

/// Parse queries.jsonl; ids must be unique.
pub fn load_queries(path: &Path) -> Result<Vec<Query>> {
    let mut seen = HashSet::new();
    let mut queries = Vec::new();
    for_each_json_line(path, |query: Query| {
        if !seen.insert(query.id.clone()) {
            return Err(DensebenchError::DuplicateId(format!("query {}", query.id)));
        }
        queries.push(query);
        Ok(())
    })?;
    Ok(queries)
}

/// Parse a qrels TSV (`query-id`, `corpus-id`, `score`). A header line is
/// recognised only as the first line.
pub fn load_qrels(path: &Path) -> Result<Qrels> {
    let reader = BufReader::new(open(path)?);
    let mut qrels = Qrels::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(DensebenchError::Parse(format!(
                "{}:{}: expected 3 tab-separated columns, got {}",
                path.display(),
                line_no + 1,
                fields.len()
            )));
        }
        let grade = match fields[2].trim().parse::<i64>() {
            Ok(g) => g,
            Err(_) if line_no == 0 => continue,
            Err(_) => {
                return Err(DensebenchError::InvalidQrels(format!(
                    "{}:{}: relevance grade '{}' is not an integer",
                    path.display(),
                    line_no + 1,
                    fields[2]
                )))
            }
        };
        qrels.insert(fields[0].trim(), fields[1].trim(), grade)?;
    }

    Ok(qrels)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        DensebenchError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}

fn for_each_json_line<T, F>(path: &Path, mut f: F) -> Result<()>
where
    T: serde::de::DeserializeOwned,
    F: FnMut(T) -> Result<()>,
{
    let reader = BufReader::new(open(path)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: T = serde_json::from_str(&line).map_err(|e| {
            DensebenchError::Parse(format!("{}:{}: {}", path.display(), line_no + 1, e))
        })?;
        f(value)?;
    }
    Ok(())
}
