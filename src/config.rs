use crate::dataset::{BEIR_DATASETS, MEDICAL_DATASETS};
use crate::search::ScoreFunction;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub densebench: DensebenchConfig,
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub datasets: DatasetsConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// Paths and logging
#[derive(Debug, Clone, Deserialize)]
pub struct DensebenchConfig {
    /// Root directory holding one BEIR-layout directory per dataset.
    pub datasets_dir: PathBuf,
    /// Where score.json is written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// SQLite file for the embedding store and run history.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Payload encoding requested from the embeddings endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingFormat {
    #[default]
    Float,
    Base64,
}

impl EncodingFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingFormat::Float => "float",
            EncodingFormat::Base64 => "base64",
        }
    }
}

/// Encoder endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    /// OpenAI-compatible embeddings URL
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding a bearer token; None for unauthenticated local servers.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_encoder_batch_size")]
    pub batch_size: usize,
    pub dimensions: usize,
    #[serde(default)]
    pub encoding_format: EncodingFormat,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

/// Run configuration for exact search and metric computation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub score_function: ScoreFunction,
    /// Cutoffs evaluated for every metric; sorted ascending after validation.
    pub k_values: Vec<usize>,
    pub query_batch_size: usize,
    pub corpus_chunk_size: usize,
    /// Never rank a document whose id equals the query id.
    pub ignore_identical_ids: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            score_function: ScoreFunction::Dot,
            k_values: vec![1, 3, 5, 10, 100, 1000],
            query_batch_size: 128,
            corpus_chunk_size: 50_000,
            ignore_identical_ids: true,
        }
    }
}

impl RetrievalConfig {
    /// Largest configured cutoff; the retrieval depth per query.
    pub fn max_k(&self) -> usize {
        self.k_values.iter().copied().max().unwrap_or(0)
    }

    /// Check k values and batch sizes; sorts and de-duplicates `k_values`.
    pub fn validate(&mut self) -> Result<()> {
        if self.k_values.is_empty() {
            anyhow::bail!("retrieval.k_values must not be empty");
        }
        if self.k_values.contains(&0) {
            anyhow::bail!("retrieval.k_values must be positive integers");
        }
        self.k_values.sort_unstable();
        self.k_values.dedup();

        if self.query_batch_size == 0 {
            anyhow::bail!("retrieval.query_batch_size must be greater than 0");
        }
        if self.corpus_chunk_size == 0 {
            anyhow::bail!("retrieval.corpus_chunk_size must be greater than 0");
        }
        Ok(())
    }
}

/// Which datasets to evaluate
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetsConfig {
    pub names: Vec<String>,
    pub medical_only: bool,
    pub split: String,
}

impl Default for DatasetsConfig {
    fn default() -> Self {
        Self {
            names: BEIR_DATASETS.iter().map(|s| s.to_string()).collect(),
            medical_only: false,
            split: "test".to_string(),
        }
    }
}

impl DatasetsConfig {
    /// Dataset names in evaluation order after applying `medical_only`.
    pub fn selected(&self) -> Vec<String> {
        if self.medical_only {
            MEDICAL_DATASETS.iter().map(|s| s.to_string()).collect()
        } else {
            self.names.clone()
        }
    }
}

/// Qualitative report settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub sample_seed: u64,
    pub sample_top_n: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            sample_seed: 42,
            sample_top_n: 10,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("densebench.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_encoder_batch_size() -> usize {
    16
}

fn default_max_retries() -> usize {
    3
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in DENSEBENCH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("DENSEBENCH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_file(&config_path)
    }

    /// Load and validate a specific config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&mut self) -> Result<()> {
        if !self.densebench.datasets_dir.is_dir() {
            anyhow::bail!(
                "datasets_dir must be an existing directory: {}",
                self.densebench.datasets_dir.display()
            );
        }

        if let Some(ref var) = self.encoder.api_key_env {
            std::env::var(var).with_context(|| {
                format!(
                    "Environment variable {} not set. Set it in your .env file or remove encoder.api_key_env for unauthenticated endpoints.",
                    var
                )
            })?;
        }

        if self.encoder.dimensions == 0 {
            anyhow::bail!("encoder.dimensions must be greater than 0");
        }

        if self.encoder.batch_size == 0 {
            anyhow::bail!("encoder.batch_size must be greater than 0");
        }

        if self.report.sample_top_n == 0 {
            anyhow::bail!("report.sample_top_n must be greater than 0");
        }

        self.retrieval.validate()?;

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.densebench.db_path
    }

    /// Get the datasets root
    pub fn datasets_dir(&self) -> &Path {
        &self.densebench.datasets_dir
    }

    /// Read the encoder API key, if one is configured
    pub fn api_key(&self) -> Result<Option<String>> {
        match self.encoder.api_key_env {
            Some(ref var) => Ok(Some(
                std::env::var(var).with_context(|| format!("Environment variable {} not set", var))?,
            )),
            None => Ok(None),
        }
    }
}
