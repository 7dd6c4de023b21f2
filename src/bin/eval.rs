//! Evaluation CLI: encode, search and score every configured dataset, then write score.json.

use anyhow::Context;
use clap::Parser;
use densebench::{
    dataset::{load_dataset, resolve_datasets},
    db::{migrate, record_run, Db},
    encoder::{encode_dataset, Encoder, EmbeddingStore, HttpEncoder},
    eval::{evaluate_dataset, Metric, QualitativeSample, ScoreReport, ScoreTable},
    search::ScoreFunction,
    Config,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "eval")]
#[command(about = "Exact dense retrieval evaluation over BEIR-style datasets")]
struct Args {
    /// Evaluate only the biomedical datasets
    #[arg(long)]
    medical_dataset: bool,

    /// Dataset to evaluate (repeatable); overrides [datasets].names
    #[arg(long = "dataset")]
    datasets: Vec<String>,

    /// Similarity function: dot or cos
    #[arg(long)]
    score_function: Option<ScoreFunction>,

    /// Seed for the qualitative sample
    #[arg(long)]
    seed: Option<u64>,

    /// Directory for score.json (default: [densebench].output_dir)
    #[arg(long)]
    output: Option<PathBuf>,
}

fn print_table(dataset: &str, table: &ScoreTable, k_values: &[usize]) {
    println!("\n=== {} ({} queries) ===", dataset, table.query_count());
    for metric in Metric::ALL {
        let cells: Vec<String> = k_values
            .iter()
            .map(|&k| format!("{}: {:.5}", metric.label_at(k), table.get(metric, k).unwrap_or(0.0)))
            .collect();
        println!("  {}", cells.join("  "));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.densebench.log_level.as_str()),
    )
    .init();

    if args.medical_dataset {
        config.datasets.medical_only = true;
    }
    if !args.datasets.is_empty() {
        config.datasets.medical_only = false;
        config.datasets.names = args.datasets.clone();
    }
    if let Some(score_function) = args.score_function {
        config.retrieval.score_function = score_function;
    }
    if let Some(seed) = args.seed {
        config.report.sample_seed = seed;
    }
    let output_dir = args.output.unwrap_or_else(|| config.densebench.output_dir.clone());

    let dirs = resolve_datasets(config.datasets_dir(), &config.datasets.selected());
    if dirs.is_empty() {
        anyhow::bail!(
            "None of the selected datasets exist under {}",
            config.datasets_dir().display()
        );
    }

    let db = Db::open_migrated(config.db_path(), &migrate::default_migrations_dir()).await?;
    let encoder = HttpEncoder::new(&config.encoder, config.api_key()?)?;
    let store = EmbeddingStore::new(db.clone(), encoder.model());

    log::info!(
        "Evaluating {} dataset(s) with {} ({}), k = {:?}",
        dirs.len(),
        encoder.model(),
        config.retrieval.score_function,
        config.retrieval.k_values
    );

    let mut report = ScoreReport::new(
        encoder.model(),
        config.retrieval.score_function,
        &config.retrieval.k_values,
    );

    for dir in dirs {
        let split = config.datasets.split.clone();
        let name = dir.name.clone();
        let dataset = tokio::task::spawn_blocking(move || load_dataset(&dir, &split))
            .await?
            .with_context(|| format!("Failed to load dataset {}", name))?;

        let (queries, docs) = encode_dataset(&encoder, &store, &dataset)
            .await
            .with_context(|| format!("Failed to encode dataset {}", name))?;

        let retrieval = config.retrieval.clone();
        let (dataset, evaluation) = tokio::task::spawn_blocking(move || {
            let evaluation = evaluate_dataset(&dataset, &queries, &docs, &retrieval);
            (dataset, evaluation)
        })
        .await?;
        let evaluation = evaluation.with_context(|| format!("Failed to evaluate dataset {}", name))?;

        if let Some(sample) = QualitativeSample::pick(
            &dataset,
            &evaluation.rankings,
            config.report.sample_top_n,
            config.report.sample_seed,
        ) {
            sample.log();
        }

        print_table(&name, &evaluation.scores, &config.retrieval.k_values);
        report.insert(&name, evaluation.scores);
        if let Some(record) = report.run_record(&name)? {
            record_run(&db, record).await?;
        }
    }

    let path = report.write(&output_dir)?;
    println!("\nScores written to {}", path.display());

    Ok(())
}
