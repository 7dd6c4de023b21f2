use anyhow::Result;
use clap::Parser;
use densebench::config::Config;
use densebench::dataset::discover_datasets;
use densebench::db::{migrate, recent_runs, Db};
use densebench::encoder::EmbeddingStore;

#[derive(Parser, Debug)]
#[command(name = "stats")]
#[command(about = "Embedding store contents and recent evaluation runs")]
struct Args {
    /// Number of run records to show
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

/// NDCG@10 from a stored score table, if the run used k = 10
fn ndcg_at_10(scores_json: &str) -> Option<f64> {
    let scores: serde_json::Value = serde_json::from_str(scores_json).ok()?;
    scores.get("ndcg")?.get("NDCG@10")?.as_f64()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.densebench.log_level.as_str()),
    )
    .init();

    let db = Db::open_migrated(config.db_path(), &migrate::default_migrations_dir()).await?;
    let store = EmbeddingStore::new(db.clone(), &config.encoder.model);

    let local = discover_datasets(config.datasets_dir())?;
    println!("\n=== Local Datasets ({}) ===\n", config.datasets_dir().display());
    if local.is_empty() {
        println!("No corpus.jsonl found.");
    }
    for dir in &local {
        println!("  {}", dir.name);
    }

    println!("\n=== densebench Embedding Store ({}) ===\n", config.db_path().display());
    let counts = store.counts().await?;
    if counts.is_empty() {
        println!("No embeddings stored. Run `embed` or `eval` first.");
    } else {
        println!("{:-<90}", "");
        println!("{:<36} {:<24} {:<6} {:>10} {:>10}", "Model", "Dataset", "Kind", "Count", "Dims");
        println!("{:-<90}", "");
        for c in &counts {
            println!("{:<36} {:<24} {:<6} {:>10} {:>10}", c.model, c.dataset, c.kind, c.count, c.dimensions);
        }
        println!("{:-<90}", "");
        let total: usize = counts.iter().map(|c| c.count).sum();
        println!("Total vectors: {}", total);
    }

    println!("\n=== Recent Evaluation Runs ===\n");
    let runs = recent_runs(&db, args.limit).await?;
    if runs.is_empty() {
        println!("No evaluation runs recorded.");
        return Ok(());
    }

    println!("{:-<110}", "");
    println!(
        "{:<27} {:<10} {:<24} {:<28} {:<5} {:>7} {:>7}",
        "Created", "Run", "Dataset", "Model", "Score", "Queries", "NDCG@10"
    );
    println!("{:-<110}", "");
    for run in &runs {
        let ndcg = ndcg_at_10(&run.scores_json)
            .map(|v| format!("{:.4}", v))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<27} {:<10} {:<24} {:<28} {:<5} {:>7} {:>7}",
            run.created_at,
            run.run_id.chars().take(8).collect::<String>(),
            run.dataset,
            run.model,
            run.score_function,
            run.query_count,
            ndcg
        );
    }
    println!("{:-<110}", "");

    Ok(())
}
