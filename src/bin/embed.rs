use anyhow::{Context, Result};
use clap::Parser;
use densebench::dataset::{load_dataset, resolve_datasets};
use densebench::db::{migrate, Db};
use densebench::encoder::{encode_dataset, Encoder, EmbeddingStore, HttpEncoder};
use densebench::Config;

#[derive(Parser, Debug)]
#[command(name = "embed")]
#[command(about = "Pre-compute query and document embeddings (incremental: unchanged texts are reused)")]
struct Args {
    /// Only the biomedical datasets
    #[arg(long)]
    medical_dataset: bool,

    /// Dataset to embed (repeatable); overrides [datasets].names
    #[arg(long = "dataset")]
    datasets: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
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
        config.datasets.names = args.datasets;
    }

    let db = Db::open_migrated(config.db_path(), &migrate::default_migrations_dir()).await?;
    log::info!("Database path: {}", config.db_path().display());

    let encoder = HttpEncoder::new(&config.encoder, config.api_key()?)?;
    let store = EmbeddingStore::new(db, encoder.model());
    log::info!(
        "Encoder configured: model={}, endpoint={}, batch_size={}",
        config.encoder.model,
        config.encoder.endpoint,
        config.encoder.batch_size
    );

    let dirs = resolve_datasets(config.datasets_dir(), &config.datasets.selected());
    if dirs.is_empty() {
        log::warn!("No selected dataset found under {}", config.datasets_dir().display());
        return Ok(());
    }

    let start = std::time::Instant::now();
    for dir in dirs {
        let split = config.datasets.split.clone();
        let name = dir.name.clone();
        let dataset = tokio::task::spawn_blocking(move || load_dataset(&dir, &split))
            .await?
            .with_context(|| format!("Failed to load dataset {}", name))?;

        let (queries, docs) = encode_dataset(&encoder, &store, &dataset)
            .await
            .with_context(|| format!("Failed to encode dataset {}", name))?;
        log::info!("{}: {} query and {} document embeddings ready", name, queries.len(), docs.len());
    }

    log::info!("Embedding complete in {:?}", start.elapsed());
    Ok(())
}
