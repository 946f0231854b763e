use anyhow::{Context, Result};
use clap::Parser;
use cropcast::application::trainer::Trainer;
use cropcast::config::ForecastConfig;
use cropcast::domain::errors::{ForecastError, ModelError};
use cropcast::domain::record::Task;
use cropcast::infrastructure::datastore::CsvDataStore;
use cropcast::infrastructure::model_store::ModelStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train crop forecasting models", long_about = None)]
struct Args {
    /// Commodity to train (matches the record's commodity field exactly)
    #[arg(long)]
    commodity: Option<String>,

    /// Task to train: price, demand or both
    #[arg(long, default_value = "both")]
    task: String,

    /// Directory of per-commodity price CSVs (overrides DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for model artifacts (overrides MODEL_DIR)
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Number of trees in the random forest
    #[arg(long)]
    n_trees: Option<usize>,

    /// Training seed; fixed by default for reproducible models
    #[arg(long)]
    seed: Option<u64>,

    /// Maintenance mode: check every stored artifact and retrain the ones
    /// that fail to load
    #[arg(long)]
    recover: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ForecastConfig::from_env()?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = args.model_dir {
        config.model_dir = dir;
    }
    if let Some(n) = args.n_trees {
        config.n_trees = n;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let data = CsvDataStore::new(&config.data_dir, config.moving_avg_window);
    let store = Arc::new(ModelStore::new(&config.model_dir)?);
    let trainer = Trainer::new(store, &config);

    if args.recover {
        return recover_all(&config.model_dir, &data, &trainer);
    }

    let commodity = args
        .commodity
        .context("--commodity is required unless --recover is set")?;
    let tasks: Vec<Task> = match args.task.as_str() {
        "both" => vec![Task::Price, Task::Demand],
        other => vec![other.parse()?],
    };

    let loaded = data.load_commodity(&commodity)?;
    println!(
        "Loaded {} records from {:?} ({} malformed rows dropped)",
        loaded.records.len(),
        data.source_path(&commodity),
        loaded.dropped
    );
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for rec in &loaded.records {
        *counts.entry(rec.commodity.as_str()).or_default() += 1;
    }
    println!("Commodity counts:");
    for (name, count) in &counts {
        println!("  - {}: {} rows", name, count);
    }

    for task in tasks {
        match trainer.train(&commodity, task, &loaded.records) {
            Ok(_) => println!(
                "Trained {} {} model ({} trees, seed {})",
                commodity, task, config.n_trees, config.seed
            ),
            Err(ForecastError::Model(ModelError::InsufficientData { have, need, .. })) => {
                println!(
                    "Skipped {} {} model: {} records, need {}",
                    commodity, task, have, need
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Walks the model directory, tries to load each artifact and retrains any
/// that fail, from the commodity's current history.
fn recover_all(model_dir: &std::path::Path, data: &CsvDataStore, trainer: &Trainer) -> Result<()> {
    let mut checked = 0usize;
    let mut failed = 0usize;
    for entry in std::fs::read_dir(model_dir)
        .with_context(|| format!("Failed to read model directory {:?}", model_dir))?
    {
        let path = entry?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        let Some((commodity, task)) = parse_artifact_name(name) else {
            continue;
        };
        checked += 1;

        let loaded = data.load_commodity(&commodity)?;
        match trainer.recover(&commodity, task, &loaded.records) {
            Ok(_) => println!("OK {} {}", commodity, task),
            Err(e) => {
                failed += 1;
                println!("FAILED {} {}: {}", commodity, task, e);
            }
        }
    }
    println!("Checked {} artifacts, {} unrecoverable", checked, failed);
    Ok(())
}

/// Artifact files are `<commodity>_<task>_model.json`; commodity names may
/// themselves contain underscores, so the task is split off the tail.
fn parse_artifact_name(name: &str) -> Option<(String, Task)> {
    let stem = name.strip_suffix("_model.json")?;
    let (commodity, task) = stem.rsplit_once('_')?;
    Some((commodity.to_string(), task.parse().ok()?))
}
