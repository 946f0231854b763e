use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Forecasting core configuration. Everything has a sane default so the
/// library works out of the box; env vars override per deployment.
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    /// Directory holding one CSV of historical prices per commodity.
    pub data_dir: PathBuf,
    /// Directory where trained model artifacts are stored. Created if absent.
    pub model_dir: PathBuf,
    /// Trailing window (in records) for the moving average annotation.
    pub moving_avg_window: usize,
    /// Minimum qualifying records to train a price model.
    pub min_price_samples: usize,
    /// Minimum qualifying records to train a demand model.
    pub min_demand_samples: usize,
    /// Number of trees in the random forest.
    pub n_trees: usize,
    /// Maximum tree depth. None lets trees grow until pure.
    pub max_depth: Option<u16>,
    /// Seed for the forest's randomness; fixed for reproducible training.
    pub seed: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            model_dir: PathBuf::from("ml_models"),
            moving_avg_window: 30,
            min_price_samples: 30,
            min_demand_samples: 60,
            n_trees: 100,
            max_depth: None,
            seed: 42,
        }
    }
}

impl ForecastConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let data_dir = env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let model_dir = env::var("MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_dir);

        let moving_avg_window = env::var("MOVING_AVG_WINDOW")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<usize>()
            .context("Failed to parse MOVING_AVG_WINDOW")?;

        let min_price_samples = env::var("MIN_PRICE_SAMPLES")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<usize>()
            .context("Failed to parse MIN_PRICE_SAMPLES")?;

        let min_demand_samples = env::var("MIN_DEMAND_SAMPLES")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<usize>()
            .context("Failed to parse MIN_DEMAND_SAMPLES")?;

        let n_trees = env::var("FOREST_N_TREES")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<usize>()
            .context("Failed to parse FOREST_N_TREES")?;

        let max_depth = match env::var("FOREST_MAX_DEPTH") {
            Ok(raw) => Some(
                raw.parse::<u16>()
                    .context("Failed to parse FOREST_MAX_DEPTH")?,
            ),
            Err(_) => None,
        };

        let seed = env::var("FOREST_SEED")
            .unwrap_or_else(|_| "42".to_string())
            .parse::<u64>()
            .context("Failed to parse FOREST_SEED")?;

        anyhow::ensure!(moving_avg_window >= 1, "MOVING_AVG_WINDOW must be >= 1");

        Ok(Self {
            data_dir,
            model_dir,
            moving_avg_window,
            min_price_samples,
            min_demand_samples,
            n_trees,
            max_depth,
            seed,
        })
    }
}
