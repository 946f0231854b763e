use crate::config::ForecastConfig;
use crate::domain::errors::{ForecastError, ModelError};
use crate::domain::features;
use crate::domain::record::{PriceRecord, Task};
use crate::infrastructure::model_store::{ForestModel, ModelArtifact, ModelStore};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::sync::Arc;
use tracing::{info, warn};

/// Fits one random forest per (commodity, task) and persists it through the
/// model store. Training is seeded, so two runs over the same records produce
/// models with identical predictions.
pub struct Trainer {
    store: Arc<ModelStore>,
    n_trees: usize,
    max_depth: Option<u16>,
    seed: u64,
    min_price_samples: usize,
    min_demand_samples: usize,
}

impl Trainer {
    pub fn new(store: Arc<ModelStore>, config: &ForecastConfig) -> Self {
        Self {
            store,
            n_trees: config.n_trees,
            max_depth: config.max_depth,
            seed: config.seed,
            min_price_samples: config.min_price_samples,
            min_demand_samples: config.min_demand_samples,
        }
    }

    /// Trains and saves the price model for one commodity. Requires at least
    /// `min_price_samples` qualifying records; below that nothing is written.
    pub fn train_price_model(
        &self,
        commodity: &str,
        records: &[PriceRecord],
    ) -> Result<ModelArtifact, ForecastError> {
        self.train(commodity, Task::Price, records)
    }

    /// Trains and saves the demand model. The sample floor is higher (two
    /// months of records) because the 7-record price change eats the head of
    /// the series.
    pub fn train_demand_model(
        &self,
        commodity: &str,
        records: &[PriceRecord],
    ) -> Result<ModelArtifact, ForecastError> {
        self.train(commodity, Task::Demand, records)
    }

    pub fn train(
        &self,
        commodity: &str,
        task: Task,
        records: &[PriceRecord],
    ) -> Result<ModelArtifact, ForecastError> {
        // Exact, case-sensitive match against the record's commodity field.
        let rows: Vec<PriceRecord> = records
            .iter()
            .filter(|r| r.commodity == commodity)
            .cloned()
            .collect();

        let need = match task {
            Task::Price => self.min_price_samples,
            Task::Demand => self.min_demand_samples,
        };
        if rows.len() < need {
            warn!(
                "Insufficient data for {} {} model: {} records, need {}",
                commodity,
                task,
                rows.len(),
                need
            );
            return Err(ModelError::InsufficientData {
                commodity: commodity.to_string(),
                task,
                have: rows.len(),
                need,
            }
            .into());
        }

        info!("Training {} model for {} ({} records)", task, commodity, rows.len());
        let (x, y) = match task {
            Task::Price => features::price_training_matrix(&rows),
            Task::Demand => features::demand_training_matrix(&rows),
        };
        let model = self.fit(commodity, x, y)?;
        let artifact = ModelArtifact::new(commodity, task, model);
        self.store.save(&artifact)?;
        Ok(artifact)
    }

    /// Self-healing path: returns the stored artifact if it loads, otherwise
    /// retrains from the given records and overwrites it. Invoked lazily when
    /// a predict call hits a corrupt artifact, or from the maintenance CLI.
    pub fn recover(
        &self,
        commodity: &str,
        task: Task,
        records: &[PriceRecord],
    ) -> Result<ModelArtifact, ForecastError> {
        match self.store.load(commodity, task) {
            Ok(artifact) => Ok(artifact),
            Err(ModelError::NotFound { .. }) => {
                info!("No {} artifact for {}, training", task, commodity);
                self.train(commodity, task, records)
            }
            Err(ModelError::CorruptArtifact { path, reason }) => {
                warn!(
                    "Artifact {:?} unusable ({}), retraining {} model for {}",
                    path, reason, task, commodity
                );
                self.train(commodity, task, records)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn fit(
        &self,
        commodity: &str,
        x: Vec<Vec<f64>>,
        y: Vec<f64>,
    ) -> Result<ForestModel, ModelError> {
        let matrix = DenseMatrix::from_2d_vec(&x).map_err(|e| ModelError::Training {
            commodity: commodity.to_string(),
            reason: format!("matrix creation failed: {}", e),
        })?;
        let mut params = RandomForestRegressorParameters::default()
            .with_n_trees(self.n_trees)
            .with_seed(self.seed);
        if let Some(depth) = self.max_depth {
            params = params.with_max_depth(depth);
        }
        RandomForestRegressor::fit(&matrix, &y, params).map_err(|e| ModelError::Training {
            commodity: commodity.to_string(),
            reason: e.to_string(),
        })
    }
}
