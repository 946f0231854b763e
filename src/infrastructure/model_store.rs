use crate::domain::errors::ModelError;
use crate::domain::features;
use crate::domain::record::Task;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::RandomForestRegressor;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

pub type ForestModel = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Bumped whenever the artifact envelope or feature computation changes in a
/// way that makes older files unusable. Older artifacts load as corrupt and
/// get retrained.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

/// A trained model bound to one (commodity, task) pair, together with the
/// schema it was trained against. Read-only once created; retraining writes
/// a whole new artifact.
#[derive(Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub commodity: String,
    pub task: Task,
    pub feature_names: Vec<String>,
    pub trained_at: DateTime<Utc>,
    pub model: ForestModel,
}

impl ModelArtifact {
    pub fn new(commodity: impl Into<String>, task: Task, model: ForestModel) -> Self {
        Self {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            commodity: commodity.into(),
            task,
            feature_names: features::feature_names(task)
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trained_at: Utc::now(),
            model,
        }
    }

    /// Runs the model on a single feature vector.
    pub fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        let matrix =
            DenseMatrix::from_2d_vec(&vec![features.to_vec()]).map_err(|e| {
                ModelError::Prediction {
                    reason: format!("matrix creation failed: {}", e),
                }
            })?;
        let predictions = self
            .model
            .predict(&matrix)
            .map_err(|e| ModelError::Prediction {
                reason: format!("inference failed: {}", e),
            })?;
        predictions
            .first()
            .copied()
            .ok_or_else(|| ModelError::Prediction {
                reason: "model returned no prediction".to_string(),
            })
    }
}

/// Owns on-disk artifact storage. One JSON file per (commodity, task),
/// written atomically via a temp file and rename so readers never observe a
/// partial artifact.
#[derive(Debug, Clone)]
pub struct ModelStore {
    model_dir: PathBuf,
}

impl ModelStore {
    pub fn new(model_dir: impl Into<PathBuf>) -> Result<Self> {
        let model_dir = model_dir.into();
        fs::create_dir_all(&model_dir)
            .with_context(|| format!("Failed to create model directory {:?}", model_dir))?;
        Ok(Self { model_dir })
    }

    /// Stable artifact key: the commodity name is used verbatim
    /// (case-sensitive), matching the training-time identifier.
    pub fn artifact_path(&self, commodity: &str, task: Task) -> PathBuf {
        self.model_dir
            .join(format!("{}_{}_model.json", commodity, task))
    }

    pub fn exists(&self, commodity: &str, task: Task) -> bool {
        self.artifact_path(commodity, task).exists()
    }

    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf, ModelError> {
        let path = self.artifact_path(&artifact.commodity, artifact.task);
        let body = serde_json::to_string(artifact).map_err(|e| ModelError::Persist {
            path: path.clone(),
            reason: format!("serialization failed: {}", e),
        })?;

        // Atomic write: temp file then rename.
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, body).map_err(|e| ModelError::Persist {
            path: temp_path.clone(),
            reason: e.to_string(),
        })?;
        fs::rename(&temp_path, &path).map_err(|e| ModelError::Persist {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        info!(
            "Saved {} model for {} to {:?}",
            artifact.task, artifact.commodity, path
        );
        Ok(path)
    }

    /// Loads an artifact, distinguishing "never trained" (`NotFound`) from
    /// "present but unusable" (`CorruptArtifact`). The latter is recoverable
    /// by retraining.
    pub fn load(&self, commodity: &str, task: Task) -> Result<ModelArtifact, ModelError> {
        let path = self.artifact_path(commodity, task);
        if !path.exists() {
            return Err(ModelError::NotFound {
                commodity: commodity.to_string(),
                task,
            });
        }

        let body = fs::read_to_string(&path).map_err(|e| ModelError::CorruptArtifact {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let artifact: ModelArtifact =
            serde_json::from_str(&body).map_err(|e| ModelError::CorruptArtifact {
                path: path.clone(),
                reason: format!("deserialization failed: {}", e),
            })?;

        if artifact.schema_version != ARTIFACT_SCHEMA_VERSION {
            return Err(ModelError::CorruptArtifact {
                path,
                reason: format!(
                    "schema version {} != {}",
                    artifact.schema_version, ARTIFACT_SCHEMA_VERSION
                ),
            });
        }
        let expected = features::feature_names(task);
        if artifact.feature_names != expected {
            return Err(ModelError::CorruptArtifact {
                path,
                reason: format!(
                    "feature schema mismatch: {:?} != {:?}",
                    artifact.feature_names, expected
                ),
            });
        }

        debug!("Loaded {} model for {} from {:?}", task, commodity, path);
        Ok(artifact)
    }
}
