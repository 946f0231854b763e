use crate::domain::record::Task;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised at the data-loading boundary. Fatal to the load call that
/// produced them, never to the process.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("price source {path:?} is missing required columns: {missing:?}")]
    Schema { path: PathBuf, missing: Vec<String> },

    #[error("failed to read price source {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse price source {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Errors raised by model persistence, training and inference. All of these
/// are recoverable: the predictor converts them to an unavailable result.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no {task} model artifact for {commodity}")]
    NotFound { commodity: String, task: Task },

    #[error("artifact {path:?} is corrupt or incompatible: {reason}")]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error("insufficient data to train {task} model for {commodity}: {have} records, need {need}")]
    InsufficientData {
        commodity: String,
        task: Task,
        have: usize,
        need: usize,
    },

    #[error("failed to persist artifact {path:?}: {reason}")]
    Persist { path: PathBuf, reason: String },

    #[error("training failed for {commodity}: {reason}")]
    Training { commodity: String, reason: String },

    #[error("prediction failed: {reason}")]
    Prediction { reason: String },
}

/// Umbrella error for the forecasting core. Nothing in this taxonomy may
/// escape the predictor boundary as a panic or an unhandled fault.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_lists_missing_columns() {
        let err = DataError::Schema {
            path: PathBuf::from("data/rice.csv"),
            missing: vec!["modal_price".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("rice.csv"));
        assert!(msg.contains("modal_price"));
    }

    #[test]
    fn test_insufficient_data_formatting() {
        let err = ModelError::InsufficientData {
            commodity: "Wheat".to_string(),
            task: Task::Demand,
            have: 12,
            need: 60,
        };
        let msg = err.to_string();
        assert!(msg.contains("demand"));
        assert!(msg.contains("12"));
        assert!(msg.contains("60"));
    }
}
