use crate::application::trainer::Trainer;
use crate::config::ForecastConfig;
use crate::domain::errors::{ForecastError, ModelError};
use crate::domain::features;
use crate::domain::record::{PriceRecord, Task};
use crate::infrastructure::datastore::CsvDataStore;
use crate::infrastructure::model_store::{ModelArtifact, ModelStore};
use anyhow::Result;
use chrono::{Local, NaiveDate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// A successful forecast. `degraded` means the query had no prior records for
/// its moving average; the number is still usable but less trustworthy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub value: f64,
    pub degraded: bool,
}

/// Entry point for the web layer. Loads (or lazily trains) the model for a
/// commodity and turns a query date into a rounded scalar forecast. Every
/// failure in the taxonomy collapses to `None` here; callers that need to
/// distinguish causes use the `*_for_date` variants.
pub struct Predictor {
    data: CsvDataStore,
    store: Arc<ModelStore>,
    trainer: Trainer,
    // One lock per (commodity, task) so concurrent first-callers share a
    // single training run. Commodities never contend with each other.
    train_locks: Mutex<HashMap<(String, Task), Arc<Mutex<()>>>>,
}

impl Predictor {
    pub fn new(config: &ForecastConfig) -> Result<Self> {
        let store = Arc::new(ModelStore::new(&config.model_dir)?);
        Ok(Self {
            data: CsvDataStore::new(&config.data_dir, config.moving_avg_window),
            trainer: Trainer::new(store.clone(), config),
            store,
            train_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Price forecast for today. `None` means unavailable, which the web
    /// layer renders as "N/A".
    pub fn predict_price(&self, commodity: &str) -> Option<f64> {
        self.collapse(commodity, Task::Price, self.price_for_date(commodity, today()))
    }

    /// Demand forecast, optionally for an explicit date.
    pub fn predict_demand(&self, commodity: &str, target_date: Option<NaiveDate>) -> Option<f64> {
        let date = target_date.unwrap_or_else(today);
        self.collapse(commodity, Task::Demand, self.demand_for_date(commodity, date))
    }

    /// Checked price forecast for an explicit date; lets callers (and tests)
    /// pin the calendar features and observe the failure cause.
    pub fn price_for_date(
        &self,
        commodity: &str,
        date: NaiveDate,
    ) -> Result<Prediction, ForecastError> {
        let records = self.commodity_history(commodity)?;
        let artifact = self.ensure_model(commodity, Task::Price, &records)?;
        let query = features::price_query_vector(&records, date);
        let raw = artifact.predict(&query.features)?;
        info!(
            "Predicted {} price for {}: {:.2}",
            commodity, date, raw
        );
        Ok(Prediction {
            value: round2(raw),
            degraded: query.degraded,
        })
    }

    /// Checked demand forecast. Demand cannot be negative; the raw output is
    /// floored at zero.
    pub fn demand_for_date(
        &self,
        commodity: &str,
        date: NaiveDate,
    ) -> Result<Prediction, ForecastError> {
        let records = self.commodity_history(commodity)?;
        let artifact = self.ensure_model(commodity, Task::Demand, &records)?;
        let query = features::demand_query_vector(&records, date);
        let raw = artifact.predict(&query.features)?;
        Ok(Prediction {
            value: round2(raw.max(0.0)),
            degraded: query.degraded,
        })
    }

    /// One commodity's series, date ascending and annotated. The source file
    /// may interleave other commodities; query features must only ever see
    /// the requested one.
    fn commodity_history(&self, commodity: &str) -> Result<Vec<PriceRecord>, ForecastError> {
        let loaded = self.data.load_commodity(commodity)?;
        Ok(loaded
            .records
            .into_iter()
            .filter(|r| r.commodity == commodity)
            .collect())
    }

    /// Loads the artifact, training it on demand. Missing and corrupt
    /// artifacts both funnel into the trainer's recover path under the
    /// per-key lock; the load is retried inside the lock so callers queued
    /// behind an in-flight training run reuse its result.
    fn ensure_model(
        &self,
        commodity: &str,
        task: Task,
        records: &[PriceRecord],
    ) -> Result<ModelArtifact, ForecastError> {
        match self.store.load(commodity, task) {
            Ok(artifact) => Ok(artifact),
            Err(ModelError::NotFound { .. }) | Err(ModelError::CorruptArtifact { .. }) => {
                let lock = self.lock_for(commodity, task);
                let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
                self.trainer.recover(commodity, task, records)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn lock_for(&self, commodity: &str, task: Task) -> Arc<Mutex<()>> {
        let mut locks = self.train_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry((commodity.to_string(), task))
            .or_default()
            .clone()
    }

    fn collapse(
        &self,
        commodity: &str,
        task: Task,
        result: Result<Prediction, ForecastError>,
    ) -> Option<f64> {
        match result {
            Ok(prediction) => {
                if prediction.degraded {
                    warn!(
                        "{} {} forecast computed without prior history; accuracy degraded",
                        commodity, task
                    );
                }
                Some(prediction.value)
            }
            Err(e) => {
                warn!("{} {} forecast unavailable: {}", commodity, task, e);
                None
            }
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_history(dir: &std::path::Path, commodity: &str, n: usize) {
        let path = dir.join(format!("{}.csv", commodity.to_lowercase()));
        let mut file = File::create(path).unwrap();
        writeln!(file, "Date,Commodity,Modal_Price").unwrap();
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        for i in 0..n {
            let date = start + chrono::Duration::days(i as i64);
            writeln!(
                file,
                "{:02}-{:02}-{},{},{}",
                date.day(),
                date.month(),
                date.year(),
                commodity,
                2000.0 + (i as f64 * 11.0) % 500.0
            )
            .unwrap();
        }
    }

    fn predictor(data: &TempDir, models: &TempDir) -> Predictor {
        let config = ForecastConfig {
            data_dir: data.path().to_path_buf(),
            model_dir: models.path().to_path_buf(),
            n_trees: 20,
            ..ForecastConfig::default()
        };
        Predictor::new(&config).unwrap()
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(2134.5678), 2134.57);
        assert_eq!(round2(2134.0), 2134.0);
    }

    #[test]
    fn test_pinned_date_prediction_is_idempotent() {
        let data = TempDir::new().unwrap();
        let models = TempDir::new().unwrap();
        write_history(data.path(), "Rice", 40);
        let predictor = predictor(&data, &models);

        let date = NaiveDate::from_ymd_opt(2023, 2, 20).unwrap();
        let first = predictor.price_for_date("Rice", date).unwrap();
        let second = predictor.price_for_date("Rice", date).unwrap();
        assert_eq!(first.value, second.value);
        assert!(!first.degraded);
    }

    #[test]
    fn test_no_history_is_unavailable_without_side_effects() {
        let data = TempDir::new().unwrap();
        let models = TempDir::new().unwrap();
        let predictor = predictor(&data, &models);

        assert_eq!(predictor.predict_price("Unobtainium"), None);
        assert!(!predictor.store.exists("Unobtainium", Task::Price));
        assert_eq!(
            std::fs::read_dir(models.path()).unwrap().count(),
            0,
            "no artifact may be written for an untrained commodity"
        );
    }

    #[test]
    fn test_demand_is_floored_at_zero() {
        assert_eq!(round2((-12.3f64).max(0.0)), 0.0);
    }

    #[test]
    fn test_degraded_query_still_predicts() {
        let data = TempDir::new().unwrap();
        let models = TempDir::new().unwrap();
        write_history(data.path(), "Rice", 40);
        let predictor = predictor(&data, &models);

        // Target before all history: no prior records for the moving average.
        let date = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        let prediction = predictor.price_for_date("Rice", date).unwrap();
        assert!(prediction.degraded);
        assert!(prediction.value.is_finite());
    }
}
