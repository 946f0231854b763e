use chrono::{Datelike, NaiveDate};
use cropcast::application::predictor::Predictor;
use cropcast::config::ForecastConfig;
use cropcast::domain::record::Task;
use cropcast::infrastructure::model_store::ModelStore;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

/// Writes a per-commodity history CSV in the day-first source format, with
/// one row per day starting 2023-01-01 and prices cycling through
/// 2000..2500.
fn write_history(data_dir: &Path, commodity: &str, rows: usize) {
    let path = data_dir.join(format!("{}.csv", commodity.to_lowercase()));
    let mut file = File::create(path).unwrap();
    writeln!(file, "Date,Commodity,Modal_Price").unwrap();
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    for i in 0..rows {
        let date = start + chrono::Duration::days(i as i64);
        let price = 2000.0 + (i as f64 * 37.0) % 500.0;
        writeln!(
            file,
            "{:02}-{:02}-{},{},{}",
            date.day(),
            date.month(),
            date.year(),
            commodity,
            price
        )
        .unwrap();
    }
}

fn forecast_setup() -> (TempDir, TempDir, Predictor) {
    let data = TempDir::new().unwrap();
    let models = TempDir::new().unwrap();
    let config = ForecastConfig {
        data_dir: data.path().to_path_buf(),
        model_dir: models.path().to_path_buf(),
        n_trees: 25,
        ..ForecastConfig::default()
    };
    let predictor = Predictor::new(&config).unwrap();
    (data, models, predictor)
}

#[test]
fn rice_forecast_stays_in_observed_price_range() {
    let (data, models, predictor) = forecast_setup();
    // 2023-01-01 through 2023-03-15.
    write_history(data.path(), "Rice", 74);

    let target = NaiveDate::from_ymd_opt(2023, 3, 20).unwrap();
    let prediction = predictor.price_for_date("Rice", target).unwrap();

    // Forest output is an average of observed targets, so it must stay
    // within the training range.
    assert!(
        (2000.0..=2500.0).contains(&prediction.value),
        "prediction {} outside observed range",
        prediction.value
    );
    assert!(!prediction.degraded);

    let store = ModelStore::new(models.path()).unwrap();
    assert!(store.exists("Rice", Task::Price));
}

#[test]
fn first_predict_trains_and_artifact_is_reused() {
    let (data, models, predictor) = forecast_setup();
    write_history(data.path(), "Rice", 45);

    let target = NaiveDate::from_ymd_opt(2023, 2, 10).unwrap();
    let first = predictor.price_for_date("Rice", target).unwrap();

    let store = ModelStore::new(models.path()).unwrap();
    let trained_at = store.load("Rice", Task::Price).unwrap().trained_at;

    let second = predictor.price_for_date("Rice", target).unwrap();
    assert_eq!(first.value, second.value);
    // Second call loaded the existing artifact instead of retraining.
    assert_eq!(
        store.load("Rice", Task::Price).unwrap().trained_at,
        trained_at
    );
}

#[test]
fn unknown_commodity_is_unavailable_and_writes_nothing() {
    let (_data, models, predictor) = forecast_setup();

    assert_eq!(predictor.predict_price("Unobtainium"), None);
    assert_eq!(predictor.predict_demand("Unobtainium", None), None);
    assert_eq!(std::fs::read_dir(models.path()).unwrap().count(), 0);
}

#[test]
fn short_history_is_unavailable_and_writes_nothing() {
    let (data, models, predictor) = forecast_setup();
    write_history(data.path(), "Millet", 20);

    assert_eq!(predictor.predict_price("Millet"), None);
    let store = ModelStore::new(models.path()).unwrap();
    assert!(!store.exists("Millet", Task::Price));
}

#[test]
fn demand_needs_sixty_records() {
    let (data, _models, predictor) = forecast_setup();
    write_history(data.path(), "Maize", 59);
    assert_eq!(predictor.predict_demand("Maize", None), None);

    write_history(data.path(), "Maize", 60);
    let value = predictor
        .predict_demand("Maize", Some(NaiveDate::from_ymd_opt(2023, 3, 5).unwrap()))
        .unwrap();
    assert!(value >= 0.0);
}

#[test]
fn corrupted_artifact_heals_on_next_predict() {
    let (data, models, predictor) = forecast_setup();
    write_history(data.path(), "Wheat", 50);

    let target = NaiveDate::from_ymd_opt(2023, 2, 15).unwrap();
    predictor.price_for_date("Wheat", target).unwrap();

    let store = ModelStore::new(models.path()).unwrap();
    let path = store.artifact_path("Wheat", Task::Price);
    std::fs::write(&path, "not a model artifact").unwrap();
    assert!(store.load("Wheat", Task::Price).is_err());

    // Predict retrains rather than surfacing the corruption.
    let healed = predictor.price_for_date("Wheat", target).unwrap();
    assert!((2000.0..=2500.0).contains(&healed.value));
    assert!(store.load("Wheat", Task::Price).is_ok());
}

#[test]
fn concurrent_first_predictions_share_one_model() {
    let (data, models, predictor) = forecast_setup();
    write_history(data.path(), "Rice", 45);
    let target = NaiveDate::from_ymd_opt(2023, 2, 10).unwrap();

    let values: Vec<f64> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let predictor = &predictor;
                scope.spawn(move || predictor.price_for_date("Rice", target).unwrap().value)
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Seeded training: every caller sees the same number, regardless of who
    // trained.
    assert!(values.windows(2).all(|w| w[0] == w[1]));
    let store = ModelStore::new(models.path()).unwrap();
    assert!(store.exists("Rice", Task::Price));
}

#[test]
fn price_and_demand_artifacts_are_independent() {
    let (data, models, predictor) = forecast_setup();
    write_history(data.path(), "Rice", 70);

    let target = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
    predictor.price_for_date("Rice", target).unwrap();
    predictor.demand_for_date("Rice", target).unwrap();

    let store = ModelStore::new(models.path()).unwrap();
    assert!(store.exists("Rice", Task::Price));
    assert!(store.exists("Rice", Task::Demand));
    assert_ne!(
        store.artifact_path("Rice", Task::Price),
        store.artifact_path("Rice", Task::Demand)
    );
}
