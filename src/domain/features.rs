use crate::domain::record::{PriceRecord, Task};
use chrono::{Datelike, NaiveDate};

/// Feature order for price models. Training and inference must agree on this
/// exactly; artifacts embed the list and refuse to load on a mismatch.
pub const PRICE_FEATURES: [&str; 4] = ["year", "month", "day", "price_moving_avg"];

/// Feature order for demand models.
pub const DEMAND_FEATURES: [&str; 5] = [
    "year",
    "month",
    "price_moving_avg",
    "price_change",
    "day_of_year",
];

/// Declared feature schema for a task; embedded in artifacts and checked on
/// load.
pub fn feature_names(task: Task) -> &'static [&'static str] {
    match task {
        Task::Price => &PRICE_FEATURES,
        Task::Demand => &DEMAND_FEATURES,
    }
}

/// Query-time moving average looks at up to this many records strictly
/// before the target date.
pub const QUERY_WINDOW: usize = 30;

/// Lag (in records) for the fractional price change feature.
pub const CHANGE_LAG: usize = 7;

/// A single inference input. `degraded` flags that no prior records existed
/// for the moving average, which was therefore defaulted to zero. Callers may
/// still predict, but accuracy is reduced.
#[derive(Debug, Clone)]
pub struct QueryVector {
    pub features: Vec<f64>,
    pub degraded: bool,
}

/// Builds the price training matrix. One row per record, in input order.
/// Records are expected to be a single commodity's series, date ascending,
/// annotated with moving averages.
pub fn price_training_matrix(records: &[PriceRecord]) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut x = Vec::with_capacity(records.len());
    let mut y = Vec::with_capacity(records.len());
    for rec in records {
        x.push(vec![
            rec.date.year() as f64,
            rec.date.month() as f64,
            rec.date.day() as f64,
            rec.price_moving_avg,
        ]);
        y.push(rec.modal_price);
    }
    (x, y)
}

/// Builds the demand training matrix. Rows where the 7-record price change is
/// undefined (the first 7 records, or a zero lag price) are excluded.
pub fn demand_training_matrix(records: &[PriceRecord]) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut x = Vec::new();
    let mut y = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let Some(change) = lagged_change(records, i) else {
            continue;
        };
        x.push(vec![
            rec.date.year() as f64,
            rec.date.month() as f64,
            rec.price_moving_avg,
            change,
            rec.date.ordinal() as f64,
        ]);
        y.push(rec.modal_price);
    }
    (x, y)
}

/// Query vector for a price prediction at `target`. The moving average is the
/// mean of the most recent <= 30 records strictly before the target date, so
/// a same-day record never leaks into its own prediction.
pub fn price_query_vector(records: &[PriceRecord], target: NaiveDate) -> QueryVector {
    let (avg, degraded) = prior_moving_avg(records, target);
    QueryVector {
        features: vec![
            target.year() as f64,
            target.month() as f64,
            target.day() as f64,
            avg,
        ],
        degraded,
    }
}

/// Query vector for a demand prediction at `target`. The price change defaults
/// to zero when the prior series is shorter than the lag.
pub fn demand_query_vector(records: &[PriceRecord], target: NaiveDate) -> QueryVector {
    let (avg, degraded) = prior_moving_avg(records, target);
    let prior_len = records.partition_point(|r| r.date < target);
    let change = if prior_len > CHANGE_LAG {
        lagged_change(&records[..prior_len], prior_len - 1).unwrap_or(0.0)
    } else {
        0.0
    };
    QueryVector {
        features: vec![
            target.year() as f64,
            target.month() as f64,
            avg,
            change,
            target.ordinal() as f64,
        ],
        degraded,
    }
}

/// Fractional change of `records[i]` against the record `CHANGE_LAG` places
/// earlier. `None` for the head of the series or a non-finite result.
fn lagged_change(records: &[PriceRecord], i: usize) -> Option<f64> {
    if i < CHANGE_LAG {
        return None;
    }
    let base = records[i - CHANGE_LAG].modal_price;
    let change = (records[i].modal_price - base) / base;
    change.is_finite().then_some(change)
}

/// Mean modal price of the most recent <= QUERY_WINDOW records strictly before
/// `target`. Returns (0.0, true) when no qualifying records exist.
fn prior_moving_avg(records: &[PriceRecord], target: NaiveDate) -> (f64, bool) {
    let prior_len = records.partition_point(|r| r.date < target);
    if prior_len == 0 {
        return (0.0, true);
    }
    let start = prior_len.saturating_sub(QUERY_WINDOW);
    let window = &records[start..prior_len];
    let sum: f64 = window.iter().map(|r| r.modal_price).sum();
    (sum / window.len() as f64, false)
}
