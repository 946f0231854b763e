use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prediction target. Price and demand share the same pipeline shape but
/// train on different feature sets and sample thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Price,
    Demand,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Price => "price",
            Task::Demand => "demand",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Task {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "price" => Ok(Task::Price),
            "demand" => Ok(Task::Demand),
            _ => anyhow::bail!("Invalid task: {}. Must be 'price' or 'demand'", s),
        }
    }
}

/// One observed market report for a commodity. Immutable once loaded for a
/// training run; `price_moving_avg` is the only derived field and is filled
/// in by `with_moving_average` after loading.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub commodity: String,
    /// Modal (most frequent) transaction price. Always >= 0.
    pub modal_price: f64,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Trailing mean over up to the last 30 records of the same commodity,
    /// current record included. Equals `modal_price` until annotated.
    pub price_moving_avg: f64,
}

impl PriceRecord {
    pub fn new(date: NaiveDate, commodity: impl Into<String>, modal_price: f64) -> Self {
        Self {
            date,
            commodity: commodity.into(),
            modal_price,
            min_price: None,
            max_price: None,
            price_moving_avg: modal_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_round_trips_through_str() {
        assert_eq!("price".parse::<Task>().unwrap(), Task::Price);
        assert_eq!("Demand".parse::<Task>().unwrap(), Task::Demand);
        assert!("volume".parse::<Task>().is_err());
        assert_eq!(Task::Price.to_string(), "price");
    }

    #[test]
    fn test_new_record_moving_avg_defaults_to_own_price() {
        let rec = PriceRecord::new(
            NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
            "Rice",
            2100.0,
        );
        assert_eq!(rec.price_moving_avg, 2100.0);
        assert!(rec.min_price.is_none());
    }
}
