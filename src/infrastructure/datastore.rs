use crate::domain::errors::DataError;
use crate::domain::record::PriceRecord;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Day-first date format used by the historical price sources.
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// Result of loading one price source. `dropped` counts rows excluded for an
/// unparseable date or price; exclusion is silent by contract, the count is
/// the only trace.
#[derive(Debug)]
pub struct LoadedRecords {
    pub records: Vec<PriceRecord>,
    pub dropped: usize,
}

impl LoadedRecords {
    fn empty() -> Self {
        Self {
            records: Vec::new(),
            dropped: 0,
        }
    }
}

/// Loads historical commodity prices from per-commodity CSV files. Holds no
/// row data itself; every load call re-reads the source so predictions never
/// depend on ambient process state.
#[derive(Debug, Clone)]
pub struct CsvDataStore {
    data_dir: PathBuf,
    window: usize,
}

impl CsvDataStore {
    pub fn new(data_dir: impl Into<PathBuf>, window: usize) -> Self {
        Self {
            data_dir: data_dir.into(),
            window,
        }
    }

    /// Source file for a commodity: `<data_dir>/<name lowercased>.csv`.
    pub fn source_path(&self, commodity: &str) -> PathBuf {
        self.data_dir.join(format!("{}.csv", commodity.to_lowercase()))
    }

    /// Loads and annotates the history for one commodity. A missing source
    /// file means no data, not a schema violation: the caller gets an empty
    /// set and downstream training reports insufficient data.
    pub fn load_commodity(&self, commodity: &str) -> Result<LoadedRecords, DataError> {
        let path = self.source_path(commodity);
        if !path.exists() {
            debug!("No price source for {} at {:?}", commodity, path);
            return Ok(LoadedRecords::empty());
        }
        let mut loaded = self.load_path(&path)?;
        with_moving_average(&mut loaded.records, self.window);
        Ok(loaded)
    }

    /// Parses a price source file. Requires `date`, `commodity` and
    /// `modal_price` (alias `price`) columns, matched after trimming and
    /// lowercasing the header. Returns records sorted by date ascending;
    /// moving averages are not yet annotated.
    pub fn load_path(&self, path: &Path) -> Result<LoadedRecords, DataError> {
        let file = File::open(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(BufReader::new(file));

        let headers = reader.headers().map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let columns: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_lowercase(), i))
            .collect();

        let date_idx = columns.get("date").copied();
        let commodity_idx = columns.get("commodity").copied();
        let price_idx = columns
            .get("modal_price")
            .or_else(|| columns.get("price"))
            .copied();

        let mut missing = Vec::new();
        if date_idx.is_none() {
            missing.push("date".to_string());
        }
        if commodity_idx.is_none() {
            missing.push("commodity".to_string());
        }
        if price_idx.is_none() {
            missing.push("modal_price".to_string());
        }
        if !missing.is_empty() {
            return Err(DataError::Schema {
                path: path.to_path_buf(),
                missing,
            });
        }
        let (date_idx, commodity_idx, price_idx) =
            (date_idx.unwrap(), commodity_idx.unwrap(), price_idx.unwrap());
        let min_idx = columns.get("min_price").copied();
        let max_idx = columns.get("max_price").copied();

        let mut records = Vec::new();
        let mut dropped = 0usize;
        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    debug!("Dropping unreadable row in {:?}: {}", path, e);
                    dropped += 1;
                    continue;
                }
            };
            match parse_row(&row, date_idx, commodity_idx, price_idx, min_idx, max_idx) {
                Some(rec) => records.push(rec),
                None => dropped += 1,
            }
        }

        // Stable sort keeps same-day rows in file order.
        records.sort_by_key(|r| r.date);

        if dropped > 0 {
            warn!("Dropped {} malformed rows from {:?}", dropped, path);
        }
        info!("Loaded {} records from {:?}", records.len(), path);
        Ok(LoadedRecords { records, dropped })
    }
}

fn parse_row(
    row: &csv::StringRecord,
    date_idx: usize,
    commodity_idx: usize,
    price_idx: usize,
    min_idx: Option<usize>,
    max_idx: Option<usize>,
) -> Option<PriceRecord> {
    let date = NaiveDate::parse_from_str(row.get(date_idx)?.trim(), DATE_FORMAT).ok()?;
    let commodity = row.get(commodity_idx)?.trim();
    if commodity.is_empty() {
        return None;
    }
    let modal_price: f64 = row.get(price_idx)?.trim().parse().ok()?;
    if !modal_price.is_finite() || modal_price < 0.0 {
        return None;
    }
    let parse_opt = |idx: Option<usize>| {
        idx.and_then(|i| row.get(i))
            .and_then(|s| s.trim().parse::<f64>().ok())
    };
    let mut rec = PriceRecord::new(date, commodity, modal_price);
    rec.min_price = parse_opt(min_idx);
    rec.max_price = parse_opt(max_idx);
    Some(rec)
}

/// Annotates each record with the trailing mean of its commodity's prices
/// over up to `window` records, current record included. Commodity groups
/// roll independently; the first record of a group averages only itself.
/// Records must already be sorted by date ascending.
pub fn with_moving_average(records: &mut [PriceRecord], window: usize) {
    let window = window.max(1);
    let mut rolling: HashMap<String, (VecDeque<f64>, f64)> = HashMap::new();
    for rec in records.iter_mut() {
        let (tail, sum) = rolling
            .entry(rec.commodity.clone())
            .or_insert_with(|| (VecDeque::with_capacity(window + 1), 0.0));
        tail.push_back(rec.modal_price);
        *sum += rec.modal_price;
        if tail.len() > window {
            if let Some(old) = tail.pop_front() {
                *sum -= old;
            }
        }
        rec.price_moving_avg = *sum / tail.len() as f64;
    }
}
