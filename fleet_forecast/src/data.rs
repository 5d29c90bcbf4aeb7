//! Fleet utilization datasets: loading, cleaning and temporal splitting

use crate::error::{ForecastError, Result};
use crate::utils::{from_epoch_millis, infer_frequency, parse_timestamp, to_epoch_millis};
use chrono::{DateTime, Duration, NaiveDateTime};
use polars::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Canonical name of the timestamp column
pub const TIMESTAMP_COLUMN: &str = "ds";
/// Canonical name of the target column
pub const TARGET_COLUMN: &str = "utilization_rate";

/// Header names accepted for the timestamp column, in priority order
pub const DATE_CANDIDATES: [&str; 5] = ["ds", "date", "datetime", "timestamp", "day"];
/// Header names accepted for the target column, in priority order
pub const TARGET_CANDIDATES: [&str; 3] = ["utilization_rate", "utilization", "utilisation_rate"];

/// Packaged demo dataset: two years of daily fleet statistics
pub const SAMPLE_CSV: &str = include_str!("../data/fleet_utilization_sample.csv");

/// Where a dataset comes from
#[derive(Debug, Clone)]
pub enum DatasetSource {
    /// Delimited file on disk
    Path(PathBuf),
    /// Delimited text already in memory (e.g. an upload)
    Bytes(Vec<u8>),
    /// The packaged sample
    Sample,
}

impl From<PathBuf> for DatasetSource {
    fn from(path: PathBuf) -> Self {
        DatasetSource::Path(path)
    }
}

impl From<&Path> for DatasetSource {
    fn from(path: &Path) -> Self {
        DatasetSource::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for DatasetSource {
    fn from(bytes: Vec<u8>) -> Self {
        DatasetSource::Bytes(bytes)
    }
}

/// Load and clean a dataset from any supported source
pub fn load_dataset(source: impl Into<DatasetSource>) -> Result<Dataset> {
    match source.into() {
        DatasetSource::Path(path) => DataLoader::from_csv(path),
        DatasetSource::Bytes(bytes) => DataLoader::from_bytes(&bytes),
        DatasetSource::Sample => DataLoader::sample(),
    }
}

/// Rows dropped while cleaning a source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Rows whose timestamp could not be parsed
    pub invalid_timestamps: usize,
    /// Earlier rows superseded by a later row with the same timestamp
    pub duplicate_timestamps: usize,
    /// Rows with a missing or non-numeric value in any non-timestamp column
    pub non_numeric_rows: usize,
}

impl LoadReport {
    pub fn total_dropped(&self) -> usize {
        self.invalid_timestamps + self.duplicate_timestamps + self.non_numeric_rows
    }
}

/// Cleaned, chronologically ordered utilization history.
///
/// Timestamps are timezone-naive (UTC), strictly increasing and unique; the target has
/// no missing values. Instances are never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    timestamps: Vec<NaiveDateTime>,
    target: Vec<f64>,
    /// Auxiliary numeric columns, in source order
    covariates: Vec<(String, Vec<f64>)>,
    frequency: Option<Duration>,
    report: LoadReport,
}

/// One parsed source row before cleaning
struct RawRow {
    timestamp: Option<NaiveDateTime>,
    /// Target first, then covariates
    values: Vec<Option<f64>>,
}

/// Data loader for fleet utilization tables
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load a dataset from a delimited file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Dataset> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Load a dataset from an in-memory upload
    pub fn from_bytes(bytes: &[u8]) -> Result<Dataset> {
        Self::from_reader(bytes)
    }

    /// Load the packaged sample dataset
    pub fn sample() -> Result<Dataset> {
        Self::from_bytes(SAMPLE_CSV.as_bytes())
    }

    /// Load a dataset from any reader producing delimited text with a header row
    pub fn from_reader<R: Read>(reader: R) -> Result<Dataset> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(normalize_header)
            .collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ForecastError::EmptyDataset(
                "source has no header row".to_string(),
            ));
        }

        let (date_idx, target_idx) = Self::detect_columns(&headers)?;
        let value_indices = value_column_order(headers.len(), date_idx, target_idx);

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(RawRow {
                timestamp: record.get(date_idx).and_then(parse_timestamp),
                values: value_indices
                    .iter()
                    .map(|&i| record.get(i).and_then(parse_number))
                    .collect(),
            });
        }

        let names = value_indices.iter().map(|&i| headers[i].clone()).collect();
        Self::clean(rows, names)
    }

    /// Apply the loader's cleaning rules to an in-memory polars frame.
    ///
    /// Temporal columns are read from their physical representation so that
    /// timezone-aware values end up as naive UTC; everything else goes through
    /// the same permissive parsing as delimited text.
    pub fn from_dataframe(df: &DataFrame) -> Result<Dataset> {
        let columns = df.get_columns();
        if columns.is_empty() {
            return Err(ForecastError::EmptyDataset(
                "data frame has no columns".to_string(),
            ));
        }

        let headers: Vec<String> = columns.iter().map(|s| normalize_header(s.name())).collect();
        let (date_idx, target_idx) = Self::detect_columns(&headers)?;
        let value_indices = value_column_order(headers.len(), date_idx, target_idx);

        let timestamps = series_timestamps(&columns[date_idx])?;
        let values = value_indices
            .iter()
            .map(|&i| series_numbers(&columns[i]))
            .collect::<Result<Vec<_>>>()?;

        let rows = timestamps
            .into_iter()
            .enumerate()
            .map(|(row, timestamp)| RawRow {
                timestamp,
                values: values.iter().map(|column| column[row]).collect(),
            })
            .collect();

        let names = value_indices.iter().map(|&i| headers[i].clone()).collect();
        Self::clean(rows, names)
    }

    /// Resolve the date and target columns among normalised headers
    fn detect_columns(headers: &[String]) -> Result<(usize, usize)> {
        let find = |candidates: &[&str]| {
            candidates
                .iter()
                .find_map(|candidate| headers.iter().position(|h| h == candidate))
        };

        let date_idx = find(&DATE_CANDIDATES[..]).ok_or_else(|| ForecastError::MissingColumn {
            kind: "date",
            candidates: DATE_CANDIDATES.iter().map(|c| c.to_string()).collect(),
            found: headers.to_vec(),
        })?;
        let target_idx = find(&TARGET_CANDIDATES[..]).ok_or_else(|| ForecastError::MissingColumn {
            kind: "target",
            candidates: TARGET_CANDIDATES.iter().map(|c| c.to_string()).collect(),
            found: headers.to_vec(),
        })?;

        debug!(
            date = %headers[date_idx],
            target = %headers[target_idx],
            "Resolved dataset columns"
        );
        Ok((date_idx, target_idx))
    }

    /// Drop invalid rows, deduplicate, sort and infer the cadence.
    ///
    /// `names[0]` is the source name of the target column.
    fn clean(rows: Vec<RawRow>, names: Vec<String>) -> Result<Dataset> {
        let mut report = LoadReport::default();
        let total = rows.len();

        let rows: Vec<(NaiveDateTime, Vec<Option<f64>>)> = rows
            .into_iter()
            .filter_map(|row| row.timestamp.map(|ts| (ts, row.values)))
            .collect();
        report.invalid_timestamps = total - rows.len();
        if report.invalid_timestamps > 0 {
            warn!(
                dropped = report.invalid_timestamps,
                "Dropped rows with unparseable timestamps"
            );
        }

        // Later rows overwrite earlier ones
        let mut last_seen: HashMap<NaiveDateTime, usize> = HashMap::with_capacity(rows.len());
        for (i, (ts, _)) in rows.iter().enumerate() {
            last_seen.insert(*ts, i);
        }
        let before = rows.len();
        let rows: Vec<_> = rows
            .into_iter()
            .enumerate()
            .filter(|(i, (ts, _))| last_seen.get(ts) == Some(i))
            .map(|(_, row)| row)
            .collect();
        report.duplicate_timestamps = before - rows.len();
        if report.duplicate_timestamps > 0 {
            warn!(
                dropped = report.duplicate_timestamps,
                "Dropped duplicate timestamps, keeping the last occurrence"
            );
        }

        let before = rows.len();
        let mut rows: Vec<(NaiveDateTime, Vec<f64>)> = rows
            .into_iter()
            .filter_map(|(ts, values)| {
                values
                    .into_iter()
                    .collect::<Option<Vec<f64>>>()
                    .map(|v| (ts, v))
            })
            .collect();
        report.non_numeric_rows = before - rows.len();
        if report.non_numeric_rows > 0 {
            warn!(
                dropped = report.non_numeric_rows,
                "Dropped rows with missing or non-numeric values"
            );
        }

        if rows.is_empty() {
            return Err(ForecastError::EmptyDataset(format!(
                "no valid rows remain out of {}",
                total
            )));
        }

        rows.sort_by_key(|(ts, _)| *ts);

        let timestamps: Vec<NaiveDateTime> = rows.iter().map(|(ts, _)| *ts).collect();
        let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for (_, values) in rows {
            for (column, value) in columns.iter_mut().zip(values) {
                column.push(value);
            }
        }
        let mut columns = columns.into_iter();
        let target = columns.next().unwrap_or_default();
        let covariates = names.into_iter().skip(1).zip(columns).collect();
        let frequency = infer_frequency(&timestamps);

        debug!(
            rows = timestamps.len(),
            ?frequency,
            dropped = report.total_dropped(),
            "Loaded dataset"
        );

        Ok(Dataset {
            timestamps,
            target,
            covariates,
            frequency,
            report,
        })
    }
}

fn normalize_header(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Source column indices of the target followed by every other non-date column
fn value_column_order(width: usize, date_idx: usize, target_idx: usize) -> Vec<usize> {
    std::iter::once(target_idx)
        .chain((0..width).filter(|&i| i != date_idx && i != target_idx))
        .collect()
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn from_physical(raw: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let per_second: i64 = match unit {
        TimeUnit::Nanoseconds => 1_000_000_000,
        TimeUnit::Microseconds => 1_000_000,
        TimeUnit::Milliseconds => 1_000,
    };
    let secs = raw.div_euclid(per_second);
    let nanos = raw.rem_euclid(per_second) * (1_000_000_000 / per_second);
    DateTime::from_timestamp(secs, nanos as u32).map(|dt| dt.naive_utc())
}

/// Read a polars column as optional naive UTC timestamps
pub(crate) fn series_timestamps(series: &Series) -> Result<Vec<Option<NaiveDateTime>>> {
    match series.dtype() {
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let physical = series.cast(&DataType::Int64)?;
            let values = physical.i64()?;
            Ok(values
                .into_iter()
                .map(|v| v.and_then(|raw| from_physical(raw, unit)))
                .collect())
        }
        DataType::Date => {
            let physical = series.cast(&DataType::Int32)?;
            let values = physical.i32()?;
            Ok(values
                .into_iter()
                .map(|v| v.and_then(|days| from_epoch_millis(days as i64 * 86_400_000)))
                .collect())
        }
        _ => {
            let text = series.cast(&DataType::Utf8)?;
            let values = text.utf8()?;
            Ok(values
                .into_iter()
                .map(|v| v.and_then(parse_timestamp))
                .collect())
        }
    }
}

fn series_numbers(series: &Series) -> Result<Vec<Option<f64>>> {
    let cast = match series.dtype() {
        DataType::Utf8 => {
            let values = series.utf8()?;
            return Ok(values
                .into_iter()
                .map(|v| v.and_then(parse_number))
                .collect());
        }
        _ => series.cast(&DataType::Float64)?,
    };
    let values = cast.f64()?;
    Ok(values
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

impl Dataset {
    /// Build a dataset from parallel timestamp/value vectors.
    ///
    /// The same cleaning rules as the loader apply: non-finite values are dropped,
    /// duplicate timestamps keep the last value, rows are sorted.
    pub fn new(timestamps: Vec<NaiveDateTime>, values: Vec<f64>) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(ForecastError::ValidationError(format!(
                "Timestamps length ({}) doesn't match values length ({})",
                timestamps.len(),
                values.len()
            )));
        }

        let rows = timestamps
            .into_iter()
            .zip(values)
            .map(|(ts, v)| RawRow {
                timestamp: Some(ts),
                values: vec![Some(v).filter(|x| x.is_finite())],
            })
            .collect();
        DataLoader::clean(rows, vec![TARGET_COLUMN.to_string()])
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Timestamps in ascending order
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    /// Utilization rate per timestamp
    pub fn target(&self) -> &[f64] {
        &self.target
    }

    /// Look up a numeric column by canonical or (lower-cased) source name
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let name = normalize_header(name);
        if name == TARGET_COLUMN {
            return Some(&self.target);
        }
        self.covariates
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Names of the auxiliary numeric columns
    pub fn covariate_names(&self) -> Vec<&str> {
        self.covariates.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Constant sampling interval, when one explains every gap
    pub fn frequency(&self) -> Option<Duration> {
        self.frequency
    }

    /// Rows dropped while loading
    pub fn load_report(&self) -> LoadReport {
        self.report
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.last().copied()
    }

    /// Get a slice of the data from start to end index
    pub fn slice(&self, start: usize, end: Option<usize>) -> Result<Self> {
        let end = end.unwrap_or(self.len());
        if start > end || end > self.len() {
            return Err(ForecastError::ValidationError(format!(
                "Slice {}..{} out of range for {} rows",
                start,
                end,
                self.len()
            )));
        }

        Ok(Dataset {
            timestamps: self.timestamps[start..end].to_vec(),
            target: self.target[start..end].to_vec(),
            covariates: self
                .covariates
                .iter()
                .map(|(name, values)| (name.clone(), values[start..end].to_vec()))
                .collect(),
            frequency: self.frequency,
            report: self.report,
        })
    }

    /// The trailing `n` rows (all rows if `n` exceeds the length)
    pub fn tail(&self, n: usize) -> Result<Self> {
        self.slice(self.len().saturating_sub(n), None)
    }

    /// Deterministic fingerprint of the timestamps and every column's values
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.timestamps.hash(&mut hasher);
        for value in &self.target {
            value.to_bits().hash(&mut hasher);
        }
        for (name, values) in &self.covariates {
            name.hash(&mut hasher);
            for value in values {
                value.to_bits().hash(&mut hasher);
            }
        }
        hasher.finish()
    }

    /// Export as a polars frame: `ds` (Datetime, ms), the target, then covariates
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let millis: Vec<i64> = self.timestamps.iter().map(to_epoch_millis).collect();
        let ds = Series::new(TIMESTAMP_COLUMN, millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;

        let mut columns = vec![ds, Series::new(TARGET_COLUMN, self.target.clone())];
        for (name, values) in &self.covariates {
            columns.push(Series::new(name.as_str(), values.clone()));
        }

        Ok(DataFrame::new(columns)?)
    }
}

/// Split into train/test segments by trailing row count, keeping temporal order.
///
/// Rows are sorted by construction, so the trailing `test_size` rows are the latest.
pub fn train_test_split(data: &Dataset, test_size: usize) -> Result<(Dataset, Dataset)> {
    if test_size == 0 || data.len() <= test_size {
        return Err(ForecastError::InvalidSplit {
            test_size,
            len: data.len(),
        });
    }

    let cut = data.len() - test_size;
    let train = data.slice(0, Some(cut))?;
    let test = data.slice(cut, None)?;
    Ok((train, test))
}
