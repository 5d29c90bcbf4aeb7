use chrono::{Duration, NaiveDate, NaiveDateTime};
use fleet_forecast::data::{
    load_dataset, train_test_split, DataLoader, Dataset, DatasetSource, TARGET_COLUMN,
};
use fleet_forecast::error::ForecastError;
use polars::prelude::*;
use pretty_assertions::assert_eq;
use std::io::Write;
use tempfile::NamedTempFile;

fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn csv_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

fn daily_dataset(n: usize) -> Dataset {
    let timestamps = (0..n).map(|i| day(2023, 1, 1) + Duration::days(i as i64)).collect();
    let values = (0..n).map(|i| 0.5 + 0.01 * i as f64).collect();
    Dataset::new(timestamps, values).unwrap()
}

#[test]
fn test_data_loader_from_csv() {
    let file = csv_file(&[
        "date,active_vehicles,utilization_rate",
        "2023-01-01,55,0.45",
        "2023-01-02,73,0.61",
        "2023-01-03,70,0.58",
    ]);

    let data = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(data.len(), 3);
    assert!(!data.is_empty());
    assert_eq!(data.target(), &[0.45, 0.61, 0.58]);
    assert_eq!(data.column("active_vehicles").unwrap(), &[55.0, 73.0, 70.0]);
    assert_eq!(data.covariate_names(), vec!["active_vehicles"]);
    assert_eq!(data.frequency(), Some(Duration::days(1)));
    assert_eq!(data.load_report().total_dropped(), 0);
}

#[test]
fn test_mixed_case_headers_resolve_to_canonical_names() {
    let file = csv_file(&[
        "Date,Utilisation_Rate",
        "2023-01-01,0.5",
        "2023-01-02,0.6",
    ]);

    let data = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(data.len(), 2);
    assert_eq!(data.column(TARGET_COLUMN).unwrap(), &[0.5, 0.6]);
    assert_eq!(data.column("Utilization_Rate").unwrap(), &[0.5, 0.6]);
    assert_eq!(data.first_timestamp(), Some(day(2023, 1, 1)));
}

#[test]
fn test_row_level_defects_are_dropped_and_reported() {
    let file = csv_file(&[
        "timestamp,utilization,miles_driven",
        "2023-01-03,0.70,900",
        "not-a-date,0.10,100",
        "2023-01-01,0.50,800",
        "2023-01-02,0.60,850",
        "2023-01-04,abc,910",
        "2023-01-05,0.80,",
        "2023-01-02,0.65,860",
    ]);

    let data = DataLoader::from_csv(file.path()).unwrap();
    let report = data.load_report();

    assert_eq!(report.invalid_timestamps, 1);
    assert_eq!(report.duplicate_timestamps, 1);
    assert_eq!(report.non_numeric_rows, 2);
    assert_eq!(
        data.timestamps(),
        &[day(2023, 1, 1), day(2023, 1, 2), day(2023, 1, 3)]
    );
    // The later duplicate wins
    assert_eq!(data.target(), &[0.50, 0.65, 0.70]);
    assert_eq!(data.column("miles_driven").unwrap(), &[800.0, 860.0, 900.0]);
}

#[test]
fn test_loaded_timestamps_are_sorted_and_unique() {
    let file = csv_file(&[
        "ds,utilization_rate",
        "2023-01-05,0.5",
        "2023-01-01,0.4",
        "2023-01-03,0.6",
        "2023-01-01,0.45",
    ]);

    let data = DataLoader::from_csv(file.path()).unwrap();

    assert!(data.timestamps().windows(2).all(|w| w[0] < w[1]));
    assert!(data.target().iter().all(|v| v.is_finite()));
    // 01-01, 01-03, 01-05
    assert_eq!(data.frequency(), Some(Duration::days(2)));
}

#[test]
fn test_timezone_aware_timestamps_are_normalised_to_utc() {
    let file = csv_file(&[
        "datetime,utilization_rate",
        "2023-01-01T02:00:00+02:00,0.5",
        "2023-01-02T00:00:00Z,0.6",
        "2023-01-02 19:00:00-05:00,0.7",
    ]);

    let data = DataLoader::from_csv(file.path()).unwrap();

    assert_eq!(
        data.timestamps(),
        &[day(2023, 1, 1), day(2023, 1, 2), day(2023, 1, 3)]
    );
}

#[test]
fn test_missing_columns_are_structural_errors() {
    let file = csv_file(&["when,value", "2023-01-01,0.5"]);
    match DataLoader::from_csv(file.path()) {
        Err(ForecastError::MissingColumn { kind, found, .. }) => {
            assert_eq!(kind, "date");
            assert_eq!(found, vec!["when", "value"]);
        }
        other => panic!("Expected MissingColumn, got {:?}", other),
    }

    let file = csv_file(&["date,value", "2023-01-01,0.5"]);
    assert!(matches!(
        DataLoader::from_csv(file.path()),
        Err(ForecastError::MissingColumn { kind: "target", .. })
    ));
}

#[test]
fn test_no_valid_rows_is_an_empty_dataset() {
    let header_only = csv_file(&["date,utilization_rate"]);
    assert!(matches!(
        DataLoader::from_csv(header_only.path()),
        Err(ForecastError::EmptyDataset(_))
    ));

    let all_invalid = csv_file(&["date,utilization_rate", "yesterday,0.5", "2023-01-01,n/a"]);
    assert!(matches!(
        DataLoader::from_csv(all_invalid.path()),
        Err(ForecastError::EmptyDataset(_))
    ));
}

#[test]
fn test_nonexistent_file_is_an_io_error() {
    let result = DataLoader::from_csv("nonexistent_file.csv");
    assert!(matches!(result, Err(ForecastError::IoError(_))));
}

#[test]
fn test_load_dataset_sources() {
    let bytes = b"date,utilization_rate\n2023-01-01,0.5\n2023-01-02,0.6\n".to_vec();
    let from_bytes = load_dataset(bytes).unwrap();
    assert_eq!(from_bytes.len(), 2);

    let sample = load_dataset(DatasetSource::Sample).unwrap();
    assert_eq!(sample.len(), 730);
    assert_eq!(sample.first_timestamp(), Some(day(2023, 1, 1)));
    assert_eq!(sample.frequency(), Some(Duration::days(1)));
    assert_eq!(sample.covariate_names().len(), 6);
    assert!(sample.target().iter().all(|v| (0.0..=1.0).contains(v)));
}

#[test]
fn test_from_dataframe_applies_the_same_cleaning() {
    let df = DataFrame::new(vec![
        Series::new("DS", &["2023-01-02", "2023-01-01", "bad", "2023-01-03"]),
        Series::new("Utilization", &[0.6, 0.5, 0.9, 0.7]),
    ])
    .unwrap();

    let data = DataLoader::from_dataframe(&df).unwrap();

    assert_eq!(data.len(), 3);
    assert_eq!(data.target(), &[0.5, 0.6, 0.7]);
    assert_eq!(data.load_report().invalid_timestamps, 1);
}

#[test]
fn test_dataframe_round_trip_keeps_timestamps() {
    let data = daily_dataset(5);

    let df = data.to_dataframe().unwrap();
    assert_eq!(df.height(), 5);
    assert_eq!(df.get_column_names(), vec!["ds", "utilization_rate"]);

    let restored = DataLoader::from_dataframe(&df).unwrap();
    assert_eq!(restored.timestamps(), data.timestamps());
    assert_eq!(restored.target(), data.target());
}

#[test]
fn test_train_test_split() {
    let data = daily_dataset(10);

    let (train, test) = train_test_split(&data, 3).unwrap();

    assert_eq!(train.len() + test.len(), data.len());
    assert_eq!(test.len(), 3);
    assert!(train.last_timestamp().unwrap() < test.first_timestamp().unwrap());
    assert_eq!(test.frequency(), data.frequency());
}

#[test]
fn test_train_test_split_rejects_invalid_sizes() {
    let data = daily_dataset(10);

    for test_size in [0, 10, 11] {
        assert!(matches!(
            train_test_split(&data, test_size),
            Err(ForecastError::InvalidSplit { len: 10, .. })
        ));
    }
}

#[test]
fn test_slice_and_tail() {
    let data = daily_dataset(10);

    let subset = data.slice(2, Some(5)).unwrap();
    assert_eq!(subset.len(), 3);
    assert_eq!(subset.first_timestamp(), Some(day(2023, 1, 3)));

    assert_eq!(data.tail(4).unwrap().len(), 4);
    assert_eq!(data.tail(40).unwrap().len(), 10);
    assert!(data.slice(5, Some(11)).is_err());
}

#[test]
fn test_content_hash_tracks_values() {
    let a = daily_dataset(10);
    let b = daily_dataset(10);
    assert_eq!(a.content_hash(), b.content_hash());

    let mut values = a.target().to_vec();
    values[3] += 0.001;
    let c = Dataset::new(a.timestamps().to_vec(), values).unwrap();
    assert_ne!(a.content_hash(), c.content_hash());
}

#[test]
fn test_dataset_new_rejects_unequal_lengths() {
    let timestamps = vec![day(2023, 1, 1), day(2023, 1, 2)];
    match Dataset::new(timestamps, vec![0.5]) {
        Err(ForecastError::ValidationError(msg)) => {
            assert!(msg.contains("Timestamps length (2)"));
            assert!(msg.contains("values length (1)"));
        }
        other => panic!("Expected ValidationError, got {:?}", other),
    }
}
