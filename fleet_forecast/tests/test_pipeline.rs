use chrono::{Duration, NaiveDate, NaiveDateTime};
use fleet_forecast::cache::TrainingCache;
use fleet_forecast::data::Dataset;
use fleet_forecast::error::ForecastError;
use fleet_forecast::models::{ForecastModel, ModelKind};
use fleet_forecast::pipeline::{forecast_future, run_training_pipeline, TrainingRequest};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Daily utilization rising linearly from 0.5 to 0.9
fn linear_history(n: usize) -> Dataset {
    let timestamps = (0..n).map(|i| start() + Duration::days(i as i64)).collect();
    let values = (0..n)
        .map(|i| 0.5 + 0.4 * i as f64 / (n - 1) as f64)
        .collect();
    Dataset::new(timestamps, values).unwrap()
}

#[rstest]
#[case("seasonal")]
#[case("arima")]
fn test_linear_trend_backtest(#[case] name: &str) {
    let request = TrainingRequest::new(name)
        .with_dataset(linear_history(100))
        .with_test_days(14)
        .with_fallback_order(Vec::<String>::new());

    let result = run_training_pipeline(&request).unwrap();

    assert_eq!(result.model_name, name);
    assert!(result.attempts.is_empty());
    assert!(result.metrics.rmse < 0.1);
    assert_eq!(result.forecast.len(), 14);
    assert_eq!(result.train.len(), 86);
    assert_eq!(result.forecast.timestamps(), result.test.timestamps());
    for point in result.forecast.points() {
        assert!(point.yhat_lower <= point.yhat);
        assert!(point.yhat <= point.yhat_upper);
    }
}

#[rstest]
#[case("seasonal")]
#[case("arima")]
fn test_forecast_future_continues_daily_index(#[case] name: &str) {
    let history = linear_history(100);
    let request = TrainingRequest::new(name)
        .with_dataset(history.clone())
        .with_test_days(14);
    let result = run_training_pipeline(&request).unwrap();

    let future = result.forecast_future(&history, 10).unwrap();

    assert_eq!(future.len(), 10);
    let timestamps = future.timestamps();
    assert_eq!(
        timestamps[0],
        history.last_timestamp().unwrap() + Duration::days(1)
    );
    assert!(timestamps.windows(2).all(|w| w[1] - w[0] == Duration::days(1)));
}

#[test]
fn test_unknown_model_fails_before_loading() {
    let request = TrainingRequest::new("lstm").with_path("/definitely/not/here.csv");
    assert!(matches!(
        run_training_pipeline(&request),
        Err(ForecastError::UnknownModel { .. })
    ));

    let request = TrainingRequest::new("arima")
        .with_path("/definitely/not/here.csv")
        .with_fallback_order(["seasonal", "xgboost"]);
    match run_training_pipeline(&request) {
        Err(ForecastError::UnknownModel { name, .. }) => assert_eq!(name, "xgboost"),
        other => panic!("Expected UnknownModel, got {:?}", other),
    }
}

#[test]
fn test_short_history_falls_back_to_arima() {
    let request = TrainingRequest::new("seasonal")
        .with_dataset(linear_history(16))
        .with_test_days(4)
        .with_fallback_order(["arima"]);

    let result = run_training_pipeline(&request).unwrap();

    assert_eq!(result.model_name, "arima");
    assert_eq!(result.model.kind(), ModelKind::Arima);
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.attempts[0].0, "seasonal");
    assert!(result.attempts[0].1.contains("Insufficient data"));
    assert_eq!(result.forecast.len(), 4);
}

#[test]
fn test_all_candidates_failing_reports_each() {
    let request = TrainingRequest::new("seasonal")
        .with_dataset(linear_history(6))
        .with_test_days(3)
        .with_fallback_order(["arima"]);

    match run_training_pipeline(&request) {
        Err(ForecastError::AllModelsFailed(attempts)) => {
            let names: Vec<&str> = attempts.iter().map(|(name, _)| name.as_str()).collect();
            assert_eq!(names, vec!["seasonal", "arima"]);
        }
        other => panic!("Expected AllModelsFailed, got {:?}", other),
    }
}

#[test]
fn test_test_window_must_fit_dataset() {
    let request = TrainingRequest::new("arima")
        .with_dataset(linear_history(10))
        .with_test_days(10);
    assert!(matches!(
        run_training_pipeline(&request),
        Err(ForecastError::InvalidSplit { test_size: 10, len: 10 })
    ));
}

#[test]
fn test_candidates_are_deduplicated_in_order() {
    let request =
        TrainingRequest::new("prophet").with_fallback_order(["arima", "seasonal", "arima"]);
    assert_eq!(
        request.candidates().unwrap(),
        vec![ModelKind::Seasonal, ModelKind::Arima]
    );

    let request = TrainingRequest::new("arima");
    assert_eq!(
        request.candidates().unwrap(),
        vec![ModelKind::Arima, ModelKind::Seasonal]
    );
}

#[test]
fn test_dataset_resolution_order() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "date,utilization_rate").unwrap();
    for i in 0..40 {
        writeln!(file, "2024-02-{:02},0.{}", (i % 28) + 1, 50 + i).unwrap();
    }

    // The explicit dataset wins over the path
    let request = TrainingRequest::new("arima")
        .with_path(file.path())
        .with_dataset(linear_history(50));
    assert_eq!(request.load().unwrap().len(), 50);

    // Rows for days 1..=12 repeat; the later values win
    let from_path = TrainingRequest::new("arima").with_path(file.path());
    assert_eq!(from_path.load().unwrap().len(), 28);

    let sample = TrainingRequest::default();
    assert_eq!(sample.load().unwrap().len(), 730);
}

#[test]
fn test_default_request_trains_on_sample() {
    let result = run_training_pipeline(&TrainingRequest::default()).unwrap();

    assert_eq!(result.model_name, "seasonal");
    assert_eq!(result.test.len(), 30);
    assert_eq!(result.train.len(), 700);
    assert!(result.metrics.mape.is_finite() && result.metrics.mape < 50.0);
}

#[test]
fn test_forecast_future_preconditions() {
    let history = linear_history(30);
    let request = TrainingRequest::new("arima").with_dataset(history.clone());
    let result = run_training_pipeline(&request.with_test_days(5)).unwrap();

    assert!(matches!(
        forecast_future(&result.model, &history, 0),
        Err(ForecastError::InvalidHorizon(0))
    ));

    let empty = history.slice(0, Some(0)).unwrap();
    assert!(matches!(
        forecast_future(&result.model, &empty, 5),
        Err(ForecastError::EmptyHistory)
    ));
}

#[test]
fn test_forecast_future_uses_median_gap_for_irregular_history() {
    let offsets = [0, 1, 3, 4, 5, 7, 8, 9, 10, 12, 13, 14, 15, 16, 18, 19, 20];
    let timestamps: Vec<NaiveDateTime> = offsets
        .iter()
        .map(|d| start() + Duration::days(*d))
        .collect();
    let values = offsets.iter().map(|d| 0.5 + 0.01 * *d as f64).collect();
    let history = Dataset::new(timestamps, values).unwrap();
    assert_eq!(history.frequency(), None);

    let mut model = ModelKind::Arima.build(&Default::default());
    model.fit(&history).unwrap();
    let future = forecast_future(&model, &history, 3).unwrap();

    assert_eq!(
        future.timestamps(),
        vec![
            start() + Duration::days(21),
            start() + Duration::days(22),
            start() + Duration::days(23),
        ]
    );
}

#[test]
fn test_cache_reuses_results_for_identical_content() {
    let mut cache = TrainingCache::new();
    let request = TrainingRequest::new("arima")
        .with_dataset(linear_history(60))
        .with_test_days(7);

    let first = cache.get_or_train(&request).unwrap();
    let again = TrainingRequest::new("arima")
        .with_dataset(linear_history(60))
        .with_test_days(7);
    let second = cache.get_or_train(&again).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.hits(), 1);
    assert_eq!(cache.len(), 1);

    let other_window = request.clone().with_test_days(10);
    let third = cache.get_or_train(&other_window).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(cache.len(), 2);

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.hits(), 0);
}

#[test]
fn test_forecast_future_past_date_range_is_an_error() {
    // Century-spaced history pushes a long horizon beyond the last representable date
    let timestamps: Vec<NaiveDateTime> = (0..20)
        .map(|i| start() + Duration::days(36_500 * i as i64))
        .collect();
    let values = (0..20).map(|i| 0.5 + 0.01 * i as f64).collect();
    let history = Dataset::new(timestamps, values).unwrap();

    let mut model = ModelKind::Arima.build(&Default::default());
    model.fit(&history).unwrap();

    assert!(matches!(
        forecast_future(&model, &history, 3000),
        Err(ForecastError::ValidationError(_))
    ));
}
