use approx::assert_relative_eq;
use fleet_forecast::error::ForecastError;
use fleet_forecast::metrics::evaluate;

#[test]
fn test_regression_metrics() {
    let actual = vec![10.0, 20.0, 30.0, 40.0, 50.0];
    let predicted = vec![12.0, 18.0, 33.0, 37.0, 52.0];

    let metrics = evaluate(&actual, &predicted).unwrap();

    assert_relative_eq!(metrics.mae, 2.4, epsilon = 1e-12);
    assert_relative_eq!(metrics.rmse, 6.0_f64.sqrt(), epsilon = 1e-12);
    // (20% + 10% + 10% + 7.5% + 4%) / 5
    assert_relative_eq!(metrics.mape, 10.3, epsilon = 1e-9);
}

#[test]
fn test_perfect_forecast_scores_zero() {
    let actual = vec![0.55, 0.61, 0.0, 0.72];

    let metrics = evaluate(&actual, &actual).unwrap();

    assert_eq!(metrics.rmse, 0.0);
    assert_eq!(metrics.mae, 0.0);
    assert_eq!(metrics.mape, 0.0);
}

#[test]
fn test_zero_actuals_contribute_nothing_to_mape() {
    let metrics = evaluate(&[0.0, 0.5], &[0.1, 0.6]).unwrap();

    // Only the second position has a finite ratio, but both count in the mean
    assert_relative_eq!(metrics.mape, 10.0, epsilon = 1e-9);
    assert_relative_eq!(metrics.mae, 0.1, epsilon = 1e-12);

    let all_zero = evaluate(&[0.0, 0.0], &[0.2, 0.3]).unwrap();
    assert_eq!(all_zero.mape, 0.0);
}

#[test]
fn test_length_mismatch() {
    match evaluate(&[1.0, 2.0], &[1.0]) {
        Err(ForecastError::LengthMismatch { actual, predicted }) => {
            assert_eq!(actual, 2);
            assert_eq!(predicted, 1);
        }
        other => panic!("Expected LengthMismatch, got {:?}", other),
    }
}

#[test]
fn test_empty_input_is_rejected() {
    assert!(matches!(
        evaluate(&[], &[]),
        Err(ForecastError::ValidationError(_))
    ));
}
