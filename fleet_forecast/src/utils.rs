//! Timestamp parsing and cadence helpers shared by the loader, the models and the pipeline

use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Formats carrying an explicit UTC offset
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M%:z",
];

/// Naive date-time formats, interpreted as already being UTC
const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d"];

/// Parse a timestamp permissively and normalise it to a timezone-naive UTC value.
///
/// Offset-aware inputs are converted to UTC and the zone is stripped. Naive inputs
/// are taken as-is. Returns `None` when no known layout matches.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.naive_utc());
        }
    }

    // "Z" / " UTC" suffixes name the zone we normalise to anyway
    let value = value
        .strip_suffix(" UTC")
        .or_else(|| value.strip_suffix('Z'))
        .unwrap_or(value);

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }

    None
}

/// Convert epoch milliseconds into a timezone-naive UTC timestamp
pub fn from_epoch_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

/// Convert a timezone-naive UTC timestamp into epoch milliseconds
pub fn to_epoch_millis(ts: &NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

/// Infer a constant sampling interval.
///
/// A frequency is only reported when at least three timestamps are available and every
/// consecutive delta is the same positive duration.
pub fn infer_frequency(timestamps: &[NaiveDateTime]) -> Option<Duration> {
    if timestamps.len() < 3 {
        return None;
    }

    let first = timestamps[1] - timestamps[0];
    if first <= Duration::zero() {
        return None;
    }

    timestamps
        .windows(2)
        .all(|w| w[1] - w[0] == first)
        .then_some(first)
}

/// Median of the consecutive gaps, or `None` when there are fewer than two timestamps
pub fn median_gap(timestamps: &[NaiveDateTime]) -> Option<Duration> {
    let mut gaps: Vec<i64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_milliseconds())
        .collect();
    if gaps.is_empty() {
        return None;
    }

    gaps.sort_unstable();
    let mid = gaps.len() / 2;
    let median = if gaps.len() % 2 == 0 {
        (gaps[mid - 1] + gaps[mid]) / 2
    } else {
        gaps[mid]
    };

    Some(Duration::milliseconds(median))
}

/// Create `horizon` timestamps strictly after `last_timestamp`, spaced by `step`.
///
/// Fails when the index would run past the representable date range.
pub fn future_timestamps(
    last_timestamp: NaiveDateTime,
    horizon: usize,
    step: Duration,
) -> Result<Vec<NaiveDateTime>> {
    let mut timestamps = Vec::with_capacity(horizon);
    let mut current = last_timestamp;

    for i in 0..horizon {
        current = current.checked_add_signed(step).ok_or_else(|| {
            ForecastError::ValidationError(format!(
                "Future index overflows the date range after {} of {} steps of {}",
                i, horizon, step
            ))
        })?;
        timestamps.push(current);
    }

    Ok(timestamps)
}

/// Fractional days elapsed since the Unix epoch
pub fn epoch_days(ts: &NaiveDateTime) -> f64 {
    to_epoch_millis(ts) as f64 / 86_400_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_parse_timestamp_layouts() {
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_time(NaiveTime::MIN);

        assert_eq!(ts("2024-03-01"), midnight);
        assert_eq!(ts("2024/03/01"), midnight);
        assert_eq!(ts("03/01/2024"), midnight);
        assert_eq!(ts("2024-03-01 00:00:00"), midnight);
        assert_eq!(ts("2024-03-01T00:00:00Z"), midnight);
        assert_eq!(ts("2024-03-01 00:00:00.000"), midnight);
        assert_eq!(ts(" 2024-03-01 "), midnight);
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_parse_timestamp_converts_offsets_to_utc() {
        assert_eq!(ts("2024-03-01T02:00:00+02:00"), ts("2024-03-01"));
        assert_eq!(ts("2024-03-01 05:30:00-05:00"), ts("2024-03-01 10:30:00"));
    }

    #[test]
    fn test_infer_frequency() {
        let daily: Vec<_> = (0..5).map(|i| ts("2024-01-01") + Duration::days(i)).collect();
        assert_eq!(infer_frequency(&daily), Some(Duration::days(1)));

        let mut irregular = daily.clone();
        irregular[4] += Duration::hours(3);
        assert_eq!(infer_frequency(&irregular), None);

        assert_eq!(infer_frequency(&daily[..2]), None);
    }

    #[test]
    fn test_median_gap() {
        let stamps = vec![
            ts("2024-01-01"),
            ts("2024-01-02"),
            ts("2024-01-04"),
            ts("2024-01-05"),
        ];
        assert_eq!(median_gap(&stamps), Some(Duration::days(1)));
        assert_eq!(median_gap(&stamps[..1]), None);
    }

    #[test]
    fn test_future_timestamps() {
        let future = future_timestamps(ts("2024-01-31"), 3, Duration::days(1)).unwrap();
        assert_eq!(
            future,
            vec![ts("2024-02-01"), ts("2024-02-02"), ts("2024-02-03")]
        );
    }

    #[test]
    fn test_future_timestamps_out_of_range() {
        let near_end = NaiveDateTime::MAX - Duration::days(2);
        let result = future_timestamps(near_end, 3, Duration::days(1));
        assert!(matches!(result, Err(ForecastError::ValidationError(_))));
    }
}
