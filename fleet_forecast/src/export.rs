//! CSV export of forecast frames
//!
//! File exports go through a temporary file in the destination directory that is
//! renamed into place once complete, so a failed export leaves no partial file.

use crate::error::{ForecastError, Result};
use crate::models::ForecastFrame;
use chrono::{NaiveDateTime, NaiveTime};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Header of the point export
pub const POINT_HEADER: [&str; 2] = ["date", "utilization_rate"];
/// Header of the interval export
pub const INTERVAL_HEADER: [&str; 4] = ["ds", "yhat", "yhat_lower", "yhat_upper"];

/// Write `date,utilization_rate` rows to any writer
pub fn write_point_csv_to_writer<W: Write>(frame: &ForecastFrame, writer: W) -> Result<()> {
    let format = date_format(frame);
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(POINT_HEADER)?;
    for point in frame.iter() {
        csv_writer.write_record([
            point.ds.format(format).to_string(),
            point.yhat.to_string(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write `ds,yhat,yhat_lower,yhat_upper` rows to any writer
pub fn write_interval_csv_to_writer<W: Write>(frame: &ForecastFrame, writer: W) -> Result<()> {
    let format = date_format(frame);
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(INTERVAL_HEADER)?;
    for point in frame.iter() {
        csv_writer.write_record([
            point.ds.format(format).to_string(),
            point.yhat.to_string(),
            point.yhat_lower.to_string(),
            point.yhat_upper.to_string(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Export point forecasts to a CSV file
pub fn write_point_csv<P: AsRef<Path>>(frame: &ForecastFrame, path: P) -> Result<()> {
    write_atomically(path.as_ref(), |file| write_point_csv_to_writer(frame, file))
}

/// Export forecasts with interval bounds to a CSV file
pub fn write_interval_csv<P: AsRef<Path>>(frame: &ForecastFrame, path: P) -> Result<()> {
    write_atomically(path.as_ref(), |file| write_interval_csv_to_writer(frame, file))
}

fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut std::fs::File) -> Result<()>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = NamedTempFile::new_in(dir)?;
    write(temp.as_file_mut())?;
    temp.as_file_mut().sync_all()?;
    temp.persist(path).map_err(|e| ForecastError::IoError(e.error))?;
    Ok(())
}

/// Timestamp layout for a frame: plain dates when every timestamp falls on midnight
pub fn date_format(frame: &ForecastFrame) -> &'static str {
    if frame.iter().all(|p| is_midnight(&p.ds)) {
        "%Y-%m-%d"
    } else {
        "%Y-%m-%d %H:%M:%S"
    }
}

fn is_midnight(ts: &NaiveDateTime) -> bool {
    ts.time() == NaiveTime::MIN
}
