//! CSV export of a store snapshot.
//!
//! One row per stored record, in arrival order:
//! `seq,sensor_id,celsius,fahrenheit,offset_us` where `offset_us` is the time
//! since the first stored record was generated.

use csv::Writer;
use log::info;
use serde::Serialize;
use std::{
    fs::{create_dir_all, File},
    io::{BufWriter, Write},
    path::Path,
};

use crate::pipeline::reading::Processed;
use crate::utils::error::Result;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    seq: u64,
    sensor_id: &'a str,
    celsius: f64,
    fahrenheit: f64,
    offset_us: u64,
}

/// Writes `records` as CSV to any writer. Returns the number of data rows.
pub fn write_snapshot_csv<W: Write>(writer: W, records: &[Processed]) -> Result<usize> {
    let mut wtr = Writer::from_writer(writer);
    // serialize() only emits the header once there is a first row.
    if records.is_empty() {
        wtr.write_record(["seq", "sensor_id", "celsius", "fahrenheit", "offset_us"])?;
    }

    let origin = records.first().map(|p| p.reading.at);
    for p in records {
        let offset_us = origin
            .map(|o| p.reading.at.saturating_duration_since(o).as_micros() as u64)
            .unwrap_or_default();
        wtr.serialize(CsvRow {
            seq: p.seq(),
            sensor_id: &p.reading.sensor_id,
            celsius: p.celsius(),
            fahrenheit: p.fahrenheit,
            offset_us,
        })?;
    }
    wtr.flush()?;
    Ok(records.len())
}

/// Exports `records` to `path`, creating parent directories as needed.
pub fn export_snapshot_csv<P: AsRef<Path>>(path: P, records: &[Processed]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let rows = write_snapshot_csv(BufWriter::new(file), records)?;
    info!("Snapshot exported to: {:?} ({} rows)", path, rows);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::reading::Reading;
    use std::{
        sync::Arc,
        time::{Duration, Instant},
    };

    fn records() -> Vec<Processed> {
        let t0 = Instant::now();
        [(3u64, 30.0, 0u64), (7, 45.0, 400)]
            .into_iter()
            .map(|(seq, c, ms)| Processed {
                reading: Reading {
                    sensor_id: Arc::from("sensor-A"),
                    seq,
                    celsius: c,
                    at: t0 + Duration::from_millis(ms),
                },
                fahrenheit: c * 9.0 / 5.0 + 32.0,
            })
            .collect()
    }

    #[test]
    fn writes_header_and_rows() {
        let mut buf = Vec::new();
        let rows = write_snapshot_csv(&mut buf, &records()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(rows, 2);
        assert_eq!(lines[0], "seq,sensor_id,celsius,fahrenheit,offset_us");
        assert_eq!(lines[1], "3,sensor-A,30.0,86.0,0");
        assert_eq!(lines[2], "7,sensor-A,45.0,113.0,400000");
    }

    #[test]
    fn empty_snapshot_still_has_header() {
        let mut buf = Vec::new();
        assert_eq!(write_snapshot_csv(&mut buf, &[]).unwrap(), 0);
        assert_eq!(
            String::from_utf8(buf).unwrap().trim_end(),
            "seq,sensor_id,celsius,fahrenheit,offset_us"
        );
    }

    #[test]
    fn export_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/snapshot.csv");
        assert_eq!(export_snapshot_csv(&path, &records()).unwrap(), 2);
        assert!(path.exists());
    }
}
