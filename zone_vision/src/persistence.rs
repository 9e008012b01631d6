// THEORY:
// Tabular persistence for position records and dwell reports. The tracking loop only
// sees the `RecordSink` trait, so it can write to memory in tests and to CSV in a run.
//
// Record files have one row per processed frame with the columns
// `Time, Position X, Position Y, Zone`; a null value is an empty field. Reading them
// back is lenient: a malformed row is skipped with a warning, never fatal.

use crate::analysis::dwell::DwellSummary;
use crate::core_modules::detection::Point;
use crate::core_modules::zone::ZoneId;
use crate::error::Result;
use crate::pipeline::PositionRecord;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

const POSITIONS_SUFFIX: &str = "_positions";

/// Append-only destination for records emitted by the tracking loop.
pub trait RecordSink {
    fn append(&mut self, record: &PositionRecord) -> Result<()>;

    /// Flushes anything buffered. Called once after the last frame.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl RecordSink for Vec<PositionRecord> {
    fn append(&mut self, record: &PositionRecord) -> Result<()> {
        self.push(*record);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordRow {
    #[serde(rename = "Time")]
    time: f64,
    #[serde(rename = "Position X")]
    x: Option<u32>,
    #[serde(rename = "Position Y")]
    y: Option<u32>,
    #[serde(rename = "Zone")]
    zone: Option<u32>,
}

impl From<&PositionRecord> for RecordRow {
    fn from(record: &PositionRecord) -> Self {
        Self {
            time: record.time,
            x: record.position.map(|p| p.x),
            y: record.position.map(|p| p.y),
            zone: record.zone.map(|z| z.0),
        }
    }
}

impl From<RecordRow> for PositionRecord {
    fn from(row: RecordRow) -> Self {
        let position = match (row.x, row.y) {
            (Some(x), Some(y)) => Some(Point::new(x, y)),
            _ => None,
        };
        Self {
            time: row.time,
            position,
            zone: row.zone.map(ZoneId),
        }
    }
}

/// Writes records as CSV.
pub struct CsvRecordSink<W: Write> {
    writer: csv::Writer<W>,
}

impl CsvRecordSink<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            writer: csv::Writer::from_path(path)?,
        })
    }
}

impl<W: Write> CsvRecordSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::error::VisionError::Io(e.into_error()))
    }
}

impl<W: Write> RecordSink for CsvRecordSink<W> {
    fn append(&mut self, record: &PositionRecord) -> Result<()> {
        self.writer.serialize(RecordRow::from(record))?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Reads a record file. Rows that do not parse are skipped with a warning.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<PositionRecord>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for (row_number, row) in reader.deserialize::<RecordRow>().enumerate() {
        match row {
            Ok(row) => records.push(PositionRecord::from(row)),
            Err(e) => warn!(file = %path.display(), row = row_number + 1, "skipping unreadable record: {e}"),
        }
    }
    Ok(records)
}

#[derive(Debug, Serialize)]
struct ZoneTimeRow {
    #[serde(rename = "Zone")]
    zone: u32,
    #[serde(rename = "TotalSeconds")]
    total_seconds: f64,
}

#[derive(Debug, Serialize)]
struct ZoneLatencyRow<'a> {
    #[serde(rename = "Subject")]
    subject: &'a str,
    #[serde(rename = "ZoneChangeTime")]
    zone_change_time: f64,
    #[serde(rename = "EnteringZone")]
    entering_zone: Option<u32>,
    #[serde(rename = "ExitingZone")]
    exiting_zone: Option<u32>,
}

fn round_millis(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

/// Writes the `Zone, TotalSeconds` table, seconds rounded to milliseconds.
pub fn write_zone_times(path: impl AsRef<Path>, summary: &DwellSummary) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for (zone, seconds) in &summary.per_zone_seconds {
        writer.serialize(ZoneTimeRow {
            zone: zone.0,
            total_seconds: round_millis(*seconds),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes the `Subject, ZoneChangeTime, EnteringZone, ExitingZone` table.
pub fn write_zone_latency(path: impl AsRef<Path>, subject: &str, summary: &DwellSummary) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for change in &summary.zone_changes {
        writer.serialize(ZoneLatencyRow {
            subject,
            zone_change_time: change.time,
            entering_zone: change.entering.map(|z| z.0),
            exiting_zone: change.exiting.map(|z| z.0),
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Where a tracking run writes its artifacts:
/// `<root>/<stem>/<stem>_positions.csv` and `<root>/<stem>/<stem>_heatmap.png`.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    directory: PathBuf,
    stem: String,
}

impl OutputLayout {
    /// Lays out outputs for the video (or frame directory) at `input`.
    pub fn for_input(output_root: impl AsRef<Path>, input: impl AsRef<Path>) -> Self {
        let input = input.as_ref();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "session".to_string());
        Self {
            directory: output_root.as_ref().join(&stem),
            stem,
        }
    }

    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(&self.directory)?;
        Ok(())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn positions_path(&self) -> PathBuf {
        self.directory.join(format!("{}{POSITIONS_SUFFIX}.csv", self.stem))
    }

    pub fn heatmap_path(&self) -> PathBuf {
        self.directory.join(format!("{}_heatmap.png", self.stem))
    }
}

/// Report files written next to a record file: (zone times, zone latency).
pub fn report_paths(record_path: impl AsRef<Path>, subject: &str) -> (PathBuf, PathBuf) {
    let directory = record_path
        .as_ref()
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    (
        directory.join(format!("{subject}_Zone_Times.csv")),
        directory.join(format!("{subject}_Zone_Latency.csv")),
    )
}

/// Subject label for a record file.
///
/// With a marker present in the file name, the label is the marker followed by the
/// text after it up to the first `.`. Otherwise it is the file stem without a
/// trailing `_positions`.
pub fn subject_from_path(path: impl AsRef<Path>, marker: Option<&str>) -> String {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Some(marker) = marker.filter(|m| !m.is_empty()) {
        if let Some((_, rest)) = file_name.split_once(marker) {
            let tail = rest.split('.').next().unwrap_or_default();
            return format!("{marker}{tail}");
        }
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.strip_suffix(POSITIONS_SUFFIX)
        .map(str::to_string)
        .unwrap_or(stem)
}
