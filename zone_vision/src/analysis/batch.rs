// THEORY:
// Batch analysis runs the `DwellAnalyzer` over many record files at once. Unlike
// the tracking loop this work is embarrassingly parallel: each file is read,
// analyzed and reported on its own, with no shared state.
//
// Files are handed to tokio's blocking pool (CSV reading and report writing are
// synchronous I/O) and at most `num_cpus` of them are in flight at a time. Results
// come back in input order, one per path, and a failing file never stops the others.

use crate::analysis::dwell::{DwellAnalyzer, DwellSummary};
use crate::error::{Result, VisionError};
use crate::persistence::{read_records, report_paths, subject_from_path, write_zone_latency, write_zone_times};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Marker used to pull a subject label out of the file name (e.g. `KM`).
    pub subject_marker: Option<String>,
    /// Write the zone-times and zone-latency tables next to each record file.
    pub write_reports: bool,
}

/// Analysis result for one record file.
#[derive(Debug, Clone)]
pub struct SubjectReport {
    pub path: PathBuf,
    pub subject: String,
    pub summary: DwellSummary,
    /// (zone times, zone latency) tables, when written.
    pub report_files: Option<(PathBuf, PathBuf)>,
}

/// Reads, analyzes and optionally reports on a single record file.
pub fn analyze_file(path: impl AsRef<Path>, options: &AnalysisOptions) -> Result<SubjectReport> {
    let path = path.as_ref();
    let subject = subject_from_path(path, options.subject_marker.as_deref());
    let records = read_records(path)?;
    let summary = DwellAnalyzer::analyze(&records);
    debug!(
        file = %path.display(),
        %subject,
        records = records.len(),
        transitions = summary.transitions.len(),
        "analyzed record file"
    );

    let report_files = if options.write_reports {
        let (times, latency) = report_paths(path, &subject);
        write_zone_times(&times, &summary)?;
        write_zone_latency(&latency, &subject, &summary)?;
        Some((times, latency))
    } else {
        None
    };

    Ok(SubjectReport {
        path: path.to_path_buf(),
        subject,
        summary,
        report_files,
    })
}

/// Analyzes every file in `paths`, returning one result per path in input order.
pub async fn analyze_files(paths: Vec<PathBuf>, options: AnalysisOptions) -> Vec<Result<SubjectReport>> {
    let width = num_cpus::get().max(1);
    info!(files = paths.len(), width, "batch analysis started");

    let options = Arc::new(options);
    stream::iter(paths)
        .map(|path| {
            let options = Arc::clone(&options);
            async move {
                let label = path.display().to_string();
                match tokio::task::spawn_blocking(move || analyze_file(&path, &options)).await {
                    Ok(result) => result,
                    Err(e) => Err(VisionError::Task(format!("{label}: {e}"))),
                }
            }
        })
        .buffered(width)
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::core_modules::zone::ZoneId;

    const RECORDS: &str = "Time,Position X,Position Y,Zone\n\
        0.0,10,10,1\n\
        0.5,12,10,1\n\
        1.0,,,\n\
        1.5,80,40,2\n\
        2.5,81,41,2\n";

    #[test]
    fn writes_both_report_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trial_KM3.1_positions.csv");
        std::fs::write(&path, RECORDS).unwrap();

        let options = AnalysisOptions {
            subject_marker: Some("KM".to_string()),
            write_reports: true,
        };
        let report = analyze_file(&path, &options).unwrap();
        assert_eq!(report.subject, "KM3");
        assert_abs_diff_eq!(report.summary.per_zone_seconds[&ZoneId(1)], 0.5);
        assert_abs_diff_eq!(report.summary.per_zone_seconds[&ZoneId(2)], 2.0);

        let (times, latency) = report.report_files.unwrap();
        assert_eq!(times, dir.path().join("KM3_Zone_Times.csv"));
        assert_eq!(
            std::fs::read_to_string(times).unwrap(),
            "Zone,TotalSeconds\n1,0.5\n2,2.0\n"
        );
        assert_eq!(
            std::fs::read_to_string(latency).unwrap(),
            "Subject,ZoneChangeTime,EnteringZone,ExitingZone\nKM3,1.5,2,1\n"
        );
    }

    #[tokio::test]
    async fn batch_keeps_input_order_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("a_positions.csv");
        let second = dir.path().join("b_positions.csv");
        std::fs::write(&first, RECORDS).unwrap();
        std::fs::write(&second, "Time,Position X,Position Y,Zone\n0.0,1,1,3\n4.0,1,1,3\n").unwrap();
        let missing = dir.path().join("missing_positions.csv");

        let results = analyze_files(vec![second.clone(), missing, first.clone()], AnalysisOptions::default()).await;
        assert_eq!(results.len(), 3);

        let b = results[0].as_ref().unwrap();
        assert_eq!(b.subject, "b");
        assert_abs_diff_eq!(b.summary.per_zone_seconds[&ZoneId(3)], 4.0);
        assert!(b.report_files.is_none());

        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().path, first);
    }
}
