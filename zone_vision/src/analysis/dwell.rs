// THEORY:
// The `DwellAnalyzer` turns a finished record sequence into a narrative of where the
// subject spent its time. It is the analysis counterpart of the tracking loop and is
// deliberately kept apart from it: it is a pure function of its input, holds no state
// between calls, and may be run on any thread, any number of times, long after the
// tracking run has ended.
//
// Steps:
// 1.  **Clean**: records with no position are dropped.
// 2.  **Sort** by time. The sort is stable, so records with equal times keep their
//     order.
// 3.  **Deltas**: each sample after the first contributes the time since the previous
//     sample to its own zone. The first sample contributes nothing.
// 4.  **Transitions**: a sample starts a transition when its zone differs from the
//     previous sample's zone (a null zone equals a null zone). The first sample is
//     always a transition. Each transition after the first becomes a zone change whose
//     exiting zone is the zone of the transition before it.

use crate::core_modules::zone::ZoneId;
use crate::pipeline::PositionRecord;
use std::collections::BTreeMap;

/// Running dwell of the sample's own zone, up to and including the sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CumulativeSample {
    pub time: f64,
    pub zone: Option<ZoneId>,
    pub seconds: f64,
}

/// A sample whose zone differs from the one before it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub time: f64,
    pub zone: Option<ZoneId>,
}

/// One row of the latency table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneChange {
    pub time: f64,
    pub entering: Option<ZoneId>,
    pub exiting: Option<ZoneId>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DwellSummary {
    /// Seconds attributed to each zone that appears in the cleaned samples.
    pub per_zone_seconds: BTreeMap<ZoneId, f64>,
    /// Seconds attributed to located samples that had no zone.
    pub unzoned_seconds: f64,
    pub cumulative: Vec<CumulativeSample>,
    pub transitions: Vec<Transition>,
    pub zone_changes: Vec<ZoneChange>,
    /// Time of the first and last cleaned sample.
    pub span: Option<(f64, f64)>,
}

impl DwellSummary {
    pub fn zoned_seconds(&self) -> f64 {
        self.per_zone_seconds.values().sum()
    }

    /// Time between the first and last cleaned sample.
    pub fn elapsed_seconds(&self) -> f64 {
        self.span.map(|(first, last)| last - first).unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.cumulative.is_empty()
    }
}

/// Computes dwell totals and zone transitions from a record sequence.
pub struct DwellAnalyzer;

impl DwellAnalyzer {
    pub fn analyze(records: &[PositionRecord]) -> DwellSummary {
        let mut samples: Vec<&PositionRecord> = records.iter().filter(|r| r.position.is_some()).collect();
        samples.sort_by(|a, b| a.time.total_cmp(&b.time));

        let mut summary = DwellSummary::default();
        let mut running: BTreeMap<Option<ZoneId>, f64> = BTreeMap::new();
        let mut previous: Option<&PositionRecord> = None;

        for sample in samples {
            let delta = previous.map(|p| sample.time - p.time).unwrap_or(0.0);
            match sample.zone {
                Some(zone) => *summary.per_zone_seconds.entry(zone).or_insert(0.0) += delta,
                None => summary.unzoned_seconds += delta,
            }

            let seconds = running.entry(sample.zone).or_insert(0.0);
            *seconds += delta;
            summary.cumulative.push(CumulativeSample {
                time: sample.time,
                zone: sample.zone,
                seconds: *seconds,
            });

            if previous.is_none_or(|p| p.zone != sample.zone) {
                if let Some(last) = summary.transitions.last() {
                    summary.zone_changes.push(ZoneChange {
                        time: sample.time,
                        entering: sample.zone,
                        exiting: last.zone,
                    });
                }
                summary.transitions.push(Transition {
                    time: sample.time,
                    zone: sample.zone,
                });
            }

            summary.span = Some(match summary.span {
                Some((first, _)) => (first, sample.time),
                None => (sample.time, sample.time),
            });
            previous = Some(sample);
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::detection::Point;
    use approx::assert_abs_diff_eq;

    fn located(time: f64, zone: Option<u32>) -> PositionRecord {
        PositionRecord {
            time,
            position: Some(Point::new(1, 1)),
            zone: zone.map(ZoneId),
        }
    }

    fn lost(time: f64) -> PositionRecord {
        PositionRecord { time, position: None, zone: None }
    }

    #[test]
    fn empty_and_unlocated_input_gives_empty_summary() {
        assert_eq!(DwellAnalyzer::analyze(&[]), DwellSummary::default());
        let summary = DwellAnalyzer::analyze(&[lost(0.0), lost(0.1)]);
        assert!(summary.is_empty());
        assert!(summary.per_zone_seconds.is_empty());
        assert!(summary.transitions.is_empty());
    }

    #[test]
    fn deltas_go_to_the_later_sample_zone() {
        let records = [
            located(0.0, Some(1)),
            located(1.0, Some(1)),
            located(1.5, Some(2)),
            located(3.5, Some(2)),
            located(4.0, Some(1)),
        ];
        let summary = DwellAnalyzer::analyze(&records);
        assert_abs_diff_eq!(summary.per_zone_seconds[&ZoneId(1)], 1.5);
        assert_abs_diff_eq!(summary.per_zone_seconds[&ZoneId(2)], 2.5);
        assert_abs_diff_eq!(summary.zoned_seconds(), summary.elapsed_seconds());
    }

    #[test]
    fn unlocated_samples_are_dropped_before_deltas() {
        let records = [located(0.0, Some(1)), lost(0.5), lost(1.0), located(2.0, Some(1))];
        let summary = DwellAnalyzer::analyze(&records);
        assert_abs_diff_eq!(summary.per_zone_seconds[&ZoneId(1)], 2.0);
        assert_eq!(summary.cumulative.len(), 2);
    }

    #[test]
    fn unzoned_time_is_kept_apart() {
        let records = [located(0.0, None), located(1.0, None), located(3.0, Some(4))];
        let summary = DwellAnalyzer::analyze(&records);
        assert_abs_diff_eq!(summary.unzoned_seconds, 1.0);
        assert_abs_diff_eq!(summary.per_zone_seconds[&ZoneId(4)], 2.0);
        assert_abs_diff_eq!(
            summary.zoned_seconds() + summary.unzoned_seconds,
            summary.elapsed_seconds()
        );
    }

    #[test]
    fn cumulative_series_is_scoped_to_each_zone() {
        let records = [
            located(0.0, Some(1)),
            located(1.0, Some(2)),
            located(2.0, Some(1)),
            located(4.0, Some(2)),
        ];
        let summary = DwellAnalyzer::analyze(&records);
        let seconds: Vec<f64> = summary.cumulative.iter().map(|c| c.seconds).collect();
        assert_eq!(seconds, vec![0.0, 1.0, 1.0, 3.0]);
    }

    #[test]
    fn transitions_count_maximal_runs() {
        let records = [
            located(0.0, Some(1)),
            located(0.1, Some(1)),
            located(0.2, Some(2)),
            located(0.3, None),
            located(0.4, None),
            located(0.5, Some(2)),
            located(0.6, Some(2)),
        ];
        let summary = DwellAnalyzer::analyze(&records);
        let zones: Vec<Option<ZoneId>> = summary.transitions.iter().map(|t| t.zone).collect();
        assert_eq!(zones, vec![Some(ZoneId(1)), Some(ZoneId(2)), None, Some(ZoneId(2))]);

        assert_eq!(summary.zone_changes.len(), 3);
        assert_eq!(
            summary.zone_changes[0],
            ZoneChange { time: 0.2, entering: Some(ZoneId(2)), exiting: Some(ZoneId(1)) }
        );
        assert_eq!(summary.zone_changes[2].exiting, None);
    }

    #[test]
    fn out_of_order_input_is_sorted() {
        let ordered = [located(0.0, Some(1)), located(1.0, Some(2)), located(2.0, Some(2))];
        let shuffled = [ordered[2], ordered[0], ordered[1]];
        assert_eq!(DwellAnalyzer::analyze(&shuffled), DwellAnalyzer::analyze(&ordered));
    }

    #[test]
    fn analysis_is_repeatable() {
        let records = [located(0.0, Some(3)), lost(0.1), located(0.2, Some(1)), located(0.9, Some(3))];
        assert_eq!(DwellAnalyzer::analyze(&records), DwellAnalyzer::analyze(&records));
    }

    #[test]
    fn report_tables_are_byte_identical_across_runs() {
        use crate::persistence::{write_zone_latency, write_zone_times};

        let records = [
            located(0.0, Some(3)),
            lost(0.1),
            located(0.2, Some(1)),
            located(0.35, None),
            located(0.9, Some(3)),
        ];
        let dir = tempfile::tempdir().unwrap();
        let mut tables = Vec::new();
        for run in 0..2 {
            let summary = DwellAnalyzer::analyze(&records);
            let times = dir.path().join(format!("times_{run}.csv"));
            let latency = dir.path().join(format!("latency_{run}.csv"));
            write_zone_times(&times, &summary).unwrap();
            write_zone_latency(&latency, "S1", &summary).unwrap();
            tables.push((std::fs::read(&times).unwrap(), std::fs::read(&latency).unwrap()));
        }
        assert!(!tables[0].0.is_empty());
        assert!(!tables[0].1.is_empty());
        assert_eq!(tables[0], tables[1]);
    }
}
