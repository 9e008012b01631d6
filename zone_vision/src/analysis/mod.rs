// THEORY:
// Post-run analysis over persisted record sequences. Nothing here touches the
// tracking loop: every function takes a finished record sequence (in memory or on
// disk) and is safe to call from any thread.

pub mod batch;
pub mod dwell;

pub use batch::{analyze_file, analyze_files, AnalysisOptions, SubjectReport};
pub use dwell::{CumulativeSample, DwellAnalyzer, DwellSummary, Transition, ZoneChange};
