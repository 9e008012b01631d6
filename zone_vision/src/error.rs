// THEORY:
// One error enum for the whole library. Setup and persistence failures are hard
// errors; inside the per-frame loop only the detection backend and the record sink
// can fail. A frame that does not decode ends the stream instead, and a frame without
// a detection is a normal outcome.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VisionError>;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame source {0} contains no readable frames")]
    EmptySource(PathBuf),

    #[error("Invalid frame rate: {0} (must be positive and finite)")]
    InvalidFrameRate(f64),

    #[error("Cannot seek to frame {requested}: source has {available} frames")]
    SeekOutOfRange { requested: u64, available: u64 },

    #[error("Background task failed: {0}")]
    Task(String),

    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}
