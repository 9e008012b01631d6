// THEORY:
// This file is the main entry point for the `zone_vision` library crate.
// It exposes two clearly separated halves of the engine:
//
// 1.  **The tracking loop** (`pipeline`): an order-sensitive, stateful, strictly
//     sequential per-frame process that turns raw frames into one `PositionRecord`
//     per frame. Background modelling, blob extraction, zone resolution and the
//     heatmap all live under `core_modules` and are driven from here.
// 2.  **The analysis layer** (`analysis`): pure, reentrant functions over a finished
//     record sequence that compute dwell totals and zone transitions.
//
// Frame sources, persistence and configuration are thin seams around those two
// halves so that a driver (like the `zone_tracker` binary) can wire them together.

pub mod analysis;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod frame_source;
pub mod persistence;
pub mod pipeline;

pub use config::{HeatmapPolicy, PipelineConfig, Sensitivity};
pub use core_modules::detection::{BoundingBox, Detection, Point};
pub use core_modules::zone::{Rect, Zone, ZoneId, ZoneIndex, ZoneSpec};
pub use error::{Result, VisionError};
pub use pipeline::{PositionRecord, RunSummary, TrackingPipeline};

#[cfg(feature = "opencv")]
pub use core_modules::opencv_backend::{Mog2Background, OpenCvContours};
