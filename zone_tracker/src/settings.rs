// THEORY:
// A tracking run is configured in two layers: an optional JSON settings file that
// can be kept next to a batch of recordings, and command-line flags for one-off
// overrides. `TrackingSettings` is the file layer; `resolve` folds the flags on top
// of it and produces the single `ResolvedSettings` the run uses.

use crate::cli::TrackArgs;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use zone_vision::{HeatmapPolicy, PipelineConfig, Rect, Sensitivity, ZoneIndex, ZoneSpec};

/// The JSON settings file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    pub frame_rate: Option<f64>,
    pub sensitivity: Option<Sensitivity>,
    pub start_seconds: Option<f64>,
    pub rotate_degrees: Option<f64>,
    pub heatmap_policy: Option<HeatmapPolicy>,
    pub mask_threshold: Option<u8>,
    pub zones: Vec<ZoneSpec>,
}

impl TrackingSettings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing settings file {}", path.display()))
    }
}

/// Everything a tracking run needs once setup is finished.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    /// `None` lets the source report its own rate.
    pub frame_rate: Option<f64>,
    pub start_seconds: f64,
    pub rotate_degrees: Option<f64>,
    pub pipeline: PipelineConfig,
    pub zones: ZoneIndex,
}

/// Applies command-line flags on top of the settings file.
pub fn resolve(settings: TrackingSettings, args: &TrackArgs) -> anyhow::Result<ResolvedSettings> {
    let sensitivity = match &args.sensitivity {
        Some(text) => Sensitivity::from_input(text),
        None => settings.sensitivity.unwrap_or_default(),
    };

    let mut pipeline = PipelineConfig {
        sensitivity,
        heatmap_policy: args
            .heatmap_policy
            .map(HeatmapPolicy::from)
            .or(settings.heatmap_policy)
            .unwrap_or_default(),
        ..PipelineConfig::default()
    };
    if let Some(cutoff) = settings.mask_threshold {
        pipeline.mask_threshold.0 = cutoff;
    }

    // A zone file replaces the settings-file zones; `--zone` flags are appended.
    let base: Vec<Rect> = match &args.zones {
        Some(path) => ZoneIndex::load(path)
            .with_context(|| format!("loading zones from {}", path.display()))?
            .zones()
            .iter()
            .map(|zone| zone.rect)
            .collect(),
        None => settings.zones.iter().map(ZoneSpec::to_rect).collect(),
    };
    let zones = ZoneIndex::new(base.into_iter().chain(args.zone.iter().copied()));

    Ok(ResolvedSettings {
        frame_rate: args.fps.or(settings.frame_rate),
        start_seconds: args.start.or(settings.start_seconds).unwrap_or(0.0),
        rotate_degrees: args.rotate.or(settings.rotate_degrees),
        pipeline,
        zones,
    })
}
