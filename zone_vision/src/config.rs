// THEORY:
// Configuration for the tracking loop. Everything here is decided during the setup
// phase and is immutable once the loop starts. The only value with interesting
// behaviour is `Sensitivity`: it comes from a human, so a bad value is recovered
// locally with a warning instead of aborting the run.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Minimum contour area (in square pixels) a foreground region must exceed to
/// count as the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "u32")]
pub struct Sensitivity(u32);

impl Sensitivity {
    pub const DEFAULT: Sensitivity = Sensitivity(500);

    /// Returns `None` for zero; every positive area is a valid threshold.
    pub fn new(area: u32) -> Option<Self> {
        (area > 0).then_some(Self(area))
    }

    pub fn area(self) -> u32 {
        self.0
    }

    /// Parses user-entered text. Blank input silently selects the default; anything
    /// that is not a positive integer selects the default and logs a warning.
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::DEFAULT;
        }
        match trimmed.parse::<i64>() {
            Ok(value) => Self::from(value),
            Err(_) => {
                warn!(input = trimmed, default = Self::DEFAULT.0, "invalid sensitivity; using default");
                Self::DEFAULT
            }
        }
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<i64> for Sensitivity {
    fn from(value: i64) -> Self {
        match u32::try_from(value).ok().and_then(Self::new) {
            Some(sensitivity) => sensitivity,
            None => {
                warn!(value, default = Self::DEFAULT.0, "sensitivity must be a positive integer; using default");
                Self::DEFAULT
            }
        }
    }
}

impl From<Sensitivity> for u32 {
    fn from(value: Sensitivity) -> Self {
        value.0
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} px²", self.0)
    }
}

/// Which detections feed the heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatmapPolicy {
    /// Every genuine detection, including those outside all zones.
    #[default]
    EveryDetection,
    /// Only detections whose centroid resolved to a zone by containment.
    ZonedOnly,
}

/// Tunables for the adaptive mixture-of-Gaussians background model.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundConfig {
    /// Number of frames that dominate the learning rate once warmed up.
    pub history: u32,
    /// Squared Mahalanobis distance under which a pixel matches a background mode.
    pub variance_threshold: f32,
    /// Squared distance under which a pixel updates an existing mode rather than
    /// spawning a new one.
    pub variance_threshold_gen: f32,
    /// Cumulative weight of the strongest modes that are treated as background.
    pub background_ratio: f32,
    pub max_modes: usize,
    pub initial_variance: f32,
    pub min_variance: f32,
    pub max_variance: f32,
    /// Weight decay applied to every mode each frame, scaled by the learning rate.
    pub complexity_reduction: f32,
    pub detect_shadows: bool,
    pub shadow_value: u8,
    /// Darkening ratio at or above which a foreground pixel is reclassified as shadow.
    pub shadow_ratio: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            history: 500,
            variance_threshold: 16.0,
            variance_threshold_gen: 9.0,
            background_ratio: 0.9,
            max_modes: 5,
            initial_variance: 15.0,
            min_variance: 4.0,
            max_variance: 75.0,
            complexity_reduction: 0.05,
            detect_shadows: true,
            shadow_value: 127,
            shadow_ratio: 0.5,
        }
    }
}

/// Configuration for the `TrackingPipeline`.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub sensitivity: Sensitivity,
    /// Foreground mask values strictly above this become foreground.
    pub mask_threshold: MaskThreshold,
    pub heatmap_policy: HeatmapPolicy,
    pub background: BackgroundConfig,
}

/// Fixed cutoff applied to the background model's output. The default of 200 keeps
/// definite foreground (255) and drops detected shadows (127).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskThreshold(pub u8);

impl Default for MaskThreshold {
    fn default() -> Self {
        Self(200)
    }
}
