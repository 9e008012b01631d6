//! Command-line surface of `zone_tracker`.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use zone_vision::{HeatmapPolicy, Rect};

#[derive(Parser, Debug)]
#[command(name = "zone_tracker")]
#[command(author, version, about = "Track a subject through rectangular zones and report dwell times")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the tracking loop over a video or a directory of frames
    Track(TrackArgs),

    /// Compute dwell and transition reports from existing record files
    Analyze(AnalyzeArgs),

    /// Rotate every frame of an image sequence, enlarging the canvas to fit
    Rotate(RotateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct TrackArgs {
    /// Video file (requires the `opencv` feature) or directory of frame images
    pub input: PathBuf,

    /// JSON settings file; flags given on the command line take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Frame rate; required for frame directories unless set in the settings file
    #[arg(long)]
    pub fps: Option<f64>,

    /// JSON file holding the zone list
    #[arg(long)]
    pub zones: Option<PathBuf>,

    /// Extra zone as `x,y,width,height`; may be repeated
    #[arg(long = "zone", value_parser = parse_zone_rect)]
    pub zone: Vec<Rect>,

    /// Minimum blob area in pixels; invalid values fall back to 500
    #[arg(long)]
    pub sensitivity: Option<String>,

    /// Start time in seconds
    #[arg(long)]
    pub start: Option<f64>,

    /// Rotate every frame by this many degrees (counter-clockwise) before tracking
    #[arg(long)]
    pub rotate: Option<f64>,

    /// Which detections are counted on the heatmap
    #[arg(long, value_enum)]
    pub heatmap_policy: Option<HeatmapPolicyArg>,

    /// Root directory for per-video output folders
    #[arg(long, default_value = "output")]
    pub output_root: PathBuf,

    /// Skip writing the dwell reports after tracking
    #[arg(long)]
    pub no_report: bool,

    /// Marker used to derive the subject label from the output file name
    #[arg(long)]
    pub subject_marker: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Record files (`*_positions.csv`)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Marker used to derive subject labels from file names (e.g. `KM`)
    #[arg(long)]
    pub subject_marker: Option<String>,

    /// Only log the totals; do not write report tables
    #[arg(long)]
    pub no_report: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RotateArgs {
    /// Directory of frame images
    pub input: PathBuf,

    /// Directory that receives the rotated frames
    pub output: PathBuf,

    /// Rotation angle in degrees, counter-clockwise
    #[arg(long, allow_negative_numbers = true)]
    pub degrees: f64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatmapPolicyArg {
    EveryDetection,
    ZonedOnly,
}

impl From<HeatmapPolicyArg> for HeatmapPolicy {
    fn from(arg: HeatmapPolicyArg) -> Self {
        match arg {
            HeatmapPolicyArg::EveryDetection => HeatmapPolicy::EveryDetection,
            HeatmapPolicyArg::ZonedOnly => HeatmapPolicy::ZonedOnly,
        }
    }
}

fn parse_zone_rect(value: &str) -> Result<Rect, String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [x, y, width, height] = parts.as_slice() else {
        return Err(format!("expected x,y,width,height but got `{value}`"));
    };
    let number = |text: &str| {
        text.parse::<u32>()
            .map_err(|_| format!("`{text}` is not a non-negative integer"))
    };
    Ok(Rect::new(number(*x)?, number(*y)?, number(*width)?, number(*height)?))
}
