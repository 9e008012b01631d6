// THEORY:
// The `pipeline` module is the top-level API of the tracking half of the engine.
// It wires the per-frame stages together in a fixed order:
//
//   frame -> MotionSegmenter -> threshold -> ContourFinder -> select -> ZoneResolver -> record
//
// and owns the only live `TrackState` and `HeatmapGrid` of a run. The segmenter and the
// contour finder are type parameters; `new` uses the `image`-only defaults and
// `with_opencv` (feature `opencv`) uses OpenCV's MOG2 and `findContours`. Every pulled frame
// produces exactly one `PositionRecord`, whatever the outcome of detection, so the
// record cadence always equals the frame cadence.
//
// The loop is strictly sequential. The segmenter's model is order-dependent, so the
// pipeline never looks ahead, never skips and never processes two frames at once.
// When the source runs dry (or fails to decode a frame) the loop ends and the sink is
// finalized. A failing detection backend or sink aborts the run with an error.

use crate::config::PipelineConfig;
use crate::core_modules::blob_extractor::blob_extractor::{self, BorderFollowing, ContourFinder};
use crate::core_modules::detection::Point;
use crate::core_modules::heatmap::HeatmapGrid;
use crate::core_modules::motion_segmenter::{threshold, MixtureBackground, MotionSegmenter};
use crate::core_modules::track_state::TrackState;
use crate::core_modules::zone::{ZoneId, ZoneIndex};
use crate::core_modules::zone_resolver::ZoneResolver;
use crate::error::Result;
use crate::frame_source::{validate_frame_rate, Frame, FrameSource};
use crate::persistence::RecordSink;
use image::GrayImage;
use tracing::{debug, info};

const PROGRESS_INTERVAL: u64 = 300;

/// Where the subject was at one instant of the recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionRecord {
    /// Seconds since the start of the media (not since the start frame).
    pub time: f64,
    pub position: Option<Point>,
    pub zone: Option<ZoneId>,
}

/// Totals for a completed `run`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub detections: u64,
    pub first_time: Option<f64>,
    pub last_time: Option<f64>,
}

impl RunSummary {
    /// Media seconds covered by the emitted records.
    pub fn elapsed_seconds(&self) -> f64 {
        match (self.first_time, self.last_time) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }
}

/// The tracking engine for a single run.
pub struct TrackingPipeline<M: MotionSegmenter = MixtureBackground, C: ContourFinder = BorderFollowing> {
    segmenter: M,
    contours: C,
    resolver: ZoneResolver,
    state: TrackState,
    heatmap: HeatmapGrid,
    config: PipelineConfig,
    frame_rate: f64,
}

impl TrackingPipeline<MixtureBackground, BorderFollowing> {
    /// Builds a pipeline with the default mixture background model.
    /// `resolution` sizes the heatmap and should match the frames that will be fed.
    pub fn new(
        config: PipelineConfig,
        zones: ZoneIndex,
        resolution: (u32, u32),
        frame_rate: f64,
    ) -> Result<Self> {
        let segmenter = MixtureBackground::new(config.background.clone());
        Self::with_segmenter(segmenter, config, zones, resolution, frame_rate)
    }
}

#[cfg(feature = "opencv")]
impl TrackingPipeline<crate::Mog2Background, crate::OpenCvContours> {
    /// Builds a pipeline on OpenCV's MOG2 subtractor and contour finder.
    pub fn with_opencv(
        config: PipelineConfig,
        zones: ZoneIndex,
        resolution: (u32, u32),
        frame_rate: f64,
    ) -> Result<Self> {
        let segmenter = crate::Mog2Background::new(&config.background)?;
        Self::with_backends(segmenter, crate::OpenCvContours, config, zones, resolution, frame_rate)
    }
}

impl<M: MotionSegmenter> TrackingPipeline<M, BorderFollowing> {
    pub fn with_segmenter(
        segmenter: M,
        config: PipelineConfig,
        zones: ZoneIndex,
        resolution: (u32, u32),
        frame_rate: f64,
    ) -> Result<Self> {
        Self::with_backends(segmenter, BorderFollowing, config, zones, resolution, frame_rate)
    }
}

impl<M: MotionSegmenter, C: ContourFinder> TrackingPipeline<M, C> {
    pub fn with_backends(
        segmenter: M,
        contours: C,
        config: PipelineConfig,
        zones: ZoneIndex,
        resolution: (u32, u32),
        frame_rate: f64,
    ) -> Result<Self> {
        let frame_rate = validate_frame_rate(frame_rate)?;
        let (width, height) = resolution;
        Ok(Self {
            segmenter,
            contours,
            resolver: ZoneResolver::new(zones, config.heatmap_policy),
            state: TrackState::new(),
            heatmap: HeatmapGrid::new(width, height),
            config,
            frame_rate,
        })
    }

    /// Runs one frame through every stage and returns its record.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<PositionRecord> {
        let raw_mask = self.segmenter.apply(&frame.image)?;
        self.process_mask(frame.index, &raw_mask)
    }

    /// The stages after segmentation, for a raw mask of frame `frame_index`.
    pub fn process_mask(&mut self, frame_index: u64, raw_mask: &GrayImage) -> Result<PositionRecord> {
        let binary = threshold(raw_mask, self.config.mask_threshold.0);
        let contours = self.contours.external_contours(&binary)?;
        let detection = blob_extractor::select_largest(contours, self.config.sensitivity.area());
        let resolution = self
            .resolver
            .resolve(detection.as_ref(), &mut self.state, &mut self.heatmap);

        let record = PositionRecord {
            time: frame_index as f64 / self.frame_rate,
            position: resolution.position,
            zone: resolution.zone,
        };
        debug!(
            time = record.time,
            position = ?record.position,
            zone = ?record.zone,
            "frame resolved"
        );
        Ok(record)
    }

    /// Pulls frames until the source is exhausted, appending one record per frame.
    ///
    /// The sink is finalized on graceful exhaustion. Errors come from the detection
    /// backend or the sink.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        K: RecordSink + ?Sized,
    {
        info!(
            zones = self.resolver.zones().len(),
            sensitivity = %self.config.sensitivity,
            frame_rate = self.frame_rate,
            "tracking started"
        );

        let detections_before = self.state.detections;
        let mut summary = RunSummary::default();
        while let Some(frame) = source.next_frame() {
            let record = self.process_frame(&frame)?;
            sink.append(&record)?;

            summary.frames_processed += 1;
            summary.first_time.get_or_insert(record.time);
            summary.last_time = Some(record.time);
            if summary.frames_processed % PROGRESS_INTERVAL == 0 {
                info!(
                    frames = summary.frames_processed,
                    time = record.time,
                    zone = ?record.zone,
                    "tracking progress"
                );
            }
        }
        sink.finish()?;

        summary.detections = self.state.detections - detections_before;
        info!(
            frames = summary.frames_processed,
            detections = summary.detections,
            elapsed_seconds = summary.elapsed_seconds(),
            "tracking finished"
        );
        Ok(summary)
    }

    pub fn heatmap(&self) -> &HeatmapGrid {
        &self.heatmap
    }

    pub fn into_heatmap(self) -> HeatmapGrid {
        self.heatmap
    }

    pub fn state(&self) -> &TrackState {
        &self.state
    }

    pub fn zones(&self) -> &ZoneIndex {
        self.resolver.zones()
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }
}
