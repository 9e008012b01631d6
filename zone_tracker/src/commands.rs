// THEORY:
// Each subcommand is a straight-line script over the `zone_vision` API:
//
// - `track`: settings -> source -> start seek -> zones -> tracking loop -> records,
//   heatmap -> (optional) dwell reports. All setup failures abort before the loop.
// - `analyze`: batch dwell analysis over existing record files.
// - `rotate`: rewrite an image sequence rotated by a fixed angle.
//
// With the `opencv` feature, `track` runs on OpenCV's MOG2 subtractor and contour
// finder; without it, on the library's `image`-only defaults.
//
// The tracking loop is synchronous and CPU-bound, so `main` runs `track` and `rotate`
// on tokio's blocking pool.

use crate::cli::{AnalyzeArgs, RotateArgs, TrackArgs};
use crate::settings::{self, TrackingSettings};
use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zone_vision::analysis::{analyze_file, analyze_files, AnalysisOptions, SubjectReport};
use zone_vision::frame_source::{frame_index_at, FrameSource, ImageSequenceSource, RotatedSource};
use zone_vision::persistence::{CsvRecordSink, OutputLayout};
use zone_vision::{PipelineConfig, TrackingPipeline, ZoneIndex};

/// Frame rate assumed for frame directories when none is configured.
const DEFAULT_SEQUENCE_FPS: f64 = 30.0;

fn open_source(input: &Path, frame_rate: Option<f64>) -> anyhow::Result<Box<dyn FrameSource>> {
    if input.is_dir() {
        let frame_rate = frame_rate.unwrap_or_else(|| {
            warn!(fps = DEFAULT_SEQUENCE_FPS, "no frame rate configured for frame directory; assuming default");
            DEFAULT_SEQUENCE_FPS
        });
        let source = ImageSequenceSource::open(input, frame_rate)
            .with_context(|| format!("opening frame directory {}", input.display()))?;
        return Ok(Box::new(source));
    }
    open_video(input, frame_rate)
}

#[cfg(feature = "opencv")]
fn open_video(input: &Path, frame_rate: Option<f64>) -> anyhow::Result<Box<dyn FrameSource>> {
    let source = crate::video::VideoFileSource::open(input, frame_rate)
        .with_context(|| format!("opening video {}", input.display()))?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "opencv"))]
fn open_video(input: &Path, _frame_rate: Option<f64>) -> anyhow::Result<Box<dyn FrameSource>> {
    if !input.exists() {
        bail!("input {} does not exist", input.display());
    }
    bail!(
        "{} is not a frame directory; video files need zone_tracker built with the `opencv` feature",
        input.display()
    )
}

#[cfg(feature = "opencv")]
type Pipeline = TrackingPipeline<zone_vision::Mog2Background, zone_vision::OpenCvContours>;

#[cfg(not(feature = "opencv"))]
type Pipeline = TrackingPipeline;

#[cfg(feature = "opencv")]
fn build_pipeline(
    config: PipelineConfig,
    zones: ZoneIndex,
    resolution: (u32, u32),
    frame_rate: f64,
) -> anyhow::Result<Pipeline> {
    TrackingPipeline::with_opencv(config, zones, resolution, frame_rate).context("creating OpenCV detection backend")
}

#[cfg(not(feature = "opencv"))]
fn build_pipeline(
    config: PipelineConfig,
    zones: ZoneIndex,
    resolution: (u32, u32),
    frame_rate: f64,
) -> anyhow::Result<Pipeline> {
    Ok(TrackingPipeline::new(config, zones, resolution, frame_rate)?)
}

pub fn track(args: TrackArgs) -> anyhow::Result<()> {
    let file_settings = match &args.config {
        Some(path) => TrackingSettings::load(path)?,
        None => TrackingSettings::default(),
    };
    let resolved = settings::resolve(file_settings, &args)?;
    if resolved.zones.is_empty() {
        warn!("no zones defined; every record will have an empty zone");
    }

    let mut source = open_source(&args.input, resolved.frame_rate)?;
    if let Some(degrees) = resolved.rotate_degrees {
        source = Box::new(RotatedSource::new(source, degrees));
    }

    let start_frame = frame_index_at(resolved.start_seconds, source.frame_rate());
    if start_frame > 0 {
        source
            .seek(start_frame)
            .with_context(|| format!("seeking to {}s (frame {start_frame})", resolved.start_seconds))?;
    }
    info!(
        input = %args.input.display(),
        start_frame,
        resolution = ?source.resolution(),
        "source ready"
    );

    let layout = OutputLayout::for_input(&args.output_root, &args.input);
    layout
        .create()
        .with_context(|| format!("creating output directory {}", layout.directory().display()))?;

    let mut pipeline = build_pipeline(
        resolved.pipeline,
        resolved.zones,
        source.resolution(),
        source.frame_rate(),
    )?;
    let positions_path = layout.positions_path();
    let mut sink = CsvRecordSink::create(&positions_path)
        .with_context(|| format!("creating {}", positions_path.display()))?;
    pipeline
        .run(&mut source, &mut sink)
        .with_context(|| format!("writing {}", positions_path.display()))?;

    let heatmap_path = layout.heatmap_path();
    pipeline
        .heatmap()
        .save(&heatmap_path)
        .with_context(|| format!("writing {}", heatmap_path.display()))?;
    info!(records = %positions_path.display(), heatmap = %heatmap_path.display(), "outputs written");

    if !args.no_report {
        let options = AnalysisOptions {
            subject_marker: args.subject_marker.clone(),
            write_reports: true,
        };
        let report = analyze_file(&positions_path, &options)
            .with_context(|| format!("analyzing {}", positions_path.display()))?;
        log_report(&report);
    }
    Ok(())
}

pub async fn analyze(args: AnalyzeArgs) -> anyhow::Result<()> {
    let options = AnalysisOptions {
        subject_marker: args.subject_marker,
        write_reports: !args.no_report,
    };
    let paths = args.files.clone();
    let results = analyze_files(args.files, options).await;

    let mut failed = 0;
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(report) => log_report(&report),
            Err(e) => {
                failed += 1;
                warn!(file = %path.display(), "analysis failed: {e}");
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} record files could not be analyzed", paths.len());
    }
    Ok(())
}

fn log_report(report: &SubjectReport) {
    let summary = &report.summary;
    for (zone, seconds) in &summary.per_zone_seconds {
        info!(subject = %report.subject, %zone, seconds = *seconds, "zone total");
    }
    info!(
        subject = %report.subject,
        unzoned_seconds = summary.unzoned_seconds,
        elapsed_seconds = summary.elapsed_seconds(),
        transitions = summary.transitions.len(),
        "dwell summary"
    );
    if let Some((times, latency)) = &report.report_files {
        info!(times = %times.display(), latency = %latency.display(), "reports written");
    }
}

pub fn rotate(args: RotateArgs) -> anyhow::Result<()> {
    let source = ImageSequenceSource::open(&args.input, 1.0)
        .with_context(|| format!("opening frame directory {}", args.input.display()))?;
    let paths: Vec<PathBuf> = source.paths().to_vec();
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let mut rotated = RotatedSource::new(source, args.degrees);
    let mut written = 0usize;
    while let Some(frame) = rotated.next_frame() {
        let Some(name) = paths.get(frame.index as usize).and_then(|p| p.file_name()) else {
            continue;
        };
        let target = args.output.join(name);
        frame
            .image
            .save(&target)
            .with_context(|| format!("writing {}", target.display()))?;
        written += 1;
    }

    info!(frames = written, degrees = args.degrees, output = %args.output.display(), "rotation finished");
    if written < paths.len() {
        warn!(expected = paths.len(), written, "some frames could not be read");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn rotate_rewrites_every_frame() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for i in 0..3 {
            RgbImage::from_pixel(8, 4, Rgb([10, 20, 30]))
                .save(input.path().join(format!("f{i}.png")))
                .unwrap();
        }

        rotate(RotateArgs {
            input: input.path().to_path_buf(),
            output: output.path().join("rotated"),
            degrees: 90.0,
        })
        .unwrap();

        for i in 0..3 {
            let frame = image::open(output.path().join("rotated").join(format!("f{i}.png"))).unwrap();
            assert_eq!((frame.width(), frame.height()), (4, 8));
        }
    }

    #[test]
    fn track_writes_records_heatmap_and_reports() {
        let frames = tempfile::tempdir().unwrap();
        for i in 0..12u32 {
            let mut frame = RgbImage::from_pixel(64, 48, Rgb([50, 50, 50]));
            if i >= 8 {
                for y in 10..40 {
                    for x in 30..60 {
                        frame.put_pixel(x, y, Rgb([220, 220, 220]));
                    }
                }
            }
            frame.save(frames.path().join(format!("{i:03}.png"))).unwrap();
        }
        let output_root = tempfile::tempdir().unwrap();

        let args = TrackArgs {
            input: frames.path().to_path_buf(),
            config: None,
            fps: Some(4.0),
            zones: None,
            zone: vec![zone_vision::Rect::new(0, 0, 32, 48), zone_vision::Rect::new(32, 0, 32, 48)],
            sensitivity: None,
            start: None,
            rotate: None,
            heatmap_policy: None,
            output_root: output_root.path().to_path_buf(),
            no_report: false,
            subject_marker: None,
        };
        track(args).unwrap();

        let stem = frames.path().file_name().unwrap().to_string_lossy().into_owned();
        let dir = output_root.path().join(&stem);
        let records = zone_vision::persistence::read_records(dir.join(format!("{stem}_positions.csv"))).unwrap();
        assert_eq!(records.len(), 12);
        assert_eq!(records[11].zone, Some(zone_vision::ZoneId(2)));
        assert!(dir.join(format!("{stem}_heatmap.png")).exists());

        let times = std::fs::read_to_string(dir.join(format!("{stem}_Zone_Times.csv"))).unwrap();
        assert_eq!(times, "Zone,TotalSeconds\n2,0.75\n");
        assert!(dir.join(format!("{stem}_Zone_Latency.csv")).exists());
    }

    #[test]
    fn start_beyond_the_end_is_fatal() {
        let frames = tempfile::tempdir().unwrap();
        for i in 0..3 {
            RgbImage::new(8, 8).save(frames.path().join(format!("{i}.png"))).unwrap();
        }
        let output_root = tempfile::tempdir().unwrap();
        let args = TrackArgs {
            input: frames.path().to_path_buf(),
            config: None,
            fps: Some(1.0),
            zones: None,
            zone: Vec::new(),
            sensitivity: None,
            start: Some(10.0),
            rotate: None,
            heatmap_policy: None,
            output_root: output_root.path().to_path_buf(),
            no_report: true,
            subject_marker: None,
        };
        assert!(track(args).is_err());
    }
}
