// THEORY:
// OpenCV implementations of the two detection seams, built with the `opencv` feature.
//
// - `Mog2Background` is a `MotionSegmenter` over OpenCV's `BackgroundSubtractorMOG2`,
//   configured from the same `BackgroundConfig` as `MixtureBackground`. It yields the
//   same three-level mask (0, shadow value, 255). The first frame is learned and
//   reported as background, as `MixtureBackground` does; OpenCV alone would report an
//   unmodelled frame as all foreground.
// - `OpenCvContours` is a `ContourFinder` over `imgproc::find_contours` with
//   `RETR_EXTERNAL`, using `contour_area` and `bounding_rect` for the measurements.
//   OpenCV does not promise an order for its contour list, so contours are re-sorted
//   into raster order of their first point. That keeps the tie-break of
//   `blob_extractor::select_largest` identical across finders.
//
// Frames cross the boundary by copying `image` buffers into `Mat`s of the matching
// type. Both buffers are tightly packed rows, so a straight byte copy is exact.

use crate::config::BackgroundConfig;
use crate::core_modules::blob_extractor::blob_extractor::{Contour, ContourFinder};
use crate::core_modules::detection::{BoundingBox, Point};
use crate::core_modules::motion_segmenter::MotionSegmenter;
use crate::error::Result;
use image::{GrayImage, RgbImage};
use opencv::{
    core::{self, Mat, Scalar, Vector},
    imgproc,
    prelude::*,
    video::{self, BackgroundSubtractorTrait},
};
use tracing::debug;

/// Lets OpenCV pick the learning rate from its history, like `MixtureBackground`.
const AUTOMATIC_LEARNING_RATE: f64 = -1.0;

/// `MotionSegmenter` backed by OpenCV's MOG2 subtractor.
pub struct Mog2Background {
    subtractor: core::Ptr<video::BackgroundSubtractorMOG2>,
    mask: Mat,
    frames_seen: u64,
}

impl Mog2Background {
    pub fn new(config: &BackgroundConfig) -> Result<Self> {
        let mut subtractor = video::create_background_subtractor_mog2(
            config.history as i32,
            config.variance_threshold as f64,
            config.detect_shadows,
        )?;
        subtractor.set_n_mixtures(config.max_modes.clamp(1, u8::MAX as usize) as i32)?;
        subtractor.set_background_ratio(config.background_ratio as f64)?;
        subtractor.set_var_threshold_gen(config.variance_threshold_gen as f64)?;
        subtractor.set_var_init(config.initial_variance as f64)?;
        subtractor.set_var_min(config.min_variance as f64)?;
        subtractor.set_var_max(config.max_variance as f64)?;
        subtractor.set_complexity_reduction_threshold(config.complexity_reduction as f64)?;
        subtractor.set_shadow_value(config.shadow_value as i32)?;
        subtractor.set_shadow_threshold(config.shadow_ratio as f64)?;
        debug!(history = config.history, shadows = config.detect_shadows, "created MOG2 subtractor");

        Ok(Self {
            subtractor,
            mask: Mat::default(),
            frames_seen: 0,
        })
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl MotionSegmenter for Mog2Background {
    fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage> {
        let (width, height) = frame.dimensions();
        let frame_mat = mat_from_bytes(width, height, core::CV_8UC3, frame.as_raw())?;
        BackgroundSubtractorTrait::apply(
            &mut self.subtractor,
            &frame_mat,
            &mut self.mask,
            AUTOMATIC_LEARNING_RATE,
        )?;
        self.frames_seen += 1;

        if self.frames_seen == 1 {
            return Ok(GrayImage::new(width, height));
        }
        gray_from_mat(&self.mask)
    }
}

/// `ContourFinder` backed by `imgproc::find_contours`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenCvContours;

impl ContourFinder for OpenCvContours {
    fn external_contours(&mut self, mask: &GrayImage) -> Result<Vec<Contour>> {
        let (width, height) = mask.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }
        let mut mask_mat = mat_from_bytes(width, height, core::CV_8UC1, mask.as_raw())?;

        let mut found: Vector<Vector<core::Point>> = Vector::new();
        imgproc::find_contours(
            &mut mask_mat,
            &mut found,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_NONE,
            core::Point::new(0, 0),
        )?;

        let mut contours = Vec::with_capacity(found.len());
        for contour in found.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            let rect = imgproc::bounding_rect(&contour)?;
            let points: Vec<Point> = contour
                .iter()
                .map(|p| Point::new(p.x.max(0) as u32, p.y.max(0) as u32))
                .collect();
            if points.is_empty() {
                continue;
            }
            contours.push(Contour {
                points,
                bounding_box: BoundingBox {
                    x: rect.x.max(0) as u32,
                    y: rect.y.max(0) as u32,
                    width: rect.width.max(0) as u32,
                    height: rect.height.max(0) as u32,
                },
                area,
            });
        }
        contours.sort_by_key(|c| (c.points[0].y, c.points[0].x));
        Ok(contours)
    }
}

fn mat_from_bytes(width: u32, height: u32, typ: i32, bytes: &[u8]) -> Result<Mat> {
    let mut mat = Mat::new_rows_cols_with_default(height as i32, width as i32, typ, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(bytes);
    Ok(mat)
}

fn gray_from_mat(mat: &Mat) -> Result<GrayImage> {
    let (width, height) = (mat.cols().max(0) as u32, mat.rows().max(0) as u32);
    let bytes = mat.data_bytes()?.to_vec();
    GrayImage::from_raw(width, height, bytes).ok_or_else(|| {
        opencv::Error::new(core::StsUnmatchedSizes, "foreground mask is not a packed 8-bit image").into()
    })
}
