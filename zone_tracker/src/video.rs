// THEORY:
// Video file input through OpenCV's `VideoCapture`, built only with the `opencv`
// feature; without it the driver accepts directories of frame images. Frames are
// converted from OpenCV's BGR `Mat` to `RgbImage` once, here, so the engine only
// ever sees `image` buffers. A read failure mid-stream ends the stream.

use anyhow::bail;
use image::RgbImage;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::Path;
use tracing::{debug, warn};
use zone_vision::frame_source::{Frame, FrameSource};
use zone_vision::VisionError;

pub struct VideoFileSource {
    capture: VideoCapture,
    frame_rate: f64,
    resolution: (u32, u32),
    /// Reported by the container; zero when unknown.
    frame_count: u64,
    next_index: u64,
}

impl VideoFileSource {
    /// Opens `path`. `frame_rate` overrides the rate the container reports.
    pub fn open(path: &Path, frame_rate: Option<f64>) -> anyhow::Result<Self> {
        let capture = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            bail!("could not open video {}", path.display());
        }

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?.max(0.0) as u64;
        let frame_rate = match frame_rate {
            Some(rate) => rate,
            None => capture.get(videoio::CAP_PROP_FPS)?,
        };
        if !(frame_rate.is_finite() && frame_rate > 0.0) {
            bail!("video {} has no usable frame rate; pass --fps", path.display());
        }
        debug!(video = %path.display(), width, height, frame_count, frame_rate, "opened video");

        Ok(Self {
            capture,
            frame_rate,
            resolution: (width, height),
            frame_count,
            next_index: 0,
        })
    }

    fn read_rgb(&mut self) -> opencv::Result<Option<RgbImage>> {
        let mut bgr = Mat::default();
        if !self.capture.read(&mut bgr)? || bgr.empty() {
            return Ok(None);
        }
        let mut rgb = Mat::default();
        imgproc::cvt_color(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let (cols, rows) = (rgb.cols() as u32, rgb.rows() as u32);
        Ok(RgbImage::from_raw(cols, rows, rgb.data_bytes()?.to_vec()))
    }
}

impl FrameSource for VideoFileSource {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn seek(&mut self, frame_index: u64) -> zone_vision::Result<()> {
        if self.frame_count > 0 && frame_index >= self.frame_count {
            return Err(VisionError::SeekOutOfRange {
                requested: frame_index,
                available: self.frame_count,
            });
        }
        self.capture.set(videoio::CAP_PROP_POS_FRAMES, frame_index as f64)?;
        self.next_index = frame_index;
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Frame> {
        match self.read_rgb() {
            Ok(Some(image)) => {
                let frame = Frame {
                    index: self.next_index,
                    image,
                };
                self.next_index += 1;
                Some(frame)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(frame = self.next_index, "video read failed, treating as end of stream: {e}");
                None
            }
        }
    }
}
