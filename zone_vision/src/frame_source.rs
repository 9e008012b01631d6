// THEORY:
// Frame sources are the engine's only input. They are pulled strictly in order by
// the tracking loop; seeking is a setup-phase operation used to choose the start
// frame and is never called from inside the loop.
//
// A frame that cannot be decoded mid-run is reported as end-of-stream (`None`), with
// a warning, so the loop exits cleanly and still finalizes its outputs. Problems
// that are visible before the loop starts (missing directory, no frames, unreadable
// first frame) are hard errors.

use crate::core_modules::rotation::{rotate_expand, rotated_bounds};
use crate::error::{Result, VisionError};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FRAME_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// A decoded frame and its position in the source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub image: RgbImage,
}

impl Frame {
    /// Media time of this frame in seconds.
    pub fn timestamp(&self, frame_rate: f64) -> f64 {
        self.index as f64 / frame_rate
    }
}

pub trait FrameSource {
    fn frame_rate(&self) -> f64;

    /// (width, height) of the frames this source yields.
    fn resolution(&self) -> (u32, u32);

    /// Positions the source so the next pulled frame has index `frame_index`.
    fn seek(&mut self, frame_index: u64) -> Result<()>;

    /// The next frame, or `None` at end of stream or on a read failure.
    fn next_frame(&mut self) -> Option<Frame>;
}

pub(crate) fn validate_frame_rate(frame_rate: f64) -> Result<f64> {
    if frame_rate.is_finite() && frame_rate > 0.0 {
        Ok(frame_rate)
    } else {
        Err(VisionError::InvalidFrameRate(frame_rate))
    }
}

/// Tolerance under which a product like `0.29 * 100.0` counts as landing on a frame.
const FRAME_BOUNDARY_EPSILON: f64 = 1e-9;

/// Converts a start time in seconds to the index of the frame shown at that time.
pub fn frame_index_at(seconds: f64, frame_rate: f64) -> u64 {
    if seconds <= 0.0 || !seconds.is_finite() {
        return 0;
    }
    let exact = seconds * frame_rate;
    let nearest = exact.round();
    if (exact - nearest).abs() <= FRAME_BOUNDARY_EPSILON * nearest.max(1.0) {
        nearest as u64
    } else {
        exact.floor() as u64
    }
}

/// A directory of still images played back in file-name order.
pub struct ImageSequenceSource {
    directory: PathBuf,
    paths: Vec<PathBuf>,
    frame_rate: f64,
    resolution: (u32, u32),
    cursor: usize,
}

impl ImageSequenceSource {
    pub fn open(directory: impl AsRef<Path>, frame_rate: f64) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let frame_rate = validate_frame_rate(frame_rate)?;

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&directory)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_frame_file(path))
            .collect();
        paths.sort();

        let first = paths
            .first()
            .ok_or_else(|| VisionError::EmptySource(directory.clone()))?;
        // The whole first frame is decoded so a damaged body fails here, not mid-run.
        let decoded = image::open(first)?;
        let resolution = (decoded.width(), decoded.height());
        debug!(directory = %directory.display(), frames = paths.len(), ?resolution, "opened image sequence");

        Ok(Self {
            directory,
            paths,
            frame_rate,
            resolution,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        if frame_index >= self.paths.len() as u64 {
            return Err(VisionError::SeekOutOfRange {
                requested: frame_index,
                available: self.paths.len() as u64,
            });
        }
        self.cursor = frame_index as usize;
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let path = self.paths.get(self.cursor)?;
        match image::open(path) {
            Ok(decoded) => {
                let frame = Frame {
                    index: self.cursor as u64,
                    image: decoded.into_rgb8(),
                };
                self.cursor += 1;
                Some(frame)
            }
            Err(e) => {
                warn!(
                    directory = %self.directory.display(),
                    frame = %path.display(),
                    "frame could not be decoded, treating as end of stream: {e}"
                );
                self.cursor = self.paths.len();
                None
            }
        }
    }
}

/// Frames held in memory.
pub struct VecFrameSource {
    frames: Vec<RgbImage>,
    frame_rate: f64,
    cursor: usize,
}

impl VecFrameSource {
    pub fn new(frames: Vec<RgbImage>, frame_rate: f64) -> Result<Self> {
        Ok(Self {
            frames,
            frame_rate: validate_frame_rate(frame_rate)?,
            cursor: 0,
        })
    }
}

impl FrameSource for VecFrameSource {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn resolution(&self) -> (u32, u32) {
        self.frames.first().map(|f| f.dimensions()).unwrap_or((0, 0))
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        if frame_index >= self.frames.len() as u64 {
            return Err(VisionError::SeekOutOfRange {
                requested: frame_index,
                available: self.frames.len() as u64,
            });
        }
        self.cursor = frame_index as usize;
        Ok(())
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let image = self.frames.get(self.cursor)?.clone();
        let frame = Frame {
            index: self.cursor as u64,
            image,
        };
        self.cursor += 1;
        Some(frame)
    }
}

/// Rotates every frame of the wrapped source.
pub struct RotatedSource<S> {
    inner: S,
    degrees: f64,
}

impl<S: FrameSource> RotatedSource<S> {
    pub fn new(inner: S, degrees: f64) -> Self {
        Self { inner, degrees }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: FrameSource> FrameSource for RotatedSource<S> {
    fn frame_rate(&self) -> f64 {
        self.inner.frame_rate()
    }

    fn resolution(&self) -> (u32, u32) {
        let (width, height) = self.inner.resolution();
        rotated_bounds(width, height, self.degrees)
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        self.inner.seek(frame_index)
    }

    fn next_frame(&mut self) -> Option<Frame> {
        self.inner.next_frame().map(|frame| Frame {
            index: frame.index,
            image: rotate_expand(&frame.image, self.degrees),
        })
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }

    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        (**self).seek(frame_index)
    }

    fn next_frame(&mut self) -> Option<Frame> {
        (**self).next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn write_frames(dir: &Path, count: u32) {
        for i in 0..count {
            let image = RgbImage::from_pixel(6, 4, Rgb([i as u8 * 20, 0, 0]));
            image.save(dir.join(format!("frame_{i:04}.png"))).unwrap();
        }
    }

    #[test]
    fn reads_frames_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 3);
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), 25.0).unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.resolution(), (6, 4));

        let reds: Vec<u8> = std::iter::from_fn(|| source.next_frame())
            .map(|f| f.image.get_pixel(0, 0).0[0])
            .collect();
        assert_eq!(reds, vec![0, 20, 40]);
    }

    #[test]
    fn seek_positions_next_frame() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 4);
        let mut source = ImageSequenceSource::open(dir.path(), 10.0).unwrap();
        source.seek(2).unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.index, 2);
        assert_eq!(frame.timestamp(10.0), 0.2);
        assert!(matches!(
            source.seek(4),
            Err(VisionError::SeekOutOfRange { requested: 4, available: 4 })
        ));
    }

    #[test]
    fn empty_or_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path(), 30.0),
            Err(VisionError::EmptySource(_))
        ));
        assert!(matches!(
            ImageSequenceSource::open(dir.path().join("missing"), 30.0),
            Err(VisionError::Io(_))
        ));
    }

    #[test]
    fn invalid_frame_rate_is_fatal() {
        assert!(matches!(
            VecFrameSource::new(Vec::new(), 0.0),
            Err(VisionError::InvalidFrameRate(_))
        ));
        assert!(VecFrameSource::new(Vec::new(), f64::NAN).is_err());
    }

    #[test]
    fn corrupt_frame_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 2);
        std::fs::write(dir.path().join("frame_0001.png"), b"garbage").unwrap();

        let mut source = ImageSequenceSource::open(dir.path(), 30.0).unwrap();
        assert!(source.next_frame().is_some());
        assert!(source.next_frame().is_none());
        assert!(source.next_frame().is_none());
    }

    #[test]
    fn start_time_maps_to_frame_index() {
        assert_eq!(frame_index_at(60.0, 30.0), 1800);
        assert_eq!(frame_index_at(1.05, 10.0), 10);
        assert_eq!(frame_index_at(-3.0, 10.0), 0);
        assert_eq!(frame_index_at(0.29, 100.0), 29);
        assert_eq!(frame_index_at(0.57, 100.0), 57);
        assert_eq!(frame_index_at(0.299, 100.0), 29);
    }

    #[test]
    fn first_frame_with_damaged_body_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), 2);
        let first = dir.path().join("frame_0000.png");
        let bytes = std::fs::read(&first).unwrap();
        let idat = bytes.windows(4).position(|w| w == b"IDAT").unwrap();
        // Keep the header chunks and cut the image data short.
        std::fs::write(&first, &bytes[..idat + 6]).unwrap();

        assert!(matches!(
            ImageSequenceSource::open(dir.path(), 30.0),
            Err(VisionError::Image(_))
        ));
    }

    #[test]
    fn rotated_source_reports_rotated_resolution() {
        let frames = vec![RgbImage::new(8, 4), RgbImage::new(8, 4)];
        let mut source = RotatedSource::new(VecFrameSource::new(frames, 5.0).unwrap(), 90.0);
        assert_eq!(source.resolution(), (4, 8));
        assert_eq!(source.next_frame().unwrap().image.dimensions(), (4, 8));
    }
}
