// THEORY:
// The `MotionSegmenter` is the temporal half of detection. It learns what the empty
// arena looks like and reports, for each new frame, which pixels do not fit that
// learned background.
//
// Key architectural principles:
// 1.  **Black-box contract**: the rest of the engine only sees `apply(frame) -> mask`.
//     Any adaptive background algorithm fits, as long as it is deterministic for a
//     given frame order.
// 2.  **Stateful and order-dependent**: every call both reads and updates hidden
//     per-pixel state. Frames must be fed exactly once, in playback order. Skipping,
//     reordering or processing frames concurrently corrupts the model.
// 3.  **Two backends**: with the `opencv` feature the driver uses OpenCV's MOG2
//     subtractor (`opencv_backend::Mog2Background`). `MixtureBackground` is the
//     dependency-light default built on `image` buffers only.
// 4.  **Mixture of Gaussians**: `MixtureBackground` keeps a small, weight-sorted set
//     of colour modes per pixel (adaptive Gaussian mixture in the style of Zivkovic).
//     The strongest modes whose weights add up to the background ratio describe the
//     background; a pixel close to one of them is background, a pixel that is a
//     uniformly darker version of one of them is a shadow, anything else is
//     foreground.
// 5.  **Fixed cutoff**: the raw mask has three levels (0 background, shadow value,
//     255 foreground). `threshold` turns it into a binary indicator, and the default
//     cutoff discards shadows.

use crate::config::BackgroundConfig;
use crate::error::Result;
use image::{GrayImage, Luma, RgbImage};

const FOREGROUND: u8 = 255;
const BACKGROUND: u8 = 0;

/// Stateful frame-to-mask segmentation.
pub trait MotionSegmenter {
    /// Classifies every pixel of `frame` and updates the model.
    fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage>;
}

/// Binarizes a raw mask: values strictly above `cutoff` become 255, the rest 0.
pub fn threshold(mask: &GrayImage, cutoff: u8) -> GrayImage {
    let mut binary = mask.clone();
    for pixel in binary.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > cutoff { FOREGROUND } else { BACKGROUND };
    }
    binary
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Mode {
    weight: f32,
    mean: [f32; 3],
    /// Isotropic variance shared by the three channels.
    variance: f32,
}

/// Adaptive per-pixel Gaussian mixture background model.
pub struct MixtureBackground {
    config: BackgroundConfig,
    width: u32,
    height: u32,
    /// `slots()` modes per pixel, sorted by descending weight.
    modes: Vec<Mode>,
    mode_counts: Vec<u8>,
    frames_seen: u64,
}

impl MixtureBackground {
    pub fn new(config: BackgroundConfig) -> Self {
        Self {
            config,
            width: 0,
            height: 0,
            modes: Vec::new(),
            mode_counts: Vec::new(),
            frames_seen: 0,
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// The learning rate used for the next frame: fast while warming up, settling at
    /// `1 / history`.
    pub fn learning_rate(&self) -> f32 {
        let window = (2 * (self.frames_seen + 1)).min(self.config.history.max(1) as u64);
        1.0 / window as f32
    }

    /// Modes kept per pixel. Per-pixel counts are stored as `u8`.
    fn slots(&self) -> usize {
        self.config.max_modes.clamp(1, u8::MAX as usize)
    }

    fn reset(&mut self, width: u32, height: u32) {
        let pixels = width as usize * height as usize;
        let slots = self.slots();
        self.width = width;
        self.height = height;
        self.modes = vec![Mode::default(); pixels * slots];
        self.mode_counts = vec![0; pixels];
        self.frames_seen = 0;
    }

    /// Classifies one pixel against its modes, then folds the pixel into them.
    fn update_pixel(&mut self, index: usize, value: [f32; 3], alpha: f32) -> u8 {
        let slots = self.slots();
        let cfg = &self.config;
        let modes = &mut self.modes[index * slots..(index + 1) * slots];
        let mut count = self.mode_counts[index] as usize;

        // --- 1. Classification against the current model ---
        // An uninitialized pixel is learned silently rather than reported as motion.
        let mut is_background = count == 0;
        let mut cumulative = 0.0;
        for mode in &modes[..count] {
            if cumulative >= cfg.background_ratio {
                break;
            }
            if squared_distance(&value, &mode.mean) < cfg.variance_threshold * mode.variance {
                is_background = true;
                break;
            }
            cumulative += mode.weight;
        }
        let is_shadow = !is_background && cfg.detect_shadows && Self::is_shadow(cfg, &modes[..count], &value);

        // --- 2. Model update ---
        let decay = alpha * cfg.complexity_reduction;
        let mut matched = false;
        for mode in modes[..count].iter_mut() {
            mode.weight = (1.0 - alpha) * mode.weight - decay;
            if matched {
                continue;
            }
            let dist2 = squared_distance(&value, &mode.mean);
            if dist2 < cfg.variance_threshold_gen * mode.variance {
                matched = true;
                mode.weight += alpha;
                let k = if mode.weight > 0.0 { (alpha / mode.weight).min(1.0) } else { 1.0 };
                for c in 0..3 {
                    mode.mean[c] += k * (value[c] - mode.mean[c]);
                }
                mode.variance = (mode.variance + k * (dist2 - mode.variance))
                    .clamp(cfg.min_variance, cfg.max_variance);
            }
        }

        // Drop modes whose weight decayed away, keeping the rest in order.
        let mut kept = 0;
        for i in 0..count {
            if modes[i].weight > 0.0 {
                modes[kept] = modes[i];
                kept += 1;
            }
        }
        count = kept;

        if !matched {
            let fresh = Mode {
                weight: alpha,
                mean: value,
                variance: cfg.initial_variance,
            };
            if count < slots {
                modes[count] = fresh;
                count += 1;
            } else {
                modes[slots - 1] = fresh;
            }
        }

        let total: f32 = modes[..count].iter().map(|m| m.weight).sum();
        if total > 0.0 {
            for mode in modes[..count].iter_mut() {
                mode.weight /= total;
            }
        }
        modes[..count].sort_by(|a, b| b.weight.total_cmp(&a.weight));
        self.mode_counts[index] = count as u8;

        if is_background {
            BACKGROUND
        } else if is_shadow {
            self.config.shadow_value
        } else {
            FOREGROUND
        }
    }

    /// A shadow is a background colour scaled down by a factor in `[shadow_ratio, 1]`.
    fn is_shadow(cfg: &BackgroundConfig, modes: &[Mode], value: &[f32; 3]) -> bool {
        let mut cumulative = 0.0;
        for mode in modes {
            let numerator: f32 = (0..3).map(|c| value[c] * mode.mean[c]).sum();
            let denominator: f32 = mode.mean.iter().map(|m| m * m).sum();
            if denominator > 0.0 {
                let a = numerator / denominator;
                if (cfg.shadow_ratio..=1.0).contains(&a) {
                    let dist2a: f32 = (0..3).map(|c| (a * mode.mean[c] - value[c]).powi(2)).sum();
                    if dist2a < cfg.variance_threshold * mode.variance * a * a {
                        return true;
                    }
                }
            }
            cumulative += mode.weight;
            if cumulative > cfg.background_ratio {
                break;
            }
        }
        false
    }
}

impl Default for MixtureBackground {
    fn default() -> Self {
        Self::new(BackgroundConfig::default())
    }
}

impl MotionSegmenter for MixtureBackground {
    fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage> {
        let (width, height) = frame.dimensions();
        if width != self.width || height != self.height {
            self.reset(width, height);
        }

        let alpha = self.learning_rate();
        let mut mask = GrayImage::new(width, height);
        for (index, (pixel, out)) in frame.pixels().zip(mask.pixels_mut()).enumerate() {
            let value = [pixel.0[0] as f32, pixel.0[1] as f32, pixel.0[2] as f32];
            *out = Luma([self.update_pixel(index, value, alpha)]);
        }
        self.frames_seen += 1;
        Ok(mask)
    }
}

fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    (0..3).map(|c| (a[c] - b[c]).powi(2)).sum()
}
