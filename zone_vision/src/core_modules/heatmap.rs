// THEORY:
// The `HeatmapGrid` is a pixel-resolution visit counter. Each genuine detection adds
// one to the cell under its centroid. Counts only ever grow, and increments commute,
// so unlike the rest of the tracking loop the grid does not care about frame order:
// `from_points` over any permutation of the same detections yields the same grid.

use crate::core_modules::detection::Point;
use crate::error::Result;
use image::{ImageBuffer, Luma};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatmapGrid {
    width: u32,
    height: u32,
    /// Row-major counts, indexed by `y * width + x`.
    cells: Vec<u32>,
}

impl HeatmapGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![0; width as usize * height as usize],
        }
    }

    pub fn from_points(width: u32, height: u32, points: impl IntoIterator<Item = Point>) -> Self {
        let mut grid = Self::new(width, height);
        for point in points {
            grid.increment(point);
        }
        grid
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Adds one visit at `point`. Points outside the frame are ignored.
    pub fn increment(&mut self, point: Point) {
        if point.x < self.width && point.y < self.height {
            let index = point.y as usize * self.width as usize + point.x as usize;
            self.cells[index] = self.cells[index].saturating_add(1);
        }
    }

    /// Visit count at cell (y, x).
    pub fn get(&self, x: u32, y: u32) -> u32 {
        if x < self.width && y < self.height {
            self.cells[y as usize * self.width as usize + x as usize]
        } else {
            0
        }
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().map(|&c| c as u64).sum()
    }

    pub fn max(&self) -> u32 {
        self.cells.iter().copied().max().unwrap_or(0)
    }

    /// Sums cells into a `bins_x` × `bins_y` grid of equal-width bins, returned row-major.
    pub fn binned(&self, bins_x: u32, bins_y: u32) -> Vec<Vec<u64>> {
        let bins_x = bins_x.max(1);
        let bins_y = bins_y.max(1);
        let mut bins = vec![vec![0u64; bins_x as usize]; bins_y as usize];
        if self.width == 0 || self.height == 0 {
            return bins;
        }
        for y in 0..self.height {
            let by = (y as u64 * bins_y as u64 / self.height as u64) as usize;
            for x in 0..self.width {
                let count = self.get(x, y);
                if count == 0 {
                    continue;
                }
                let bx = (x as u64 * bins_x as u64 / self.width as u64) as usize;
                bins[by][bx] += count as u64;
            }
        }
        bins
    }

    /// Renders the raw counts as a 16-bit grayscale image, saturating at `u16::MAX`.
    pub fn to_image(&self) -> ImageBuffer<Luma<u16>, Vec<u16>> {
        let data = self
            .cells
            .iter()
            .map(|&c| c.min(u16::MAX as u32) as u16)
            .collect();
        // The buffer length always matches width * height.
        ImageBuffer::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| ImageBuffer::new(self.width, self.height))
    }

    /// Writes the grid as a lossless PNG.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_image().save(path)?;
        Ok(())
    }
}
