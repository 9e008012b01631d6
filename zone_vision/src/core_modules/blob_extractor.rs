// THEORY:
// The `BlobExtractor` is the spatial half of detection. It takes the binary
// foreground mask produced by the motion segmenter and reduces it to at most one
// `Detection`: the subject.
//
// Algorithm:
// 1.  **Component labelling**: foreground pixels are grouped into 8-connected
//     components with a flood fill, scanning in raster order.
// 2.  **External contours only**: background pixels are grouped into 4-connected
//     regions, and the region touching the frame border is the "outside". A
//     component whose surrounding background is not the outside sits inside a hole
//     of another component and is ignored, as are the holes themselves.
// 3.  **Border following**: the outer border of each external component is traced
//     (Suzuki-Abe outer border following), and the polygon through the border pixel
//     centres gives the enclosed area by the shoelace formula. A filled w×h block
//     therefore has area (w-1)·(h-1).
// 4.  **Selection**: contours whose area does not exceed the sensitivity are dropped.
//     The largest survivor wins; on equal areas the first in raster order is kept.
//     An empty result is a normal outcome, not an error.
//
// Steps 1-3 sit behind `ContourFinder`. `BorderFollowing` is the built-in finder over
// `image` buffers; with the `opencv` feature the driver swaps in
// `opencv_backend::OpenCvContours` (`findContours` with `RETR_EXTERNAL`). Step 4 is
// shared, so the selection rule does not depend on the finder.
//
// Like the detector it is modelled on, the extractor is a stateless utility.

use crate::core_modules::detection::{BoundingBox, Detection, Point};
use crate::error::Result;
use image::GrayImage;

pub mod blob_extractor {
    use super::*;
    use std::collections::VecDeque;

    /// Neighbour offsets in counter-clockwise order (image y grows downwards),
    /// starting east.
    const DIRECTIONS: [(i64, i64); 8] = [
        (1, 0),
        (1, -1),
        (0, -1),
        (-1, -1),
        (-1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];
    const WEST: usize = 4;

    /// The outer contour of one external foreground component.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Contour {
        /// Border pixels in tracing order.
        pub points: Vec<Point>,
        pub bounding_box: BoundingBox,
        pub area: f64,
    }

    /// Produces the external contours of a binary mask.
    pub trait ContourFinder {
        /// Outer contour of every foreground component that is not nested inside
        /// another component's hole, in raster order of each contour's first pixel.
        fn external_contours(&mut self, mask: &GrayImage) -> Result<Vec<Contour>>;
    }

    /// Border following over `image` buffers.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct BorderFollowing;

    impl ContourFinder for BorderFollowing {
        fn external_contours(&mut self, mask: &GrayImage) -> Result<Vec<Contour>> {
            Ok(find_external_contours(mask))
        }
    }

    /// Selects the largest external contour whose area exceeds `sensitivity`.
    pub fn extract(mask: &GrayImage, sensitivity: u32) -> Option<Detection> {
        select_largest(find_external_contours(mask), sensitivity)
    }

    /// The largest of `contours` whose area exceeds `sensitivity`, as a detection.
    pub fn select_largest(contours: impl IntoIterator<Item = Contour>, sensitivity: u32) -> Option<Detection> {
        let mut best: Option<Contour> = None;
        for contour in contours {
            if contour.area <= sensitivity as f64 {
                continue;
            }
            // Strict `>` keeps the earliest contour among equals.
            if best.as_ref().is_none_or(|b| contour.area > b.area) {
                best = Some(contour);
            }
        }
        best.map(|contour| Detection::from_box(contour.bounding_box, contour.area))
    }

    /// Returns the outer contour of every foreground component that is not nested
    /// inside another component's hole, in raster order of their first pixel.
    pub fn find_external_contours(mask: &GrayImage) -> Vec<Contour> {
        let (width, height) = mask.dimensions();
        let w = width as usize;
        let h = height as usize;
        if w == 0 || h == 0 {
            return Vec::new();
        }
        let foreground: Vec<bool> = mask.pixels().map(|p| p.0[0] > 0).collect();
        let outside = label_outside_background(&foreground, w, h);

        let mut component = vec![0u32; w * h];
        let mut next_label = 0u32;
        let mut contours = Vec::new();

        for y in 0..h {
            for x in 0..w {
                let index = y * w + x;
                if !foreground[index] || component[index] != 0 {
                    continue;
                }
                next_label += 1;
                flood_component(&foreground, &mut component, w, h, x, y, next_label);

                // This is the component's first raster pixel, so the pixel above it is
                // background belonging to whatever region surrounds the component.
                let is_external = y == 0 || outside[index - w];
                if !is_external {
                    continue;
                }

                let label = next_label;
                let inside = |px: i64, py: i64| {
                    px >= 0
                        && py >= 0
                        && (px as usize) < w
                        && (py as usize) < h
                        && component[py as usize * w + px as usize] == label
                };
                let points = trace_outer_border((x as i64, y as i64), inside);
                contours.push(contour_from_points(points));
            }
        }

        contours
    }

    /// Marks background pixels 4-connected to the frame border.
    fn label_outside_background(foreground: &[bool], w: usize, h: usize) -> Vec<bool> {
        let mut outside = vec![false; w * h];
        let mut queue = VecDeque::new();

        let seed = |x: usize, y: usize, outside: &mut Vec<bool>, queue: &mut VecDeque<(usize, usize)>| {
            let index = y * w + x;
            if !foreground[index] && !outside[index] {
                outside[index] = true;
                queue.push_back((x, y));
            }
        };
        for x in 0..w {
            seed(x, 0, &mut outside, &mut queue);
            seed(x, h - 1, &mut outside, &mut queue);
        }
        for y in 0..h {
            seed(0, y, &mut outside, &mut queue);
            seed(w - 1, y, &mut outside, &mut queue);
        }

        while let Some((x, y)) = queue.pop_front() {
            for (dx, dy) in [(0i64, 1i64), (0, -1), (1, 0), (-1, 0)] {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx >= 0 && nx < w as i64 && ny >= 0 && ny < h as i64 {
                    seed(nx as usize, ny as usize, &mut outside, &mut queue);
                }
            }
        }

        outside
    }

    /// Labels the 8-connected foreground component containing (x, y).
    fn flood_component(
        foreground: &[bool],
        component: &mut [u32],
        w: usize,
        h: usize,
        x: usize,
        y: usize,
        label: u32,
    ) {
        let mut stack = vec![(x, y)];
        component[y * w + x] = label;

        while let Some((cx, cy)) = stack.pop() {
            for (dx, dy) in DIRECTIONS {
                let nx = cx as i64 + dx;
                let ny = cy as i64 + dy;
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let index = ny as usize * w + nx as usize;
                if foreground[index] && component[index] == 0 {
                    component[index] = label;
                    stack.push((nx as usize, ny as usize));
                }
            }
        }
    }

    fn direction_between(from: (i64, i64), to: (i64, i64)) -> usize {
        let delta = (to.0 - from.0, to.1 - from.1);
        DIRECTIONS
            .iter()
            .position(|&d| d == delta)
            .unwrap_or(WEST)
    }

    /// Follows the outer border of a component from its first raster pixel, whose
    /// west neighbour is known to be background.
    fn trace_outer_border(start: (i64, i64), inside: impl Fn(i64, i64) -> bool) -> Vec<Point> {
        let step = |p: (i64, i64), d: usize| (p.0 + DIRECTIONS[d].0, p.1 + DIRECTIONS[d].1);
        let to_point = |p: (i64, i64)| Point::new(p.0 as u32, p.1 as u32);

        // Clockwise from the west neighbour for the first border pixel.
        let first = (0..8)
            .map(|k| (WEST + 8 - k) % 8)
            .map(|d| step(start, d))
            .find(|&p| inside(p.0, p.1));
        let Some(first) = first else {
            return vec![to_point(start)];
        };

        let mut points = Vec::new();
        let mut previous = first;
        let mut current = start;
        loop {
            // Counter-clockwise, starting just after the pixel we came from.
            let back = direction_between(current, previous);
            let next = (1..=8)
                .map(|k| step(current, (back + k) % 8))
                .find(|&p| inside(p.0, p.1))
                .unwrap_or(current);

            points.push(to_point(current));
            if next == start && current == first {
                break;
            }
            previous = current;
            current = next;
        }
        points
    }

    fn contour_from_points(points: Vec<Point>) -> Contour {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        for point in &points {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }

        let mut twice_area = 0i64;
        for (i, a) in points.iter().enumerate() {
            let b = points[(i + 1) % points.len()];
            twice_area += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
        }

        Contour {
            bounding_box: BoundingBox {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
            },
            area: twice_area.abs() as f64 / 2.0,
            points,
        }
    }
}
