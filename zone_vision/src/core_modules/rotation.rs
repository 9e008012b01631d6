// THEORY:
// Frame rotation used to square up footage filmed at an angle before zones are drawn.
// The canvas grows so no part of the source is cropped; uncovered corners are black.

use image::{Rgb, RgbImage};

/// Size of the canvas that holds `width` × `height` rotated by `degrees`.
pub fn rotated_bounds(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (sin, cos) = (sin.abs(), cos.abs());
    let w = width as f64;
    let h = height as f64;
    ((h * sin + w * cos) as u32, (h * cos + w * sin) as u32)
}

/// Rotates `image` counter-clockwise by `degrees` about its centre, enlarging the
/// canvas to fit, with bilinear sampling.
pub fn rotate_expand(image: &RgbImage, degrees: f64) -> RgbImage {
    let (width, height) = image.dimensions();
    let (bound_w, bound_h) = rotated_bounds(width, height, degrees);
    let (sin, cos) = degrees.to_radians().sin_cos();

    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;
    // Forward map: dst = A·src + t, with A = [[cos, sin], [-sin, cos]].
    let tx = (1.0 - cos) * cx - sin * cy + (bound_w as f64 / 2.0 - cx);
    let ty = sin * cx + (1.0 - cos) * cy + (bound_h as f64 / 2.0 - cy);

    let mut rotated = RgbImage::new(bound_w, bound_h);
    for (x, y, out) in rotated.enumerate_pixels_mut() {
        let dx = x as f64 - tx;
        let dy = y as f64 - ty;
        // A is orthonormal, so its inverse is its transpose.
        let sx = cos * dx - sin * dy;
        let sy = sin * dx + cos * dy;
        *out = sample_bilinear(image, sx, sy);
    }
    rotated
}

fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (width, height) = image.dimensions();
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let texel = |xi: f64, yi: f64| -> [f64; 3] {
        if xi < 0.0 || yi < 0.0 || xi >= width as f64 || yi >= height as f64 {
            return [0.0; 3];
        }
        let p = image.get_pixel(xi as u32, yi as u32).0;
        [p[0] as f64, p[1] as f64, p[2] as f64]
    };

    let p00 = texel(x0, y0);
    let p10 = texel(x0 + 1.0, y0);
    let p01 = texel(x0, y0 + 1.0);
    let p11 = texel(x0 + 1.0, y0 + 1.0);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 50]))
    }

    #[test]
    fn zero_rotation_is_identity() {
        let image = gradient(8, 5);
        assert_eq!(rotate_expand(&image, 0.0), image);
    }

    #[test]
    fn quarter_turn_swaps_dimensions() {
        assert_eq!(rotated_bounds(640, 480, 90.0), (480, 640));
        let rotated = rotate_expand(&gradient(8, 4), 90.0);
        assert_eq!(rotated.dimensions(), (4, 8));
    }

    #[test]
    fn diagonal_rotation_grows_canvas() {
        let (w, h) = rotated_bounds(100, 100, 45.0);
        assert_eq!((w, h), (141, 141));
    }

    #[test]
    fn half_turn_keeps_centre_content() {
        let image = RgbImage::from_pixel(10, 10, Rgb([200, 100, 50]));
        let rotated = rotate_expand(&image, 180.0);
        assert_eq!(rotated.dimensions(), (10, 10));
        assert_eq!(*rotated.get_pixel(5, 5), Rgb([200, 100, 50]));
    }
}
