//! Cheap per-cycle image measurements inside a detected quad.
//!
//! All measurements run on the small detection frame and sample an inset of
//! the quad's bounding box so the document border itself does not count as
//! content.
use crate::edges::{laplacian_variance, Window};
use crate::geometry::{BBox, Quad};
use crate::image::{ImageU8, ImageView};
use serde::Serialize;

/// The seven readiness factors, each in `[0, 1]`.
///
/// `edge_density` and `coverage` are raw fractions; the engine maps them to
/// scores before weighting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Factors {
    pub quad_confidence: f32,
    pub stability: f32,
    pub quality_estimate: f32,
    pub edge_density: f32,
    pub aspect_ratio: f32,
    pub coverage: f32,
    pub focus: f32,
}

/// Pixel rectangle `[x0, x1) × [y0, y1)` covering the inner part of `bbox`.
pub(crate) fn inset_window(bbox: &BBox, inset: f32, w: usize, h: usize) -> Window {
    let dx = bbox.width() * inset;
    let dy = bbox.height() * inset;
    let clamp_x = |v: f32| v.clamp(0.0, w as f32) as usize;
    let clamp_y = |v: f32| v.clamp(0.0, h as f32) as usize;
    Window {
        x0: clamp_x(bbox.min_x + dx),
        y0: clamp_y(bbox.min_y + dy),
        x1: clamp_x(bbox.max_x - dx),
        y1: clamp_y(bbox.max_y - dy),
    }
}

/// Brightness/contrast proxy: mean distance from mid-gray and standard
/// deviation, averaged.
pub fn quality_estimate(img: &ImageU8<'_>, window: Window) -> f32 {
    let mut n = 0u64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in (window.y0..window.y1).step_by(2) {
        let row = img.row(y);
        for &v in row[window.x0..window.x1].iter().step_by(2) {
            let v = v as f64;
            sum += v;
            sum_sq += v * v;
            n += 1;
        }
    }
    if n == 0 {
        return 0.0;
    }
    let mean = sum / n as f64;
    let std = (sum_sq / n as f64 - mean * mean).max(0.0).sqrt();
    let brightness = 1.0 - ((mean - 128.0).abs() / 128.0);
    let contrast = (std / 64.0).min(1.0);
    (0.5 * brightness + 0.5 * contrast).clamp(0.0, 1.0) as f32
}

/// Fraction of horizontal neighbour pairs differing by more than `step`.
pub fn edge_density(img: &ImageU8<'_>, window: Window, step: u8) -> f32 {
    if window.x1 <= window.x0 + 1 || window.y1 <= window.y0 {
        return 0.0;
    }
    let mut pairs = 0usize;
    let mut strong = 0usize;
    for y in window.y0..window.y1 {
        let row = &img.row(y)[window.x0..window.x1];
        for pair in row.windows(2) {
            pairs += 1;
            if pair[0].abs_diff(pair[1]) > step {
                strong += 1;
            }
        }
    }
    strong as f32 / pairs.max(1) as f32
}

/// Shorter/longer ratio of the quad's mean width and height.
pub fn aspect_ratio(quad: &Quad) -> f32 {
    let (w, h) = quad.mean_extent();
    let hi = w.max(h);
    if hi <= 0.0 {
        0.0
    } else {
        w.min(h) / hi
    }
}

/// Laplacian variance around the quad centroid normalised by `target`.
pub fn focus_score(img: &ImageU8<'_>, quad: &Quad, half: usize, target: f32) -> f32 {
    let c = quad.centroid();
    let window = Window::around(c[0], c[1], half, img.w, img.h);
    let var = laplacian_variance(img, window);
    (var / target.max(1e-3)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::GrayImageU8;

    fn striped(w: usize, h: usize) -> GrayImageU8 {
        let mut img = GrayImageU8::filled(w, h, 220);
        for y in 0..h {
            for x in 0..w {
                if y % 8 < 3 && x % 6 < 3 {
                    img.set(x, y, 30);
                }
            }
        }
        img
    }

    #[test]
    fn blank_surface_has_no_edges_or_focus() {
        let img = GrayImageU8::filled(100, 80, 200);
        let quad = Quad::rect(10.0, 10.0, 90.0, 70.0);
        let win = inset_window(&quad.bbox(), 0.1, 100, 80);
        assert_eq!(edge_density(&img.as_view(), win, 24), 0.0);
        assert_eq!(focus_score(&img.as_view(), &quad, 24, 250.0), 0.0);
    }

    #[test]
    fn text_like_content_is_dense_and_sharp() {
        let img = striped(100, 80);
        let quad = Quad::rect(10.0, 10.0, 90.0, 70.0);
        let win = inset_window(&quad.bbox(), 0.1, 100, 80);
        let density = edge_density(&img.as_view(), win, 24);
        assert!(density > 0.08 && density < 0.2, "density {density}");
        assert_eq!(focus_score(&img.as_view(), &quad, 24, 250.0), 1.0);
        assert!(quality_estimate(&img.as_view(), win) > 0.5);
    }

    #[test]
    fn aspect_of_square_and_sliver() {
        assert_eq!(aspect_ratio(&Quad::rect(0.0, 0.0, 50.0, 50.0)), 1.0);
        assert!(aspect_ratio(&Quad::rect(0.0, 0.0, 100.0, 20.0)) < 0.35);
    }
}
