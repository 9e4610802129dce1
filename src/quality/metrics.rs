//! Raw photometric measurements on a grayscale still.
//!
//! Each function returns a physical quantity (variance, percentile, angle,
//! rate); normalisation into `[0, 1]` scores happens in the analyzer.
use crate::edges::{edge_map, laplacian_variance, Window};
use crate::hough::{detect_lines, HoughParams};
use crate::image::resample::fit_long_edge;
use crate::image::{ImageF32, ImageU8, ImageView};
use std::f32::consts::{FRAC_PI_2, PI};

/// 256-bin luminance histogram.
pub fn histogram(img: &ImageU8<'_>) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for row in img.rows() {
        for &v in row {
            hist[v as usize] += 1;
        }
    }
    hist
}

/// Smallest intensity whose cumulative count reaches fraction `q` of all pixels.
pub fn percentile(hist: &[u32; 256], q: f32) -> u8 {
    let total: u64 = hist.iter().map(|&c| c as u64).sum();
    if total == 0 {
        return 0;
    }
    let target = ((q.clamp(0.0, 1.0) as f64) * total as f64).ceil().max(1.0) as u64;
    let mut acc = 0u64;
    for (v, &c) in hist.iter().enumerate() {
        acc += c as u64;
        if acc >= target {
            return v as u8;
        }
    }
    255
}

/// Whole-image Laplacian variance.
pub fn sharpness(img: &ImageU8<'_>) -> f32 {
    laplacian_variance(img, Window::full(img.w, img.h))
}

/// Low percentile of the per-tile intensity variance over `tile × tile`
/// blocks. Flat paper dominates the low tail, so this tracks sensor noise
/// rather than content.
pub fn tile_noise_variance(img: &ImageU8<'_>, tile: usize, q: f32) -> f32 {
    let tile = tile.max(2);
    let mut vars = Vec::with_capacity((img.w / tile) * (img.h / tile));
    for ty in 0..img.h / tile {
        for tx in 0..img.w / tile {
            let mut sum = 0.0f64;
            let mut sum_sq = 0.0f64;
            for y in ty * tile..(ty + 1) * tile {
                for &v in &img.row(y)[tx * tile..(tx + 1) * tile] {
                    let v = v as f64;
                    sum += v;
                    sum_sq += v * v;
                }
            }
            let n = (tile * tile) as f64;
            let mean = sum / n;
            vars.push((sum_sq / n - mean * mean).max(0.0) as f32);
        }
    }
    if vars.is_empty() {
        return 0.0;
    }
    vars.sort_by(f32::total_cmp);
    let idx = ((vars.len() - 1) as f32 * q.clamp(0.0, 1.0)).round() as usize;
    vars[idx]
}

/// Signed angle (radians) of the dominant straight structure relative to the
/// nearest image axis; `None` when no line clears the vote floor.
///
/// Positive values mean the content is rotated clockwise on screen.
pub fn dominant_skew(img: &ImageU8<'_>, long_edge: usize, edge_threshold: f32) -> Option<f32> {
    let (small, _) = fit_long_edge(img, long_edge);
    let (w, h) = (small.width(), small.height());
    if w < 8 || h < 8 {
        return None;
    }
    let l = ImageF32::from_u8(&small.as_view());
    let edges = edge_map(&l, edge_threshold);
    let params = HoughParams {
        min_votes: ((w.min(h) as f32) * 0.2).max(10.0) as u32,
        max_lines: 4,
        ..HoughParams::default()
    };
    let line = detect_lines(&edges, &params).into_iter().next()?;
    let axis = [0.0, FRAC_PI_2, PI]
        .into_iter()
        .min_by(|a, b| (line.theta - a).abs().total_cmp(&(line.theta - b).abs()))
        .unwrap_or(0.0);
    Some(line.theta - axis)
}

/// Share of horizontal neighbour pairs that flip between ink and paper under
/// a local-mean adaptive threshold.
pub fn transition_rate(img: &ImageU8<'_>, radius: usize, offset: f32) -> f32 {
    let (w, h) = (img.w, img.h);
    if w < 2 || h == 0 {
        return 0.0;
    }
    let integral = integral_image(img);
    let stride = w + 1;
    let mut flips = 0usize;
    let mut pairs = 0usize;
    for y in 0..h {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(h);
        let row = img.row(y);
        let mut prev_ink = None;
        for (x, &v) in row.iter().enumerate() {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(w);
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let mean = sum as f32 / ((y1 - y0) * (x1 - x0)) as f32;
            let ink = (v as f32) < mean - offset;
            if let Some(p) = prev_ink {
                pairs += 1;
                if p != ink {
                    flips += 1;
                }
            }
            prev_ink = Some(ink);
        }
    }
    flips as f32 / pairs.max(1) as f32
}

fn integral_image(img: &ImageU8<'_>) -> Vec<u64> {
    let (w, h) = (img.w, img.h);
    let stride = w + 1;
    let mut out = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for (x, &v) in img.row(y).iter().enumerate() {
            row_sum += v as u64;
            out[(y + 1) * stride + x + 1] = out[y * stride + x + 1] + row_sum;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::GrayImageU8;

    #[test]
    fn percentiles_of_two_level_image() {
        let mut img = GrayImageU8::filled(10, 10, 20);
        for y in 5..10 {
            for x in 0..10 {
                img.set(x, y, 200);
            }
        }
        let hist = histogram(&img.as_view());
        assert_eq!(percentile(&hist, 0.05), 20);
        assert_eq!(percentile(&hist, 0.5), 20);
        assert_eq!(percentile(&hist, 0.95), 200);
    }

    #[test]
    fn flat_tiles_have_zero_noise() {
        let img = GrayImageU8::filled(64, 64, 180);
        assert_eq!(tile_noise_variance(&img.as_view(), 8, 0.1), 0.0);
    }

    #[test]
    fn blank_page_has_no_transitions() {
        let img = GrayImageU8::filled(64, 48, 230);
        assert_eq!(transition_rate(&img.as_view(), 7, 10.0), 0.0);
    }

    #[test]
    fn axis_aligned_grid_has_no_skew() {
        let mut img = GrayImageU8::filled(200, 150, 230);
        for y in (20..130).step_by(20) {
            for x in 10..190 {
                img.set(x, y, 20);
                img.set(x, y + 1, 20);
            }
        }
        let skew = dominant_skew(&img.as_view(), 400, 0.35).expect("lines found");
        assert!(skew.abs() < 1.5f32.to_radians(), "skew {skew}");
    }
}
