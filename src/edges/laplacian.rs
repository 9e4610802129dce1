//! Variance of the 4-neighbour Laplacian, the focus/blur measure used by both
//! the per-cycle readiness focus factor and the still-image blur metric.
use crate::image::{ImageU8, ImageView};

/// Pixel window `[x0, x1) × [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl Window {
    pub fn full(w: usize, h: usize) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: w,
            y1: h,
        }
    }

    /// Square window of half-size `half` around `(cx, cy)`, clipped to `w × h`.
    pub fn around(cx: f32, cy: f32, half: usize, w: usize, h: usize) -> Self {
        let cx = cx.clamp(0.0, w as f32) as usize;
        let cy = cy.clamp(0.0, h as f32) as usize;
        Self {
            x0: cx.saturating_sub(half),
            y0: cy.saturating_sub(half),
            x1: (cx + half).min(w),
            y1: (cy + half).min(h),
        }
    }
}

/// Laplacian variance over `window` (interior pixels only), in 8-bit units².
///
/// Returns 0 when the window is smaller than 3×3.
pub fn laplacian_variance(img: &ImageU8<'_>, window: Window) -> f32 {
    let x0 = window.x0.max(1);
    let y0 = window.y0.max(1);
    let x1 = window.x1.min(img.w.saturating_sub(1));
    let y1 = window.y1.min(img.h.saturating_sub(1));
    if x1 <= x0 || y1 <= y0 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut n = 0usize;
    for y in y0..y1 {
        let prev = img.row(y - 1);
        let row = img.row(y);
        let next = img.row(y + 1);
        for x in x0..x1 {
            let lap = prev[x] as i32 + next[x] as i32 + row[x - 1] as i32 + row[x + 1] as i32
                - 4 * row[x] as i32;
            let v = lap as f64;
            sum += v;
            sum_sq += v * v;
            n += 1;
        }
    }
    let mean = sum / n as f64;
    ((sum_sq / n as f64) - mean * mean).max(0.0) as f32
}
