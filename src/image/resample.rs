//! Box-filter (area average) resampling.
//!
//! Every destination pixel averages the source rectangle it covers, which
//! doubles as the anti-aliasing step for the small thumbnails used by the
//! fingerprinter and the detection downscale.
use super::traits::ImageView;
use super::u8::{GrayImageU8, ImageU8};
use image::RgbImage;

/// Source span `[start, end)` covered by destination index `i` of `dst` cells.
#[inline]
fn span(i: usize, dst: usize, src: usize) -> (usize, usize) {
    let start = i * src / dst;
    let end = ((i + 1) * src / dst).max(start + 1).min(src);
    (start, end)
}

/// Area-average `gray` down to `dst_w × dst_h`.
///
/// Returns an empty image when either side is zero.
pub fn downsample_area(gray: &ImageU8<'_>, dst_w: usize, dst_h: usize) -> GrayImageU8 {
    if gray.w == 0 || gray.h == 0 || dst_w == 0 || dst_h == 0 {
        return GrayImageU8::filled(0, 0, 0);
    }
    let mut out = GrayImageU8::filled(dst_w, dst_h, 0);
    for dy in 0..dst_h {
        let (y0, y1) = span(dy, dst_h, gray.h);
        for dx in 0..dst_w {
            let (x0, x1) = span(dx, dst_w, gray.w);
            let mut sum = 0u32;
            for y in y0..y1 {
                let row = gray.row(y);
                sum += row[x0..x1].iter().map(|&v| v as u32).sum::<u32>();
            }
            let count = ((y1 - y0) * (x1 - x0)) as u32;
            out.set(dx, dy, ((sum + count / 2) / count) as u8);
        }
    }
    out
}

/// Downscale so the long edge is at most `max_long_edge`, keeping aspect.
///
/// Returns the image and the factor `native / downscaled` (1.0 when no
/// resampling was needed).
pub fn fit_long_edge(gray: &ImageU8<'_>, max_long_edge: usize) -> (GrayImageU8, f32) {
    let long = gray.w.max(gray.h);
    if long <= max_long_edge || max_long_edge == 0 {
        let data = gray.rows().flat_map(|r| r.iter().copied()).collect();
        let owned = GrayImageU8::new(gray.w, gray.h, data)
            .unwrap_or_else(|_| GrayImageU8::filled(0, 0, 0));
        return (owned, 1.0);
    }
    let scale = long as f32 / max_long_edge as f32;
    let dst_w = ((gray.w as f32 / scale).round() as usize).max(1);
    let dst_h = ((gray.h as f32 / scale).round() as usize).max(1);
    (downsample_area(gray, dst_w, dst_h), scale)
}

/// Area-average an RGB image down to `dst_w × dst_h` pixels.
pub fn downsample_rgb(rgb: &RgbImage, dst_w: usize, dst_h: usize) -> Vec<[u8; 3]> {
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);
    if w == 0 || h == 0 || dst_w == 0 || dst_h == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(dst_w * dst_h);
    for dy in 0..dst_h {
        let (y0, y1) = span(dy, dst_h, h);
        for dx in 0..dst_w {
            let (x0, x1) = span(dx, dst_w, w);
            let mut acc = [0u32; 3];
            for y in y0..y1 {
                for x in x0..x1 {
                    let p = rgb.get_pixel(x as u32, y as u32).0;
                    acc[0] += p[0] as u32;
                    acc[1] += p[1] as u32;
                    acc[2] += p[2] as u32;
                }
            }
            let count = ((y1 - y0) * (x1 - x0)) as u32;
            out.push([
                ((acc[0] + count / 2) / count) as u8,
                ((acc[1] + count / 2) / count) as u8,
                ((acc[2] + count / 2) / count) as u8,
            ]);
        }
    }
    out
}
