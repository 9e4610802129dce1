//! Deterministic corrections for marginal stills.
//!
//! Each fix runs only when the quality report names the matching issue; the
//! tone curve always runs last. The improvement figure is a bounded
//! heuristic and is never re-checked against the analyzer.
use super::analyzer::{IssueKind, QualityReport};
use super::metrics::{histogram, percentile};
use crate::image::GrayImageU8;
use image::{Rgb, RgbImage};
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EnhanceParams {
    /// Target mean luminance for the brightness fix.
    pub target_mean: f32,
    pub max_gain: f32,
    pub stretch_low: f32,
    pub stretch_high: f32,
    /// Sharpen when the blur metric is below this.
    pub sharpen_below_blur: f32,
    pub sharpen_amount: f32,
    /// Exponent of the tone curve on each side of mid-gray (> 1 pushes ink
    /// darker and paper lighter).
    pub tone_gamma: f32,
    /// Skew below this many degrees is left alone.
    pub min_deskew_deg: f32,
    pub max_improvement: f32,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            target_mean: 150.0,
            max_gain: 2.5,
            stretch_low: 0.02,
            stretch_high: 0.98,
            sharpen_below_blur: 0.7,
            sharpen_amount: 1.0,
            tone_gamma: 1.2,
            min_deskew_deg: 1.0,
            max_improvement: 0.35,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "fix", rename_all = "snake_case")]
pub enum Fix {
    Brighten { gain: f32 },
    StretchContrast { low: u8, high: u8 },
    Deskew { angle_deg: f32 },
    Sharpen,
    ToneCurve,
}

impl Fix {
    fn expected_gain(&self) -> f32 {
        match self {
            Fix::Brighten { .. } => 0.10,
            Fix::StretchContrast { .. } => 0.15,
            Fix::Deskew { .. } => 0.08,
            Fix::Sharpen => 0.10,
            Fix::ToneCurve => 0.03,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Enhancement {
    pub image: RgbImage,
    pub fixes: Vec<Fix>,
    /// Advisory score gain in `[0, max_improvement]`.
    pub estimated_improvement: f32,
}

pub struct ImageEnhancer {
    params: EnhanceParams,
}

impl ImageEnhancer {
    pub fn new(params: EnhanceParams) -> Self {
        Self { params }
    }

    pub fn enhance(&self, rgb: &RgbImage, report: &QualityReport) -> Enhancement {
        let p = &self.params;
        let mut img = rgb.clone();
        let mut fixes = Vec::new();

        if report.has(IssueKind::Dark) {
            let mean = report.measurements.mean_luma.max(1.0);
            let gain = (p.target_mean / mean).clamp(1.0, p.max_gain);
            if gain > 1.0 {
                brighten(&mut img, gain);
                fixes.push(Fix::Brighten { gain });
            }
        }
        if report.has(IssueKind::LowContrast) {
            if let Some((low, high)) = stretch_contrast(&mut img, p.stretch_low, p.stretch_high) {
                fixes.push(Fix::StretchContrast { low, high });
            }
        }
        let skew = report.measurements.skew_deg;
        if report.has(IssueKind::Skewed) && skew.abs() >= p.min_deskew_deg {
            img = rotate_bilinear(&img, -skew.to_radians(), Rgb([255, 255, 255]));
            fixes.push(Fix::Deskew { angle_deg: -skew });
        }
        if report.metrics.blur < p.sharpen_below_blur {
            img = unsharp_mask(&img, p.sharpen_amount);
            fixes.push(Fix::Sharpen);
        }
        tone_curve(&mut img, p.tone_gamma);
        fixes.push(Fix::ToneCurve);

        let estimated_improvement = fixes
            .iter()
            .map(Fix::expected_gain)
            .sum::<f32>()
            .min(p.max_improvement);
        debug!(
            "ImageEnhancer: applied {:?} (est. +{:.2})",
            fixes, estimated_improvement
        );
        Enhancement {
            image: img,
            fixes,
            estimated_improvement,
        }
    }
}

impl Default for ImageEnhancer {
    fn default() -> Self {
        Self::new(EnhanceParams::default())
    }
}

fn map_channels(img: &mut RgbImage, lut: &[u8; 256]) {
    for px in img.pixels_mut() {
        for c in px.0.iter_mut() {
            *c = lut[*c as usize];
        }
    }
}

/// Multiply every channel by `gain`.
pub fn brighten(img: &mut RgbImage, gain: f32) {
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        *out = (v as f32 * gain).round().clamp(0.0, 255.0) as u8;
    }
    map_channels(img, &lut);
}

/// Linear stretch mapping the luminance percentiles `low_q`/`high_q` to 0/255.
/// Returns the clip points, or `None` when the range is already flat.
pub fn stretch_contrast(img: &mut RgbImage, low_q: f32, high_q: f32) -> Option<(u8, u8)> {
    let gray = GrayImageU8::from_rgb(img);
    let hist = histogram(&gray.as_view());
    let low = percentile(&hist, low_q);
    let high = percentile(&hist, high_q);
    if high <= low {
        return None;
    }
    let span = (high - low) as f32;
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        let t = (v as f32 - low as f32) / span;
        *out = (t * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    map_channels(img, &lut);
    Some((low, high))
}

/// S-shaped document curve: values below mid-gray are pulled down, values
/// above are pushed up.
pub fn tone_curve(img: &mut RgbImage, gamma: f32) {
    let mut lut = [0u8; 256];
    for (v, out) in lut.iter_mut().enumerate() {
        let x = v as f32 / 255.0;
        let y = if x < 0.5 {
            0.5 * (2.0 * x).powf(gamma)
        } else {
            1.0 - 0.5 * (2.0 * (1.0 - x)).powf(gamma)
        };
        *out = (y * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    map_channels(img, &lut);
}

/// `v + amount·(v − box3x3(v))` per channel; borders are copied.
pub fn unsharp_mask(img: &RgbImage, amount: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    let mut out = img.clone();
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut sum = [0u32; 3];
            for dy in 0..3 {
                for dx in 0..3 {
                    let p = img.get_pixel(x + dx - 1, y + dy - 1).0;
                    for c in 0..3 {
                        sum[c] += p[c] as u32;
                    }
                }
            }
            let center = img.get_pixel(x, y).0;
            let mut px = [0u8; 3];
            for c in 0..3 {
                let v = center[c] as f32;
                let blur = sum[c] as f32 / 9.0;
                px[c] = (v + amount * (v - blur)).round().clamp(0.0, 255.0) as u8;
            }
            out.put_pixel(x, y, Rgb(px));
        }
    }
    out
}

/// Rotate content by `angle` radians about the image centre (positive is
/// clockwise on screen), sampling bilinearly and filling uncovered pixels.
pub fn rotate_bilinear(img: &RgbImage, angle: f32, fill: Rgb<u8>) -> RgbImage {
    let (w, h) = img.dimensions();
    let mut out = RgbImage::from_pixel(w, h, fill);
    let (cx, cy) = ((w as f32 - 1.0) * 0.5, (h as f32 - 1.0) * 0.5);
    // inverse map: source = R(-angle)·(dest − c) + c
    let (s, c) = (-angle).sin_cos();
    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let sx = c * dx - s * dy + cx;
            let sy = s * dx + c * dy + cy;
            if let Some(px) = sample_bilinear(img, sx, sy) {
                out.put_pixel(x, y, px);
            }
        }
    }
    out
}

fn sample_bilinear(img: &RgbImage, x: f32, y: f32) -> Option<Rgb<u8>> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x1, y0).0;
    let p01 = img.get_pixel(x0, y1).0;
    let p11 = img.get_pixel(x1, y1).0;
    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(out))
}
