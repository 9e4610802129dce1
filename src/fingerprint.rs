//! Multi-hash perceptual fingerprints for near-duplicate pages.
//!
//! Three cheap, independent hashes are computed per still:
//! - perceptual: low-frequency 8×8 block of a 16×16 DCT, thresholded at its
//!   median (64 bits);
//! - structural: ink density of a 4×4 grid over an Otsu-binarised 32×32
//!   thumbnail, quantised to four levels;
//! - color: presence of 12 hue buckets over an 8×8 thumbnail, gated by
//!   saturation and value.
//!
//! A capture duplicates an earlier page when its weighted similarity to any
//! earlier fingerprint exceeds the threshold. The scan is linear in the
//! number of captured pages.
use crate::error::Result;
use crate::image::io::decode_still;
use crate::image::resample::{downsample_area, downsample_rgb};
use crate::image::GrayImageU8;
use crate::tracking::PageId;
use image::RgbImage;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

const DCT_SIZE: usize = 16;
const DCT_KEEP: usize = 8;
const STRUCT_SIZE: usize = 32;
const STRUCT_GRID: usize = 4;
const COLOR_SIZE: usize = 8;
const HUE_BUCKETS: u32 = 12;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub perceptual: u64,
    /// Row-major 4×4 ink-density levels in `0..=3`.
    pub structural: [u8; 16],
    /// 12-bit hue presence map.
    pub color: u16,
    /// Hex rendering of all three hashes.
    pub combined: String,
}

impl Fingerprint {
    pub fn from_parts(perceptual: u64, structural: [u8; 16], color: u16) -> Self {
        let levels: String = structural
            .iter()
            .map(|&l| char::from(b'0' + l.min(9)))
            .collect();
        Self {
            perceptual,
            structural,
            color,
            combined: format!("{perceptual:016x}-{levels}-{color:03x}"),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FingerprintParams {
    /// Similarity strictly above which a capture is a duplicate.
    pub duplicate_threshold: f32,
    pub perceptual_weight: f32,
    pub structural_weight: f32,
    pub color_weight: f32,
    pub min_saturation: f32,
    pub min_value: f32,
}

impl Default for FingerprintParams {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.85,
            perceptual_weight: 0.50,
            structural_weight: 0.35,
            color_weight: 0.15,
            min_saturation: 0.25,
            min_value: 0.2,
        }
    }
}

/// Earlier page matched by a new capture.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMatch {
    pub page: PageId,
    pub similarity: f32,
}

pub struct SemanticFingerprinter {
    params: FingerprintParams,
    dct_basis: [[f32; DCT_SIZE]; DCT_KEEP],
}

impl SemanticFingerprinter {
    pub fn new(params: FingerprintParams) -> Self {
        let mut dct_basis = [[0.0f32; DCT_SIZE]; DCT_KEEP];
        for (u, row) in dct_basis.iter_mut().enumerate() {
            for (x, v) in row.iter_mut().enumerate() {
                *v = ((2 * x + 1) as f32 * u as f32 * PI / (2 * DCT_SIZE) as f32).cos();
            }
        }
        Self { params, dct_basis }
    }

    pub fn params(&self) -> &FingerprintParams {
        &self.params
    }

    pub fn fingerprint_encoded(&self, bytes: &[u8]) -> Result<Fingerprint> {
        Ok(self.fingerprint(&decode_still(bytes)?))
    }

    pub fn fingerprint(&self, rgb: &RgbImage) -> Fingerprint {
        let gray = GrayImageU8::from_rgb(rgb);
        Fingerprint::from_parts(
            self.perceptual_hash(&gray),
            structural_hash(&gray),
            self.color_hash(rgb),
        )
    }

    fn perceptual_hash(&self, gray: &GrayImageU8) -> u64 {
        let small = downsample_area(&gray.as_view(), DCT_SIZE, DCT_SIZE);
        if small.width() != DCT_SIZE {
            return 0;
        }
        let mut coeffs = [0.0f32; DCT_KEEP * DCT_KEEP];
        for v in 0..DCT_KEEP {
            for u in 0..DCT_KEEP {
                let mut acc = 0.0f32;
                for y in 0..DCT_SIZE {
                    let by = self.dct_basis[v][y];
                    for x in 0..DCT_SIZE {
                        acc += small.get(x, y) as f32 * self.dct_basis[u][x] * by;
                    }
                }
                coeffs[v * DCT_KEEP + u] = acc;
            }
        }
        let mut sorted = coeffs;
        sorted.sort_by(f32::total_cmp);
        let median = 0.5 * (sorted[31] + sorted[32]);
        coeffs
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > median)
            .fold(0u64, |bits, (i, _)| bits | (1u64 << i))
    }

    fn color_hash(&self, rgb: &RgbImage) -> u16 {
        let p = &self.params;
        downsample_rgb(rgb, COLOR_SIZE, COLOR_SIZE)
            .into_iter()
            .filter_map(|px| {
                let (h, s, v) = hsv(px);
                (s >= p.min_saturation && v >= p.min_value)
                    .then(|| ((h / 360.0 * HUE_BUCKETS as f32) as u32).min(HUE_BUCKETS - 1))
            })
            .fold(0u16, |bits, b| bits | (1u16 << b))
    }

    /// Weighted similarity in `[0, 1]`; symmetric, and exactly 1 for equal
    /// fingerprints.
    pub fn compare(&self, a: &Fingerprint, b: &Fingerprint) -> f32 {
        if a == b {
            return 1.0;
        }
        let p = &self.params;
        let perceptual = 1.0 - (a.perceptual ^ b.perceptual).count_ones() as f32 / 64.0;
        let structural = a
            .structural
            .iter()
            .zip(b.structural.iter())
            .map(|(&x, &y)| 1.0 - x.abs_diff(y) as f32 / 3.0)
            .sum::<f32>()
            / 16.0;
        let color = 1.0 - (a.color ^ b.color).count_ones() as f32 / HUE_BUCKETS as f32;
        (p.perceptual_weight * perceptual + p.structural_weight * structural + p.color_weight * color)
            .clamp(0.0, 1.0)
    }

    /// First earlier page (in the given order) whose similarity exceeds the
    /// duplicate threshold.
    pub fn find_duplicate(
        &self,
        candidate: &Fingerprint,
        existing: &[(PageId, Fingerprint)],
    ) -> Option<DuplicateMatch> {
        let found = existing
            .par_iter()
            .map(|(page, fp)| DuplicateMatch {
                page: *page,
                similarity: self.compare(candidate, fp),
            })
            .find_first(|m| m.similarity > self.params.duplicate_threshold);
        if let Some(m) = &found {
            debug!(
                "SemanticFingerprinter: duplicate of {} ({:.3})",
                m.page, m.similarity
            );
        }
        found
    }
}

impl Default for SemanticFingerprinter {
    fn default() -> Self {
        Self::new(FingerprintParams::default())
    }
}

/// Quantised ink density over a 4×4 grid of an Otsu-binarised thumbnail.
fn structural_hash(gray: &GrayImageU8) -> [u8; 16] {
    let mut out = [0u8; 16];
    let small = downsample_area(&gray.as_view(), STRUCT_SIZE, STRUCT_SIZE);
    if small.width() != STRUCT_SIZE {
        return out;
    }
    let threshold = otsu_threshold(small.data());
    let cell = STRUCT_SIZE / STRUCT_GRID;
    for gy in 0..STRUCT_GRID {
        for gx in 0..STRUCT_GRID {
            let mut ink = 0usize;
            for y in gy * cell..(gy + 1) * cell {
                for x in gx * cell..(gx + 1) * cell {
                    if threshold.is_some_and(|t| small.get(x, y) <= t) {
                        ink += 1;
                    }
                }
            }
            let density = ink as f32 / (cell * cell) as f32;
            out[gy * STRUCT_GRID + gx] = match density {
                d if d < 0.05 => 0,
                d if d < 0.2 => 1,
                d if d < 0.5 => 2,
                _ => 3,
            };
        }
    }
    out
}

/// Otsu's threshold; `None` for single-valued input.
pub fn otsu_threshold(pixels: &[u8]) -> Option<u8> {
    let mut hist = [0u64; 256];
    for &v in pixels {
        hist[v as usize] += 1;
    }
    let total = pixels.len() as f64;
    let sum_all: f64 = hist.iter().enumerate().map(|(v, &c)| v as f64 * c as f64).sum();
    let mut best: Option<(u8, f64)> = None;
    let mut w0 = 0.0f64;
    let mut sum0 = 0.0f64;
    for t in 0..255usize {
        w0 += hist[t] as f64;
        sum0 += t as f64 * hist[t] as f64;
        let w1 = total - w0;
        if w0 == 0.0 || w1 == 0.0 {
            continue;
        }
        let m0 = sum0 / w0;
        let m1 = (sum_all - sum0) / w1;
        let between = w0 * w1 * (m0 - m1) * (m0 - m1);
        if best.map_or(true, |(_, b)| between > b) {
            best = Some((t as u8, between));
        }
    }
    best.map(|(t, _)| t)
}

/// Hue in degrees, saturation and value in `[0, 1]`.
fn hsv(px: [u8; 3]) -> (f32, f32, f32) {
    let [r, g, b] = px.map(|c| c as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let s = if max > 0.0 { delta / max } else { 0.0 };
    let h = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    (h, s, max)
}
