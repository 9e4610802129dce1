//! Parameter types configuring the per-frame quad detector.
//!
//! Defaults target a ≤ 320 px detection frame with a single document that
//! fills a reasonable part of the view. For tuning, start with the edge
//! threshold and the minimum vote fraction.

use crate::hough::HoughParams;
use serde::Deserialize;

/// Detector-wide parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Frames with a longer edge are downscaled before detection.
    pub max_long_edge: usize,
    /// Sobel magnitude threshold on [0,1] intensities (a step of `d` gives `4·d`).
    pub edge_threshold: f32,
    /// Angular resolution of the Hough accumulator in degrees.
    pub theta_step_deg: f32,
    /// Minimum line votes as a fraction of the frame's short side.
    pub min_votes_fraction: f32,
    /// Maximum number of merged lines kept after voting.
    pub max_lines: usize,
    /// Lines closer than this in rho (px) and theta are merged.
    pub merge_rho_px: f32,
    pub merge_theta_deg: f32,
    /// Half-width of the horizontal/vertical orientation buckets in degrees.
    pub bucket_tolerance_deg: f32,
    /// Intersections may fall outside the frame by this fraction of its size.
    pub corner_margin_fraction: f32,
    /// Accepted quad area as a fraction of frame area.
    pub min_area_fraction: f32,
    pub max_area_fraction: f32,
    /// Accepted interior angle range in degrees.
    pub min_interior_angle_deg: f32,
    pub max_interior_angle_deg: f32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            max_long_edge: crate::types::DETECTION_LONG_EDGE,
            edge_threshold: 0.35,
            theta_step_deg: 1.0,
            min_votes_fraction: 0.25,
            max_lines: 16,
            merge_rho_px: 12.0,
            merge_theta_deg: 8.0,
            bucket_tolerance_deg: 25.0,
            corner_margin_fraction: 0.05,
            min_area_fraction: 0.12,
            max_area_fraction: 0.95,
            min_interior_angle_deg: 55.0,
            max_interior_angle_deg: 125.0,
        }
    }
}

impl DetectorParams {
    /// Line voting parameters for a frame of the given size.
    pub fn hough_params(&self, width: usize, height: usize) -> HoughParams {
        let short = width.min(height) as f32;
        HoughParams {
            theta_step_deg: self.theta_step_deg,
            min_votes: (short * self.min_votes_fraction).round().max(8.0) as u32,
            max_lines: self.max_lines,
            merge_rho_px: self.merge_rho_px,
            merge_theta_deg: self.merge_theta_deg,
        }
    }
}
