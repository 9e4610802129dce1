//! Structured per-frame detection diagnostics.
//!
//! [`DetectionReport`] records what each detector stage produced and why a
//! frame was rejected. It is serializable so tools can dump it as JSON next
//! to the inspected image.
use crate::geometry::Quad;
use crate::hough::Line;
use serde::Serialize;

/// Why the detector returned no quad for a frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Rejection {
    /// Frame smaller than 3×3 or empty.
    EmptyFrame,
    /// Fewer than two lines in an orientation bucket.
    TooFewLines { horizontal: usize, vertical: usize },
    /// Two lines failed to intersect (parallel).
    NoIntersection,
    /// An intersection fell outside the frame margin.
    CornerOutOfFrame { corner: [f32; 2] },
    /// The outline crosses itself or collapses.
    InvalidShape,
    /// Area fraction outside the accepted band.
    AreaOutOfRange { fraction: f32 },
    /// An interior angle outside the accepted band.
    AngleOutOfRange { angle_deg: f32 },
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdown {
    pub downscale_ms: f64,
    pub edges_ms: f64,
    pub hough_ms: f64,
    pub quad_ms: f64,
    pub total_ms: f64,
}

/// Full record of one detection pass.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub width: usize,
    pub height: usize,
    /// Internal downscale applied on top of the frame (1 when none).
    pub internal_scale: f32,
    pub edge_pixels: usize,
    pub lines: Vec<Line>,
    pub horizontal_lines: usize,
    pub vertical_lines: usize,
    /// Quad in the frame's coordinates when accepted.
    pub quad: Option<Quad>,
    pub area_fraction: Option<f32>,
    pub rejection: Option<Rejection>,
    pub timings: TimingBreakdown,
}

impl DetectionReport {
    pub(crate) fn empty(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            internal_scale: 1.0,
            edge_pixels: 0,
            lines: Vec::new(),
            horizontal_lines: 0,
            vertical_lines: 0,
            quad: None,
            area_fraction: None,
            rejection: None,
            timings: TimingBreakdown::default(),
        }
    }
}
