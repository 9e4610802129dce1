//! Per-frame document outline detection.
//!
//! [`EdgeQuadDetector`] turns one small grayscale frame into an optional
//! [`Quad`]: Sobel edges with non-maximum suppression, Hough line voting,
//! horizontal/vertical bucketing, the four pairwise intersections of the two
//! strongest lines per bucket, then geometric validation. Returning `None`
//! is the common case and never an error.
//!
//! Typical usage:
//! ```no_run
//! use doc_capture::detector::{DetectorParams, EdgeQuadDetector};
//! use doc_capture::image::GrayImageU8;
//! use doc_capture::types::Frame;
//!
//! # fn example(gray: GrayImageU8) {
//! let mut detector = EdgeQuadDetector::new(DetectorParams::default());
//! let frame = Frame::from_gray(&gray.as_view(), 320);
//! if let Some(quad) = detector.detect(&frame) {
//!     println!("document at {:?}", quad.corners);
//! }
//! # }
//! ```
use super::params::DetectorParams;
use super::workspace::DetectorWorkspace;
use crate::diagnostics::{DetectionReport, Rejection};
use crate::edges::edge_map;
use crate::geometry::{sort_corners, Point, Quad};
use crate::hough::{detect_lines_with, Line};
use crate::image::resample::fit_long_edge;
use crate::image::{ImageF32, ImageU8};
use crate::types::Frame;
use log::debug;
use std::time::Instant;

pub struct EdgeQuadDetector {
    params: DetectorParams,
    workspace: DetectorWorkspace,
}

impl EdgeQuadDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self {
            params,
            workspace: DetectorWorkspace::new(),
        }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Detect a document outline in frame coordinates.
    pub fn detect(&mut self, frame: &Frame) -> Option<Quad> {
        self.detect_with_diagnostics(frame).quad
    }

    /// Detect and return the full stage report.
    pub fn detect_with_diagnostics(&mut self, frame: &Frame) -> DetectionReport {
        self.detect_gray(&frame.view())
    }

    /// Run detection directly on a grayscale view of any size.
    pub fn detect_gray(&mut self, gray: &ImageU8<'_>) -> DetectionReport {
        let total_start = Instant::now();
        let mut report = DetectionReport::empty(gray.w, gray.h);
        if gray.w < 3 || gray.h < 3 {
            report.rejection = Some(Rejection::EmptyFrame);
            return report;
        }

        let t = Instant::now();
        let (small, internal_scale) = fit_long_edge(gray, self.params.max_long_edge);
        report.internal_scale = internal_scale;
        report.timings.downscale_ms = ms_since(t);
        let (w, h) = (small.width(), small.height());

        let t = Instant::now();
        let l = ImageF32::from_u8(&small.as_view());
        let edges = edge_map(&l, self.params.edge_threshold);
        report.edge_pixels = edges.count();
        report.timings.edges_ms = ms_since(t);

        let t = Instant::now();
        let hough = self.params.hough_params(w, h);
        let acc = self.workspace.accumulator(w, h, hough.theta_step_deg);
        let lines = detect_lines_with(acc, &edges, &hough);
        report.timings.hough_ms = ms_since(t);

        let t = Instant::now();
        let outcome = self.lines_to_quad(&lines, w, h, &mut report);
        report.timings.quad_ms = ms_since(t);
        report.lines = lines;

        match outcome {
            Ok((quad, fraction)) => {
                let quad = if internal_scale != 1.0 {
                    quad.scaled(internal_scale)
                } else {
                    quad
                };
                report.quad = Some(quad);
                report.area_fraction = Some(fraction);
            }
            Err(rejection) => {
                debug!(
                    "EdgeQuadDetector: no quad on {}x{} frame ({:?})",
                    w, h, rejection
                );
                report.rejection = Some(rejection);
            }
        }
        report.timings.total_ms = ms_since(total_start);
        report
    }

    fn lines_to_quad(
        &self,
        lines: &[Line],
        w: usize,
        h: usize,
        report: &mut DetectionReport,
    ) -> Result<(Quad, f32), Rejection> {
        let p = &self.params;
        let tol = p.bucket_tolerance_deg.to_radians();
        let horizontal: Vec<&Line> = lines.iter().filter(|l| l.is_horizontal(tol)).collect();
        let vertical: Vec<&Line> = lines.iter().filter(|l| l.is_vertical(tol)).collect();
        report.horizontal_lines = horizontal.len();
        report.vertical_lines = vertical.len();
        if horizontal.len() < 2 || vertical.len() < 2 {
            return Err(Rejection::TooFewLines {
                horizontal: horizontal.len(),
                vertical: vertical.len(),
            });
        }

        let mx = p.corner_margin_fraction * w as f32;
        let my = p.corner_margin_fraction * h as f32;
        let mut corners: [Point; 4] = [[0.0; 2]; 4];
        let mut i = 0;
        for hl in &horizontal[..2] {
            for vl in &vertical[..2] {
                let c = hl.intersect(vl).ok_or(Rejection::NoIntersection)?;
                let inside = c[0] >= -mx
                    && c[0] <= (w - 1) as f32 + mx
                    && c[1] >= -my
                    && c[1] <= (h - 1) as f32 + my;
                if !inside {
                    return Err(Rejection::CornerOutOfFrame { corner: c });
                }
                corners[i] = c;
                i += 1;
            }
        }

        let quad =
            Quad::from_points(&sort_corners(corners)).map_err(|_| Rejection::InvalidShape)?;

        let fraction = quad.area() / (w * h) as f32;
        if fraction < p.min_area_fraction || fraction > p.max_area_fraction {
            return Err(Rejection::AreaOutOfRange { fraction });
        }
        for angle in quad.interior_angles_deg() {
            if angle < p.min_interior_angle_deg || angle > p.max_interior_angle_deg {
                return Err(Rejection::AngleOutOfRange { angle_deg: angle });
            }
        }
        Ok((quad, fraction))
    }
}

impl Default for EdgeQuadDetector {
    fn default() -> Self {
        Self::new(DetectorParams::default())
    }
}

#[inline]
fn ms_since(t: Instant) -> f64 {
    t.elapsed().as_secs_f64() * 1000.0
}
