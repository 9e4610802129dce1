//! Last independent validation of a still before it is committed to
//! interpretation.
//!
//! Four checks run in order: capture validity, geometry, content and
//! timing. Each yields pass, warn or fail. The first failure stops the run;
//! warnings are collected and never block.
use crate::geometry::{is_convex, is_self_intersecting, min_side, polygon_area, Point};
use crate::image::io::decode_still;
use crate::image::resample::downsample_area;
use crate::image::{GrayImageU8, ImageView};
use crate::readiness::ReadinessSnapshot;
use crate::types::Capture;
use image::RgbImage;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PreflightParams {
    pub min_payload_bytes: usize,
    /// Captures older than this are flagged.
    pub stale_capture_ms: u64,
    /// Minimum quad area as a fraction of the detection frame.
    pub min_area_fraction: f32,
    /// Minimum quad side length in detection pixels.
    pub min_edge_px: f32,
    /// Floor for the readiness edge-density factor.
    pub min_edge_density: f32,
    /// Side of the thumbnail used for the independent content recheck.
    pub recheck_size: usize,
    pub recheck_step: u8,
    /// Floor for the thumbnail transition fraction.
    pub min_recheck_density: f32,
    /// Readiness snapshots older than this (relative to the capture) are flagged.
    pub stale_snapshot_ms: u64,
    pub ready_score: f32,
}

impl Default for PreflightParams {
    fn default() -> Self {
        Self {
            min_payload_bytes: 256,
            stale_capture_ms: 5000,
            min_area_fraction: 0.05,
            min_edge_px: 10.0,
            min_edge_density: 0.015,
            recheck_size: 64,
            recheck_step: 24,
            min_recheck_density: 0.01,
            stale_snapshot_ms: 2000,
            ready_score: 0.7,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Capture,
    Geometry,
    Content,
    Timing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub check: CheckKind,
    pub status: CheckStatus,
    pub messages: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    pub checks: Vec<CheckResult>,
    pub passed: bool,
    pub warnings: Vec<String>,
    /// Reason of the first failing check.
    pub primary_failure: Option<String>,
}

/// Accumulates the outcome of one check.
struct Outcome {
    status: CheckStatus,
    messages: Vec<String>,
}

impl Outcome {
    fn new() -> Self {
        Self {
            status: CheckStatus::Pass,
            messages: Vec::new(),
        }
    }

    fn warn(&mut self, msg: impl Into<String>) {
        if self.status == CheckStatus::Pass {
            self.status = CheckStatus::Warn;
        }
        self.messages.push(msg.into());
    }

    fn fail(mut self, msg: impl Into<String>) -> Self {
        self.status = CheckStatus::Fail;
        self.messages.push(msg.into());
        self
    }
}

pub struct PreFlightCheck {
    params: PreflightParams,
}

impl PreFlightCheck {
    pub fn new(params: PreflightParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PreflightParams {
        &self.params
    }

    pub fn run(&self, capture: &Capture, now: Instant) -> PreflightReport {
        let mut report = PreflightReport {
            checks: Vec::with_capacity(4),
            passed: true,
            warnings: Vec::new(),
            primary_failure: None,
        };

        let (outcome, still) = self.check_capture(capture, now);
        if !record(&mut report, CheckKind::Capture, outcome) {
            return report;
        }
        if !record(&mut report, CheckKind::Geometry, self.check_geometry(capture)) {
            return report;
        }
        let content = match still {
            Some(rgb) => self.check_content(capture.readiness.as_ref(), &rgb),
            None => Outcome::new().fail("capture could not be decoded"),
        };
        if !record(&mut report, CheckKind::Content, content) {
            return report;
        }
        record(
            &mut report,
            CheckKind::Timing,
            self.check_timing(capture.readiness.as_ref(), capture.captured_at),
        );
        report
    }

    fn check_capture(&self, capture: &Capture, now: Instant) -> (Outcome, Option<RgbImage>) {
        let out = Outcome::new();
        if capture.encoded.is_empty() {
            return (out.fail("capture is empty"), None);
        }
        if capture.encoded.len() < self.params.min_payload_bytes {
            return (
                out.fail(format!(
                    "capture payload too small ({} bytes)",
                    capture.encoded.len()
                )),
                None,
            );
        }
        let rgb = match decode_still(&capture.encoded) {
            Ok(rgb) => rgb,
            Err(err) => return (out.fail(format!("capture is not a valid image: {err}")), None),
        };
        if rgb.width() == 0 || rgb.height() == 0 {
            return (out.fail("capture has no pixels"), None);
        }
        let mut out = out;
        let age = now.saturating_duration_since(capture.captured_at);
        if age > Duration::from_millis(self.params.stale_capture_ms) {
            out.warn(format!("capture is {:.1}s old", age.as_secs_f32()));
        }
        (out, Some(rgb))
    }

    fn check_geometry(&self, capture: &Capture) -> Outcome {
        let p = &self.params;
        let mut out = Outcome::new();
        let Some(points) = capture.quad.as_deref() else {
            return out.fail("no document outline");
        };
        let corners: [Point; 4] = match points.try_into() {
            Ok(c) => c,
            Err(_) => return out.fail(format!("outline has {} corners", points.len())),
        };
        if corners.iter().flatten().any(|v| !v.is_finite()) {
            return out.fail("outline has non-finite coordinates");
        }
        if is_self_intersecting(&corners) {
            return out.fail("outline crosses itself");
        }
        let (fw, fh) = capture.frame_size;
        let frame_area = (fw * fh) as f32;
        let area = polygon_area(&corners);
        let min_area = if frame_area > 0.0 {
            p.min_area_fraction * frame_area
        } else {
            p.min_edge_px * p.min_edge_px
        };
        if area < min_area {
            return out.fail(format!("outline area {area:.0}px² below {min_area:.0}px²"));
        }
        let shortest = min_side(&corners);
        if shortest < p.min_edge_px {
            return out.fail(format!("outline edge {shortest:.1}px too short"));
        }
        if !is_convex(&corners) {
            out.warn("outline is not convex");
        }
        out
    }

    fn check_content(&self, snapshot: Option<&ReadinessSnapshot>, rgb: &RgbImage) -> Outcome {
        let p = &self.params;
        let mut out = Outcome::new();
        match snapshot {
            Some(s) if s.assessment.factors.edge_density < p.min_edge_density => {
                return out.fail(format!(
                    "page looks blank (edge density {:.3})",
                    s.assessment.factors.edge_density
                ));
            }
            Some(_) => {}
            None => out.warn("no readiness snapshot to confirm content"),
        }
        let density = thumbnail_density(rgb, p.recheck_size, p.recheck_step);
        if density < p.min_recheck_density {
            return out.fail(format!("still looks blank (transitions {density:.3})"));
        }
        out
    }

    fn check_timing(&self, snapshot: Option<&ReadinessSnapshot>, captured_at: Instant) -> Outcome {
        let p = &self.params;
        let mut out = Outcome::new();
        let Some(s) = snapshot else {
            out.warn("captured without a readiness assessment");
            return out;
        };
        let age = captured_at.saturating_duration_since(s.taken_at);
        if age > Duration::from_millis(p.stale_snapshot_ms) {
            out.warn(format!("readiness snapshot is {:.1}s old", age.as_secs_f32()));
        }
        if !s.assessment.stability_met {
            out.warn("captured before the page was stable");
        }
        if s.assessment.score < p.ready_score {
            out.warn(format!(
                "captured below the readiness score ({:.2})",
                s.assessment.score
            ));
        }
        out
    }
}

impl Default for PreFlightCheck {
    fn default() -> Self {
        Self::new(PreflightParams::default())
    }
}

/// Append a check to the report; returns false when it failed.
fn record(report: &mut PreflightReport, check: CheckKind, outcome: Outcome) -> bool {
    match outcome.status {
        CheckStatus::Fail => {
            let reason = outcome.messages.last().cloned().unwrap_or_default();
            debug!("PreFlightCheck: {:?} failed: {}", check, reason);
            report.passed = false;
            report.primary_failure.get_or_insert(reason);
        }
        CheckStatus::Warn => {
            for m in &outcome.messages {
                warn!("PreFlightCheck: {:?}: {}", check, m);
            }
            report.warnings.extend(outcome.messages.iter().cloned());
        }
        CheckStatus::Pass => {}
    }
    let passed = outcome.status != CheckStatus::Fail;
    report.checks.push(CheckResult {
        check,
        status: outcome.status,
        messages: outcome.messages,
    });
    passed
}

/// Fraction of horizontal neighbour pairs in a `size × size` thumbnail that
/// differ by more than `step`.
pub fn thumbnail_density(rgb: &RgbImage, size: usize, step: u8) -> f32 {
    let gray = GrayImageU8::from_rgb(rgb);
    let thumb = downsample_area(&gray.as_view(), size, size);
    let mut pairs = 0usize;
    let mut strong = 0usize;
    for row in thumb.rows() {
        for w in row.windows(2) {
            pairs += 1;
            if w[0].abs_diff(w[1]) > step {
                strong += 1;
            }
        }
    }
    strong as f32 / pairs.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::io::encode_png;
    use crate::readiness::{Factors, ReadinessAssessment};
    use image::Rgb;

    fn page_png() -> Vec<u8> {
        let img = RgbImage::from_fn(256, 192, |x, y| {
            let ink = y % 16 < 5 && x % 14 < 8;
            let v = if ink { 25 } else { 225 };
            Rgb([v, v, v])
        });
        encode_png(&img).expect("encode")
    }

    fn snapshot(edge_density: f32, score: f32, stable: bool, at: Instant) -> ReadinessSnapshot {
        ReadinessSnapshot {
            assessment: ReadinessAssessment {
                ready: stable && score >= 0.7,
                score,
                factors: Factors {
                    edge_density,
                    ..Factors::default()
                },
                stability_met: stable,
                stability_progress: if stable { 1.0 } else { 0.0 },
                guidance: Vec::new(),
                blocking_reasons: Vec::new(),
                quad: None,
            },
            taken_at: at,
        }
    }

    fn good_capture(now: Instant) -> Capture {
        Capture::new(page_png(), now)
            .with_quad(
                vec![[40.0, 30.0], [280.0, 30.0], [280.0, 210.0], [40.0, 210.0]],
                (320, 240),
            )
            .with_readiness(snapshot(0.1, 0.9, true, now))
    }

    #[test]
    fn good_capture_passes_cleanly() {
        let now = Instant::now();
        let report = PreFlightCheck::default().run(&good_capture(now), now);
        assert!(report.passed, "{:?}", report.primary_failure);
        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.checks.len(), 4);
    }

    #[test]
    fn garbage_bytes_fail_first_check() {
        let now = Instant::now();
        let mut capture = good_capture(now);
        capture.encoded = vec![0xAB; 4096];
        let report = PreFlightCheck::default().run(&capture, now);
        assert!(!report.passed);
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].check, CheckKind::Capture);
    }

    #[test]
    fn concave_outline_only_warns() {
        let now = Instant::now();
        let mut capture = good_capture(now);
        capture.quad = Some(vec![[40.0, 30.0], [160.0, 90.0], [280.0, 30.0], [160.0, 210.0]]);
        let report = PreFlightCheck::default().run(&capture, now);
        assert!(report.passed, "{:?}", report.primary_failure);
        assert_eq!(report.checks[1].status, CheckStatus::Warn);
    }

    #[test]
    fn tiny_outline_fails_geometry() {
        let now = Instant::now();
        let mut capture = good_capture(now);
        capture.quad = Some(vec![[10.0, 10.0], [30.0, 10.0], [30.0, 30.0], [10.0, 30.0]]);
        let report = PreFlightCheck::default().run(&capture, now);
        assert!(!report.passed);
        assert_eq!(report.checks.last().map(|c| c.check), Some(CheckKind::Geometry));
    }

    #[test]
    fn blank_snapshot_fails_content() {
        let now = Instant::now();
        let capture = good_capture(now).with_readiness(snapshot(0.001, 0.9, true, now));
        let report = PreFlightCheck::default().run(&capture, now);
        assert!(!report.passed);
        assert_eq!(report.checks.last().map(|c| c.check), Some(CheckKind::Content));
    }

    #[test]
    fn manual_override_is_flagged_not_blocked() {
        let now = Instant::now();
        let capture = good_capture(now).with_readiness(snapshot(0.1, 0.5, false, now));
        let report = PreFlightCheck::default().run(&capture, now);
        assert!(report.passed);
        assert_eq!(report.warnings.len(), 2);
        assert_eq!(report.checks[3].status, CheckStatus::Warn);
    }

    #[test]
    fn stale_capture_warns() {
        let t0 = Instant::now();
        let capture = good_capture(t0);
        let report = PreFlightCheck::default().run(&capture, t0 + Duration::from_secs(6));
        assert!(report.passed);
        assert_eq!(report.checks[0].status, CheckStatus::Warn);
    }
}
