//! Rolling window over per-cycle detections.
//!
//! The smoother keeps the last `history_len` detection results (quad or
//! nothing) and derives from them a confidence, a position-stability flag, a
//! displayed quad and an alignment classification. The ready signal is
//! edge-triggered: it fires on the first cycle of a ready streak only.
use crate::geometry::Quad;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SmootherParams {
    /// Ring buffer capacity.
    pub history_len: usize,
    /// Minimum non-null fraction before a quad is shown.
    pub min_confidence: f32,
    /// Number of most recent non-null quads checked for drift.
    pub stability_frames: usize,
    /// Maximum per-corner drift between consecutive quads (detection px).
    pub stability_tolerance_px: f32,
    pub too_far_fill: f32,
    pub too_close_fill: f32,
    /// Allowed centroid offset as a fraction of frame width.
    pub off_center_fraction: f32,
    /// Minimum shorter/longer ratio of opposite sides.
    pub min_symmetry: f32,
}

impl Default for SmootherParams {
    fn default() -> Self {
        Self {
            history_len: 8,
            min_confidence: 0.6,
            stability_frames: 3,
            stability_tolerance_px: 25.0,
            too_far_fill: 0.2,
            too_close_fill: 0.92,
            off_center_fraction: 0.18,
            min_symmetry: 0.65,
        }
    }
}

/// Framing classification of a shown quad.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    TooFar,
    TooClose,
    OffCenter,
    Tilted,
    Ready,
}

impl Alignment {
    /// Short user-facing hint.
    pub fn hint(self) -> &'static str {
        match self {
            Alignment::TooFar => "Move closer to the page",
            Alignment::TooClose => "Move back a little",
            Alignment::OffCenter => "Center the page in view",
            Alignment::Tilted => "Hold the camera parallel to the page",
            Alignment::Ready => "Looks good",
        }
    }
}

/// Per-cycle smoother output.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmoothedDetection {
    /// Averaged quad, present only when confident and stable.
    pub quad: Option<Quad>,
    /// Most recent raw detection.
    pub latest: Option<Quad>,
    pub confidence: f32,
    pub is_stable: bool,
    pub alignment: Option<Alignment>,
    /// True on the first cycle of a ready-and-stable streak.
    pub ready_transition: bool,
}

#[derive(Clone, Debug)]
struct HistoryEntry {
    quad: Option<Quad>,
    at: Instant,
}

pub struct TemporalSmoother {
    params: SmootherParams,
    history: VecDeque<HistoryEntry>,
    ready_latched: bool,
}

impl TemporalSmoother {
    pub fn new(params: SmootherParams) -> Self {
        let cap = params.history_len.max(1);
        Self {
            params,
            history: VecDeque::with_capacity(cap),
            ready_latched: false,
        }
    }

    pub fn params(&self) -> &SmootherParams {
        &self.params
    }

    /// Record one detection result for a frame of `frame_size` and return
    /// the smoothed state.
    pub fn push(
        &mut self,
        quad: Option<Quad>,
        frame_size: (usize, usize),
        now: Instant,
    ) -> SmoothedDetection {
        let cap = self.params.history_len.max(1);
        while self.history.len() >= cap {
            self.history.pop_front();
        }
        self.history.push_back(HistoryEntry { quad, at: now });

        let confidence = self.confidence();
        let is_stable = self.is_stable();
        let shown = if confidence >= self.params.min_confidence && is_stable {
            Quad::average(self.history.iter().filter_map(|e| e.quad.as_ref()))
        } else {
            None
        };
        let alignment = shown.as_ref().map(|q| self.classify(q, frame_size));

        let ready_now = alignment == Some(Alignment::Ready);
        let ready_transition = ready_now && !self.ready_latched;
        self.ready_latched = ready_now;
        if ready_transition {
            debug!("TemporalSmoother: ready (confidence {:.3})", confidence);
        }

        SmoothedDetection {
            quad: shown,
            latest: quad,
            confidence,
            is_stable,
            alignment,
            ready_transition,
        }
    }

    /// Fraction of the ring capacity holding a quad.
    pub fn confidence(&self) -> f32 {
        let hits = self.history.iter().filter(|e| e.quad.is_some()).count();
        hits as f32 / self.params.history_len.max(1) as f32
    }

    /// Whether the most recent non-null quads drift less than the tolerance
    /// between consecutive observations.
    pub fn is_stable(&self) -> bool {
        let n = self.params.stability_frames.max(2);
        let recent: Vec<&Quad> = self
            .history
            .iter()
            .rev()
            .filter_map(|e| e.quad.as_ref())
            .take(n)
            .collect();
        if recent.len() < n {
            return false;
        }
        recent
            .windows(2)
            .all(|w| w[0].max_corner_displacement(w[1]) < self.params.stability_tolerance_px)
    }

    /// Framing classification for a quad in a frame of `frame_size`.
    pub fn classify(&self, quad: &Quad, frame_size: (usize, usize)) -> Alignment {
        let p = &self.params;
        let (fw, fh) = (frame_size.0 as f32, frame_size.1 as f32);
        let frame_area = (fw * fh).max(1.0);
        let fill = quad.area() / frame_area;
        if fill < p.too_far_fill {
            return Alignment::TooFar;
        }
        if fill > p.too_close_fill {
            return Alignment::TooClose;
        }
        let c = quad.centroid();
        let drift = ((c[0] - fw * 0.5).powi(2) + (c[1] - fh * 0.5).powi(2)).sqrt();
        if drift > p.off_center_fraction * fw {
            return Alignment::OffCenter;
        }
        let [top, right, bottom, left] = quad.side_lengths();
        if symmetry(top, bottom) < p.min_symmetry || symmetry(left, right) < p.min_symmetry {
            return Alignment::Tilted;
        }
        Alignment::Ready
    }

    /// Timestamp of the most recent frame that carried a quad.
    pub fn last_detection_at(&self) -> Option<Instant> {
        self.history
            .iter()
            .rev()
            .find(|e| e.quad.is_some())
            .map(|e| e.at)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.ready_latched = false;
    }
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(SmootherParams::default())
    }
}

fn symmetry(a: f32, b: f32) -> f32 {
    let hi = a.max(b);
    if hi <= 0.0 {
        0.0
    } else {
        a.min(b) / hi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: (usize, usize) = (320, 240);

    fn centered() -> Quad {
        Quad::rect(60.0, 40.0, 260.0, 200.0)
    }

    #[test]
    fn five_identical_quads_are_stable() {
        let mut s = TemporalSmoother::default();
        let now = Instant::now();
        let mut out = None;
        for _ in 0..5 {
            out = Some(s.push(Some(centered()), FRAME, now));
        }
        let out = out.expect("pushed");
        assert!(out.is_stable);
        assert_eq!(out.confidence, 0.625);
        let shown = out.quad.expect("shown quad");
        assert!(shown.max_corner_displacement(&centered()) < 1e-3);
        assert_eq!(out.alignment, Some(Alignment::Ready));
    }

    #[test]
    fn confidence_decays_to_zero_over_null_frames() {
        let mut s = TemporalSmoother::default();
        let now = Instant::now();
        for _ in 0..8 {
            s.push(Some(centered()), FRAME, now);
        }
        let mut prev = s.confidence();
        assert_eq!(prev, 1.0);
        for _ in 0..8 {
            let c = s.push(None, FRAME, now).confidence;
            assert!(c < prev);
            prev = c;
        }
        assert_eq!(prev, 0.0);
    }

    #[test]
    fn large_jumps_break_stability() {
        let mut s = TemporalSmoother::default();
        let now = Instant::now();
        s.push(Some(centered()), FRAME, now);
        s.push(Some(centered()), FRAME, now);
        let shifted = Quad::rect(100.0, 40.0, 300.0, 200.0);
        let out = s.push(Some(shifted), FRAME, now);
        assert!(!out.is_stable);
        assert!(out.quad.is_none());
    }

    #[test]
    fn ready_signal_is_edge_triggered() {
        let mut s = TemporalSmoother::default();
        let now = Instant::now();
        let fired: Vec<bool> = (0..8)
            .map(|_| s.push(Some(centered()), FRAME, now).ready_transition)
            .collect();
        assert_eq!(fired.iter().filter(|&&f| f).count(), 1);

        // Losing the document and finding it again re-arms the signal.
        for _ in 0..8 {
            s.push(None, FRAME, now);
        }
        let refired = (0..8).any(|_| s.push(Some(centered()), FRAME, now).ready_transition);
        assert!(refired);
    }

    #[test]
    fn last_detection_skips_null_frames() {
        let mut s = TemporalSmoother::default();
        let t0 = Instant::now();
        assert_eq!(s.last_detection_at(), None);
        s.push(Some(centered()), FRAME, t0);
        s.push(None, FRAME, t0 + std::time::Duration::from_millis(200));
        assert_eq!(s.last_detection_at(), Some(t0));
    }

    #[test]
    fn alignment_classes() {
        let s = TemporalSmoother::default();
        assert_eq!(
            s.classify(&Quad::rect(140.0, 100.0, 180.0, 140.0), FRAME),
            Alignment::TooFar
        );
        assert_eq!(
            s.classify(&Quad::rect(2.0, 2.0, 318.0, 238.0), FRAME),
            Alignment::TooClose
        );
        assert_eq!(
            s.classify(&Quad::rect(0.0, 0.0, 160.0, 140.0), FRAME),
            Alignment::OffCenter
        );
        let trapezoid = Quad::new([[130.0, 50.0], [190.0, 50.0], [280.0, 190.0], [40.0, 190.0]]);
        assert_eq!(s.classify(&trapezoid, FRAME), Alignment::Tilted);
    }
}
