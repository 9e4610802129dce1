use super::factors::{
    aspect_ratio, edge_density, focus_score, inset_window, quality_estimate, Factors,
};
use super::params::ReadinessParams;
use crate::geometry::{Point, Quad};
use crate::types::Frame;
use log::debug;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockCode {
    NoDocument,
    InvalidQuad,
    LowConfidence,
    NoContent,
    BadAspectRatio,
    TooFar,
    TooClose,
    LowFocus,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingReason {
    pub code: BlockCode,
    pub severity: Severity,
    /// Offending measurement, when there is one.
    pub value: Option<f32>,
}

impl BlockingReason {
    fn critical(code: BlockCode, value: Option<f32>) -> Self {
        Self {
            code,
            severity: Severity::Critical,
            value,
        }
    }

    fn warning(code: BlockCode, value: f32) -> Self {
        Self {
            code,
            severity: Severity::Warning,
            value: Some(value),
        }
    }
}

/// User guidance, declared in priority order (first = most important).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Hint {
    HoldSteady,
    FindPage,
    ShowContent,
    MoveCloser,
    MoveBack,
    StraightenCamera,
    Refocus,
    ImproveLighting,
}

impl Hint {
    pub fn message(self) -> &'static str {
        match self {
            Hint::HoldSteady => "Hold steady",
            Hint::FindPage => "Point the camera at the page",
            Hint::ShowContent => "Make sure the page with writing is in view",
            Hint::MoveCloser => "Move closer",
            Hint::MoveBack => "Move back a little",
            Hint::StraightenCamera => "Hold the camera straight over the page",
            Hint::Refocus => "Hold still so the camera can focus",
            Hint::ImproveLighting => "Find better lighting",
        }
    }
}

/// One cycle's input to the engine.
#[derive(Clone, Copy, Debug)]
pub struct ReadinessInput<'a> {
    /// Raw corner list in detection-frame coordinates; `None` when nothing
    /// was detected.
    pub quad: Option<&'a [Point]>,
    pub confidence: f32,
    pub frame: &'a Frame,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessAssessment {
    pub ready: bool,
    pub score: f32,
    pub factors: Factors,
    pub stability_met: bool,
    pub stability_progress: f32,
    pub guidance: Vec<Hint>,
    pub blocking_reasons: Vec<BlockingReason>,
    pub quad: Option<Quad>,
}

impl ReadinessAssessment {
    fn rejected(reason: BlockingReason, hint: Hint) -> Self {
        Self {
            ready: false,
            score: 0.0,
            factors: Factors::default(),
            stability_met: false,
            stability_progress: 0.0,
            guidance: vec![hint],
            blocking_reasons: vec![reason],
            quad: None,
        }
    }

    pub fn has_critical_block(&self) -> bool {
        self.blocking_reasons
            .iter()
            .any(|b| b.severity == Severity::Critical)
    }

    /// Guidance messages in priority order.
    pub fn messages(&self) -> Vec<&'static str> {
        self.guidance.iter().map(|h| h.message()).collect()
    }
}

/// Assessment frozen at capture time.
#[derive(Clone, Debug)]
pub struct ReadinessSnapshot {
    pub assessment: ReadinessAssessment,
    pub taken_at: Instant,
}

impl ReadinessSnapshot {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.taken_at)
    }
}

/// Per-cycle readiness fusion with its own stability window.
pub struct ReadinessEngine {
    params: ReadinessParams,
    window: VecDeque<Quad>,
    stable_since: Option<Instant>,
    ready_since: Option<Instant>,
    last: Option<ReadinessSnapshot>,
}

impl ReadinessEngine {
    pub fn new(params: ReadinessParams) -> Self {
        Self {
            params,
            window: VecDeque::new(),
            stable_since: None,
            ready_since: None,
            last: None,
        }
    }

    pub fn params(&self) -> &ReadinessParams {
        &self.params
    }

    /// Assess one cycle.
    pub fn assess(&mut self, input: &ReadinessInput<'_>, now: Instant) -> ReadinessAssessment {
        let assessment = self.evaluate(input, now);
        if assessment.ready {
            self.ready_since.get_or_insert(now);
        } else {
            self.ready_since = None;
        }
        self.last = Some(ReadinessSnapshot {
            assessment: assessment.clone(),
            taken_at: now,
        });
        assessment
    }

    fn evaluate(&mut self, input: &ReadinessInput<'_>, now: Instant) -> ReadinessAssessment {
        let Some(points) = input.quad else {
            self.lose_stability();
            return ReadinessAssessment::rejected(
                BlockingReason::critical(BlockCode::NoDocument, None),
                Hint::FindPage,
            );
        };
        let quad = match Quad::from_points(points) {
            Ok(q) => q,
            Err(defect) => {
                debug!("ReadinessEngine: structural rejection {:?}", defect);
                self.lose_stability();
                return ReadinessAssessment::rejected(
                    BlockingReason::critical(BlockCode::InvalidQuad, None),
                    Hint::FindPage,
                );
            }
        };

        let img = input.frame.view();
        let (fw, fh) = (input.frame.width(), input.frame.height());

        let (stability, stability_met) = self.update_stability(quad);
        if stability_met {
            self.stable_since.get_or_insert(now);
        } else {
            self.stable_since = None;
        }
        let stable_for = self
            .stable_since
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
        let min_stable = Duration::from_millis(self.params.min_stable_ms);
        let stability_progress = if stability_met {
            if min_stable.is_zero() {
                1.0
            } else {
                (stable_for.as_secs_f32() / min_stable.as_secs_f32()).min(1.0)
            }
        } else {
            0.0
        };

        let p = &self.params;
        let inner = inset_window(&quad.bbox(), 0.1, fw, fh);
        let factors = Factors {
            quad_confidence: input.confidence.clamp(0.0, 1.0),
            stability,
            quality_estimate: quality_estimate(&img, inner),
            edge_density: edge_density(&img, inner, p.edge_step),
            aspect_ratio: aspect_ratio(&quad),
            coverage: (quad.area() / input.frame.area().max(1.0)).clamp(0.0, 1.0),
            focus: focus_score(&img, &quad, p.focus_window_half, p.focus_variance_target),
        };

        let blocking_reasons = self.blocks(&factors);
        let score = self.composite(&factors);
        let ready = blocking_reasons.is_empty()
            && score >= p.ready_score
            && stability_met
            && stable_for >= min_stable;
        let guidance = self.guidance(&factors, &blocking_reasons, stability_progress);

        debug!(
            "ReadinessEngine: score {:.3} ready {} blocks {}",
            score,
            ready,
            blocking_reasons.len()
        );
        ReadinessAssessment {
            ready,
            score,
            factors,
            stability_met,
            stability_progress,
            guidance,
            blocking_reasons,
            quad: Some(quad),
        }
    }

    /// Push into the window and return `(stability factor, met)`.
    ///
    /// Stability is met when the window holds at least three quads, the
    /// latest frame-to-frame displacement and the window's average jitter
    /// are both below the jitter threshold.
    fn update_stability(&mut self, quad: Quad) -> (f32, bool) {
        let cap = self.params.stability_window.max(2);
        while self.window.len() >= cap {
            self.window.pop_front();
        }
        self.window.push_back(quad);
        if self.window.len() < 2 {
            return (0.0, false);
        }
        let steps: Vec<f32> = self
            .window
            .iter()
            .zip(self.window.iter().skip(1))
            .map(|(a, b)| a.mean_corner_displacement(b))
            .collect();
        let jitter = steps.iter().sum::<f32>() / steps.len() as f32;
        let latest = steps.last().copied().unwrap_or(f32::INFINITY);
        let limit = self.params.stability_jitter_px.max(1e-3);
        let factor = (1.0 - jitter.max(latest) / (2.0 * limit)).clamp(0.0, 1.0);
        let met = self.window.len() >= 3 && jitter < limit && latest < limit;
        (factor, met)
    }

    fn blocks(&self, f: &Factors) -> Vec<BlockingReason> {
        let p = &self.params;
        let mut out = Vec::new();
        if f.quad_confidence < p.min_confidence {
            out.push(BlockingReason::critical(
                BlockCode::LowConfidence,
                Some(f.quad_confidence),
            ));
        }
        if f.edge_density < p.min_edge_density {
            out.push(BlockingReason::critical(
                BlockCode::NoContent,
                Some(f.edge_density),
            ));
        }
        if f.aspect_ratio < p.min_aspect_ratio {
            out.push(BlockingReason::warning(
                BlockCode::BadAspectRatio,
                f.aspect_ratio,
            ));
        }
        if f.coverage < p.too_far_coverage {
            out.push(BlockingReason::warning(BlockCode::TooFar, f.coverage));
        } else if f.coverage > p.too_close_coverage {
            out.push(BlockingReason::warning(BlockCode::TooClose, f.coverage));
        }
        if f.focus < p.min_focus {
            out.push(BlockingReason::warning(BlockCode::LowFocus, f.focus));
        }
        out
    }

    /// Weighted sum of the scoring factors.
    pub fn composite(&self, f: &Factors) -> f32 {
        let p = &self.params;
        let w = &p.weights;
        let density = (f.edge_density / p.target_edge_density.max(1e-6)).min(1.0);
        let score = w.quad_confidence * f.quad_confidence
            + w.stability * f.stability
            + w.quality_estimate * f.quality_estimate
            + w.edge_density * density
            + w.coverage * self.coverage_score(f.coverage);
        score.clamp(0.0, 1.0)
    }

    /// 1 inside the ideal band, ramping to 0 at the too-far/too-close limits.
    fn coverage_score(&self, coverage: f32) -> f32 {
        let p = &self.params;
        if coverage < p.ideal_coverage_min {
            let span = (p.ideal_coverage_min - p.too_far_coverage).max(1e-6);
            ((coverage - p.too_far_coverage) / span).clamp(0.0, 1.0)
        } else if coverage > p.ideal_coverage_max {
            let span = (p.too_close_coverage - p.ideal_coverage_max).max(1e-6);
            ((p.too_close_coverage - coverage) / span).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    fn guidance(&self, f: &Factors, blocks: &[BlockingReason], progress: f32) -> Vec<Hint> {
        let mut hints: Vec<Hint> = blocks
            .iter()
            .map(|b| match b.code {
                BlockCode::NoDocument | BlockCode::InvalidQuad | BlockCode::LowConfidence => {
                    Hint::FindPage
                }
                BlockCode::NoContent => Hint::ShowContent,
                BlockCode::BadAspectRatio => Hint::StraightenCamera,
                BlockCode::TooFar => Hint::MoveCloser,
                BlockCode::TooClose => Hint::MoveBack,
                BlockCode::LowFocus => Hint::Refocus,
            })
            .collect();
        if progress < 1.0 {
            hints.push(Hint::HoldSteady);
        }
        if f.quality_estimate < self.params.min_quality_estimate {
            hints.push(Hint::ImproveLighting);
        }
        hints.sort();
        hints.dedup();
        hints
    }

    /// Most recent assessment with its timestamp.
    pub fn snapshot(&self) -> Option<ReadinessSnapshot> {
        self.last.clone()
    }

    /// How long `ready` has held continuously.
    pub fn ready_duration(&self, now: Instant) -> Duration {
        self.ready_since
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t))
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.stable_since = None;
        self.ready_since = None;
        self.last = None;
    }

    fn lose_stability(&mut self) {
        self.window.clear();
        self.stable_since = None;
    }
}

impl Default for ReadinessEngine {
    fn default() -> Self {
        Self::new(ReadinessParams::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::GrayImageU8;

    /// Bright page with text-like stripes on a dark background.
    fn page_frame(w: usize, h: usize, page: (usize, usize, usize, usize)) -> Frame {
        let (x0, y0, x1, y1) = page;
        let mut img = GrayImageU8::filled(w, h, 40);
        for y in y0..y1 {
            for x in x0..x1 {
                let ink = y % 8 < 3 && x % 6 < 3;
                img.set(x, y, if ink { 30 } else { 220 });
            }
        }
        Frame::new(img)
    }

    fn corners(q: &Quad) -> Vec<Point> {
        q.to_vec()
    }

    fn run(
        engine: &mut ReadinessEngine,
        frame: &Frame,
        quad: &Quad,
        confidence: f32,
        t: Instant,
    ) -> ReadinessAssessment {
        let pts = corners(quad);
        engine.assess(
            &ReadinessInput {
                quad: Some(pts.as_slice()),
                confidence,
                frame,
            },
            t,
        )
    }

    #[test]
    fn becomes_ready_after_minimum_stable_time() {
        let frame = page_frame(320, 240, (60, 40, 260, 200));
        let quad = Quad::rect(60.0, 40.0, 260.0, 200.0);
        let mut engine = ReadinessEngine::default();
        let t0 = Instant::now();
        let mut last = None;
        for i in 0..10u64 {
            let a = run(&mut engine, &frame, &quad, 1.0, t0 + Duration::from_millis(100 * i));
            if i < 6 {
                assert!(!a.ready, "ready too early at cycle {i}");
                assert!(a.guidance.contains(&Hint::HoldSteady));
            }
            last = Some(a);
        }
        let a = last.expect("assessed");
        assert!(a.blocking_reasons.is_empty(), "{:?}", a.blocking_reasons);
        assert!(a.score >= 0.7);
        assert_eq!(a.stability_progress, 1.0);
        assert!(a.ready);
        assert!(!a.guidance.contains(&Hint::HoldSteady));
    }

    #[test]
    fn critical_block_dominates_score() {
        let frame = page_frame(320, 240, (60, 40, 260, 200));
        let quad = Quad::rect(60.0, 40.0, 260.0, 200.0);
        let mut engine = ReadinessEngine::default();
        let t0 = Instant::now();
        let mut a = None;
        for i in 0..12u64 {
            a = Some(run(&mut engine, &frame, &quad, 0.2, t0 + Duration::from_millis(100 * i)));
        }
        let a = a.expect("assessed");
        assert!(a.has_critical_block());
        assert!(!a.ready);
    }

    #[test]
    fn blank_surface_blocks_on_content() {
        let frame = Frame::new(GrayImageU8::filled(320, 240, 200));
        let quad = Quad::rect(60.0, 40.0, 260.0, 200.0);
        let mut engine = ReadinessEngine::default();
        let a = run(&mut engine, &frame, &quad, 1.0, Instant::now());
        assert!(a
            .blocking_reasons
            .iter()
            .any(|b| b.code == BlockCode::NoContent && b.severity == Severity::Critical));
    }

    #[test]
    fn coverage_limits_block() {
        let frame = page_frame(250, 160, (0, 0, 250, 160));
        let mut engine = ReadinessEngine::default();
        let now = Instant::now();

        let far = run(&mut engine, &frame, &Quad::rect(85.0, 55.0, 165.0, 105.0), 1.0, now);
        assert!(far.blocking_reasons.iter().any(|b| b.code == BlockCode::TooFar));

        engine.reset();
        let close = run(&mut engine, &frame, &Quad::rect(5.0, 0.0, 245.0, 160.0), 1.0, now);
        assert!(close
            .blocking_reasons
            .iter()
            .any(|b| b.code == BlockCode::TooClose));
    }

    #[test]
    fn stability_resets_on_jump() {
        let frame = page_frame(320, 240, (60, 40, 260, 200));
        let quad = Quad::rect(60.0, 40.0, 260.0, 200.0);
        let moved = Quad::rect(90.0, 40.0, 290.0, 200.0);
        let mut engine = ReadinessEngine::default();
        let t0 = Instant::now();
        for i in 0..8u64 {
            run(&mut engine, &frame, &quad, 1.0, t0 + Duration::from_millis(100 * i));
        }
        let a = run(&mut engine, &frame, &moved, 1.0, t0 + Duration::from_millis(800));
        assert!(!a.stability_met);
        assert_eq!(a.stability_progress, 0.0);
        assert!(!a.ready);
        assert_eq!(a.guidance.first(), Some(&Hint::HoldSteady));

        // Settling again starts the timer from zero.
        let a = run(&mut engine, &frame, &moved, 1.0, t0 + Duration::from_millis(900));
        let b = run(&mut engine, &frame, &moved, 1.0, t0 + Duration::from_millis(1000));
        assert!(!a.ready && !b.ready);
        assert!(b.stability_progress < 1.0);
    }

    #[test]
    fn invalid_quads_score_zero() {
        let frame = page_frame(320, 240, (60, 40, 260, 200));
        let mut engine = ReadinessEngine::default();
        let bow_tie: [Point; 4] = [[0.0, 0.0], [50.0, 50.0], [50.0, 0.0], [0.0, 50.0]];
        let a = engine.assess(
            &ReadinessInput {
                quad: Some(bow_tie.as_slice()),
                confidence: 1.0,
                frame: &frame,
            },
            Instant::now(),
        );
        assert_eq!(a.score, 0.0);
        assert!(!a.ready);
        assert_eq!(a.blocking_reasons[0].code, BlockCode::InvalidQuad);

        let short: [Point; 3] = [[0.0, 0.0], [50.0, 0.0], [50.0, 50.0]];
        let a = engine.assess(
            &ReadinessInput {
                quad: Some(short.as_slice()),
                confidence: 1.0,
                frame: &frame,
            },
            Instant::now(),
        );
        assert_eq!(a.score, 0.0);
    }
}
