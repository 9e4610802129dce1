//! Gate sequence guarding the hand-off of a still to interpretation.
//!
//! [`AnalysisPipeline::run`] walks six ordered gates and returns a tagged
//! [`PipelineResult`]; it never panics and never calls the backend once a
//! gate before execution has failed.
//!
//! 1. capture present
//! 2. outline geometry (four finite corners)
//! 3. pre-flight checks
//! 4. content emptiness from the readiness snapshot
//! 5. execution (offline estimate on recoverable backend failures)
//! 6. result shape
//!
//! Modules
//! - `calibration`: [`ConfidenceCalibrator`] applied to every accepted result.
//! - `offline`: local estimate substituted when the service is unavailable.
//! - `result`: result, trace and error code types.

pub mod calibration;
mod offline;
mod result;

pub use calibration::{
    CalibratedAnalysis, CalibrationFactors, CalibrationParams, CalibrationWeights,
    ConfidenceCalibrator,
};
pub use offline::offline_estimate;
pub use result::{ErrorCode, Gate, GateOutcome, GateRecord, PipelineError, PipelineResult};

use crate::backend::{AnalysisRequest, AnalysisResult, BackendError, InterpretationBackend};
use crate::geometry::Point;
use crate::preflight::PreFlightCheck;
use crate::types::Capture;
use log::{debug, info, warn};
use serde::Deserialize;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// Passed to the backend with every request.
    pub backend_timeout_ms: u64,
    /// Readiness edge density below which the page counts as empty.
    pub min_edge_density: f32,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            backend_timeout_ms: 30_000,
            min_edge_density: 0.015,
        }
    }
}

/// Per-run inputs that do not belong to the capture itself.
#[derive(Clone, Copy, Debug)]
pub struct AnalysisContext<'a> {
    pub instructions: &'a str,
    pub document_type: &'a str,
    /// Overall quality score of the still, when it was analyzed.
    pub image_quality: Option<f32>,
}

pub struct AnalysisPipeline {
    params: PipelineParams,
    backend: Option<Arc<dyn InterpretationBackend>>,
    preflight: PreFlightCheck,
    calibrator: ConfidenceCalibrator,
}

impl AnalysisPipeline {
    pub fn new(
        params: PipelineParams,
        backend: Option<Arc<dyn InterpretationBackend>>,
        preflight: PreFlightCheck,
        calibrator: ConfidenceCalibrator,
    ) -> Self {
        Self {
            params,
            backend,
            preflight,
            calibrator,
        }
    }

    /// Pipeline with default checks and calibration.
    pub fn with_backend(backend: Option<Arc<dyn InterpretationBackend>>) -> Self {
        Self::new(
            PipelineParams::default(),
            backend,
            PreFlightCheck::default(),
            ConfidenceCalibrator::default(),
        )
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn calibrator(&self) -> &ConfidenceCalibrator {
        &self.calibrator
    }

    pub fn calibrator_mut(&mut self) -> &mut ConfidenceCalibrator {
        &mut self.calibrator
    }

    pub fn run(
        &self,
        capture: Option<&Capture>,
        ctx: &AnalysisContext<'_>,
        now: Instant,
    ) -> PipelineResult {
        let started = Instant::now();
        let mut trace = Trace::default();
        let outcome = self.run_gates(capture, ctx, now, &mut trace);
        let total_ms = started.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            Ok((analysis, offline)) => {
                info!(
                    "AnalysisPipeline: success in {:.1} ms (confidence {:.2}{})",
                    total_ms,
                    analysis.confidence,
                    if offline { ", offline" } else { "" }
                );
                PipelineResult {
                    success: true,
                    error: None,
                    analysis: Some(analysis),
                    warnings: trace.warnings,
                    trace: trace.records,
                    total_ms,
                    offline_estimate: offline,
                }
            }
            Err(error) => PipelineResult {
                success: false,
                error: Some(error),
                analysis: None,
                warnings: trace.warnings,
                trace: trace.records,
                total_ms,
                offline_estimate: false,
            },
        }
    }

    fn run_gates(
        &self,
        capture: Option<&Capture>,
        ctx: &AnalysisContext<'_>,
        now: Instant,
        trace: &mut Trace,
    ) -> Result<(CalibratedAnalysis, bool), PipelineError> {
        let t = Instant::now();
        let Some(capture) = capture else {
            return Err(trace.fail(Gate::Capture, t, ErrorCode::NoCapture, "no capture to analyze", true));
        };
        trace.record(Gate::Capture, GateOutcome::Passed, t);

        let t = Instant::now();
        if let Err(msg) = check_outline(capture.quad.as_deref()) {
            return Err(trace.fail(Gate::Geometry, t, ErrorCode::InvalidGeometry, msg, true));
        }
        trace.record(Gate::Geometry, GateOutcome::Passed, t);

        let t = Instant::now();
        let report = self.preflight.run(capture, now);
        if !report.passed {
            let reason = report
                .primary_failure
                .unwrap_or_else(|| "pre-flight failed".to_owned());
            return Err(trace.fail(Gate::Preflight, t, ErrorCode::PreflightFailed, reason, true));
        }
        let outcome = if report.warnings.is_empty() {
            GateOutcome::Passed
        } else {
            GateOutcome::Warned
        };
        trace.warnings.extend(report.warnings);
        trace.record(Gate::Preflight, outcome, t);

        let t = Instant::now();
        if let Some(snapshot) = &capture.readiness {
            let density = snapshot.assessment.factors.edge_density;
            if density < self.params.min_edge_density {
                let msg = format!("page has no visible content (edge density {density:.3})");
                return Err(trace.fail(Gate::Content, t, ErrorCode::EmptyContent, msg, true));
            }
        }
        trace.record(Gate::Content, GateOutcome::Passed, t);

        let t = Instant::now();
        let (result, offline) = match &self.backend {
            None => {
                trace.warn("interpretation backend not configured, result is an offline estimate");
                (
                    offline_estimate(ctx.document_type, ctx.image_quality, "no backend"),
                    true,
                )
            }
            Some(backend) => {
                let request = AnalysisRequest {
                    image: capture.encoded.clone(),
                    instructions: ctx.instructions.to_owned(),
                    document_type: ctx.document_type.to_owned(),
                    timeout: Duration::from_millis(self.params.backend_timeout_ms),
                };
                match call_with_deadline(backend, request) {
                    Ok(result) => (result, false),
                    Err(err) if err.is_recoverable() => {
                        warn!("AnalysisPipeline: {} failed: {}", backend.name(), err);
                        trace.warn(format!(
                            "interpretation unavailable ({err}), result is an offline estimate"
                        ));
                        (
                            offline_estimate(ctx.document_type, ctx.image_quality, &err.to_string()),
                            true,
                        )
                    }
                    Err(err) => {
                        return Err(trace.fail(
                            Gate::Execution,
                            t,
                            ErrorCode::ExecutionFailed,
                            err.to_string(),
                            false,
                        ));
                    }
                }
            }
        };
        let outcome = if offline {
            GateOutcome::Fallback
        } else {
            GateOutcome::Passed
        };
        trace.record(Gate::Execution, outcome, t);

        let t = Instant::now();
        if let Err(msg) = validate_result(&result) {
            let msg = format!("{msg}; retry the analysis");
            return Err(trace.fail(Gate::Validation, t, ErrorCode::InvalidResult, msg, true));
        }
        trace.record(Gate::Validation, GateOutcome::Passed, t);

        Ok((self.calibrator.calibrate(result, ctx.image_quality), offline))
    }
}

/// Run the backend on a worker thread and stop waiting at `request.timeout`.
/// A reply that arrives later is dropped.
fn call_with_deadline(
    backend: &Arc<dyn InterpretationBackend>,
    request: AnalysisRequest,
) -> Result<AnalysisResult, BackendError> {
    let deadline = request.timeout;
    let worker = Arc::clone(backend);
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("interpretation".to_owned())
        .spawn(move || {
            // the receiver is gone once the deadline has passed
            let _ = tx.send(worker.analyze(&request));
        })
        .map_err(|e| BackendError::Transport(format!("could not start request: {e}")))?;
    match rx.recv_timeout(deadline) {
        Ok(reply) => reply,
        Err(RecvTimeoutError::Timeout) => {
            debug!("AnalysisPipeline: no reply within {:?}", deadline);
            Err(BackendError::Timeout(deadline))
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(BackendError::Transport("request worker stopped without a reply".to_owned()))
        }
    }
}

#[derive(Default)]
struct Trace {
    records: Vec<GateRecord>,
    warnings: Vec<String>,
}

impl Trace {
    fn record(&mut self, gate: Gate, outcome: GateOutcome, started: Instant) {
        self.records.push(GateRecord {
            gate,
            outcome,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        });
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn fail(
        &mut self,
        gate: Gate,
        started: Instant,
        code: ErrorCode,
        message: impl Into<String>,
        retryable: bool,
    ) -> PipelineError {
        self.record(gate, GateOutcome::Failed, started);
        let message = message.into();
        debug!("AnalysisPipeline: {:?} gate failed ({:?}): {}", gate, code, message);
        PipelineError {
            code,
            message,
            retryable,
        }
    }
}

fn check_outline(quad: Option<&[Point]>) -> Result<(), String> {
    let Some(points) = quad else {
        return Err("no document outline".to_owned());
    };
    if points.len() != 4 {
        return Err(format!("outline has {} corners, expected 4", points.len()));
    }
    if points.iter().flatten().any(|v| !v.is_finite()) {
        return Err("outline has non-finite coordinates".to_owned());
    }
    Ok(())
}

fn validate_result(result: &AnalysisResult) -> Result<(), String> {
    if result.document_type.trim().is_empty() {
        return Err("result has no document type".to_owned());
    }
    if !result.offline_estimate && result.items.is_empty() && result.overall_score.is_none() {
        return Err("result has neither items nor an overall score".to_owned());
    }
    if let Some(score) = result.overall_score {
        if !(0.0..=100.0).contains(&score) {
            return Err(format!("overall score {score} out of range"));
        }
    }
    if let Some(c) = result.confidence {
        if !(0.0..=1.0).contains(&c) {
            return Err(format!("confidence {c} out of range"));
        }
        if c == 1.0 {
            return Err("confidence of exactly 1.0 is not credible".to_owned());
        }
    }
    for item in &result.items {
        if item.question_id.trim().is_empty() {
            return Err("item without question id".to_owned());
        }
        if !(0.0..=100.0).contains(&item.score) {
            return Err(format!("item {} score {} out of range", item.question_id, item.score));
        }
        if !(0.0..=1.0).contains(&item.confidence) {
            return Err(format!(
                "item {} confidence {} out of range",
                item.question_id, item.confidence
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, ItemResult, ItemStatus};
    use crate::image::io::encode_png;
    use crate::preflight::PreflightParams;
    use crate::readiness::{Factors, ReadinessAssessment, ReadinessSnapshot};
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: Result<AnalysisResult, BackendError>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(reply: Result<AnalysisResult, BackendError>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl InterpretationBackend for Scripted {
        fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisResult, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn graded(confidence: f32) -> AnalysisResult {
        AnalysisResult {
            document_type: "quiz".into(),
            items: vec![ItemResult {
                question_id: "q1".into(),
                concept: Some("fractions".into()),
                response: Some("3/4".into()),
                score: 90.0,
                confidence: 0.85,
                status: ItemStatus::Legible,
                error_type: None,
            }],
            overall_score: Some(90.0),
            confidence: Some(confidence),
            summary: None,
            offline_estimate: false,
        }
    }

    fn snapshot(edge_density: f32, at: Instant) -> ReadinessSnapshot {
        ReadinessSnapshot {
            assessment: ReadinessAssessment {
                ready: true,
                score: 0.9,
                factors: Factors {
                    edge_density,
                    ..Factors::default()
                },
                stability_met: true,
                stability_progress: 1.0,
                guidance: Vec::new(),
                blocking_reasons: Vec::new(),
                quad: None,
            },
            taken_at: at,
        }
    }

    fn capture(now: Instant) -> Capture {
        let img = RgbImage::from_fn(256, 192, |x, y| {
            let v = if y % 16 < 5 && x % 14 < 8 { 25 } else { 225 };
            Rgb([v, v, v])
        });
        Capture::new(encode_png(&img).expect("encode"), now)
            .with_quad(
                vec![[40.0, 30.0], [280.0, 30.0], [280.0, 210.0], [40.0, 210.0]],
                (320, 240),
            )
            .with_readiness(snapshot(0.1, now))
    }

    const CTX: AnalysisContext<'static> = AnalysisContext {
        instructions: "grade the quiz",
        document_type: "quiz",
        image_quality: Some(0.8),
    };

    fn pipeline(backend: &Arc<Scripted>) -> AnalysisPipeline {
        let backend: Arc<dyn InterpretationBackend> = backend.clone();
        AnalysisPipeline::with_backend(Some(backend))
    }

    #[test]
    fn missing_capture_fails_first_gate() {
        let backend = Scripted::new(Ok(graded(0.8)));
        let out = pipeline(&backend).run(None, &CTX, Instant::now());
        assert!(!out.success);
        assert_eq!(out.error_code(), Some(ErrorCode::NoCapture));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn missing_outline_never_reaches_backend() {
        let now = Instant::now();
        let backend = Scripted::new(Ok(graded(0.8)));
        let mut cap = capture(now);
        cap.quad = None;
        let out = pipeline(&backend).run(Some(&cap), &CTX, now);
        assert_eq!(out.error_code(), Some(ErrorCode::InvalidGeometry));
        assert_eq!(out.failed_gate(), Some(Gate::Geometry));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn malformed_outlines_are_rejected() {
        let now = Instant::now();
        let backend = Scripted::new(Ok(graded(0.8)));
        let p = pipeline(&backend);
        for quad in [
            vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]],
            vec![[0.0, 0.0], [f32::NAN, 0.0], [10.0, 10.0], [0.0, 10.0]],
        ] {
            let mut cap = capture(now);
            cap.quad = Some(quad);
            assert_eq!(
                p.run(Some(&cap), &CTX, now).error_code(),
                Some(ErrorCode::InvalidGeometry)
            );
        }
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn good_capture_is_calibrated() {
        let now = Instant::now();
        let backend = Scripted::new(Ok(graded(0.8)));
        let out = pipeline(&backend).run(Some(&capture(now)), &CTX, now);
        assert!(out.success, "{:?}", out.error);
        assert!(!out.offline_estimate);
        assert_eq!(out.trace.len(), 6);
        let analysis = out.analysis.expect("analysis");
        assert!(analysis.confidence >= 0.1 && analysis.confidence <= 0.95);
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn network_error_falls_back_to_offline_estimate() {
        let now = Instant::now();
        let backend = Scripted::new(Err(BackendError::Transport("connection reset".into())));
        let out = pipeline(&backend).run(Some(&capture(now)), &CTX, now);
        assert!(out.success);
        assert!(out.offline_estimate);
        assert!(!out.warnings.is_empty());
        assert!(out.analysis.is_some_and(|a| a.result.offline_estimate));
        assert!(out
            .trace
            .iter()
            .any(|r| r.gate == Gate::Execution && r.outcome == GateOutcome::Fallback));
    }

    struct Slow(Duration);

    impl InterpretationBackend for Slow {
        fn analyze(&self, _request: &AnalysisRequest) -> Result<AnalysisResult, BackendError> {
            std::thread::sleep(self.0);
            Ok(graded(0.9))
        }
    }

    #[test]
    fn slow_backend_is_abandoned_at_the_deadline() {
        let now = Instant::now();
        let params = PipelineParams {
            backend_timeout_ms: 50,
            ..PipelineParams::default()
        };
        let backend: Arc<dyn InterpretationBackend> = Arc::new(Slow(Duration::from_millis(400)));
        let pipeline = AnalysisPipeline::new(
            params,
            Some(backend),
            PreFlightCheck::default(),
            ConfidenceCalibrator::default(),
        );
        let out = pipeline.run(Some(&capture(now)), &CTX, now);
        assert!(out.success, "{:?}", out.error);
        assert!(out.offline_estimate);
        assert!(out.total_ms < 350.0, "waited {} ms", out.total_ms);
        assert!(out.warnings.iter().any(|w| w.contains("timed out")));
        assert!(out
            .trace
            .iter()
            .any(|r| r.gate == Gate::Execution && r.outcome == GateOutcome::Fallback));
    }

    #[test]
    fn missing_backend_uses_offline_estimate() {
        let now = Instant::now();
        let out = AnalysisPipeline::with_backend(None).run(Some(&capture(now)), &CTX, now);
        assert!(out.success);
        assert!(out.offline_estimate);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn rejected_request_is_a_hard_failure() {
        let now = Instant::now();
        let backend = Scripted::new(Err(BackendError::Rejected("unsupported document".into())));
        let out = pipeline(&backend).run(Some(&capture(now)), &CTX, now);
        assert_eq!(out.error_code(), Some(ErrorCode::ExecutionFailed));
        assert!(out.error.is_some_and(|e| !e.retryable));
    }

    #[test]
    fn perfect_confidence_is_suspicious() {
        let now = Instant::now();
        let backend = Scripted::new(Ok(graded(1.0)));
        let out = pipeline(&backend).run(Some(&capture(now)), &CTX, now);
        assert_eq!(out.error_code(), Some(ErrorCode::InvalidResult));
        assert!(out.error.is_some_and(|e| e.message.contains("retry")));
    }

    #[test]
    fn sparse_snapshot_is_empty_content() {
        let now = Instant::now();
        let backend = Scripted::new(Ok(graded(0.8)));
        let preflight = PreFlightCheck::new(PreflightParams {
            min_edge_density: 0.0,
            ..PreflightParams::default()
        });
        let backend_dyn: Arc<dyn InterpretationBackend> = backend.clone();
        let p = AnalysisPipeline::new(
            PipelineParams::default(),
            Some(backend_dyn),
            preflight,
            ConfidenceCalibrator::default(),
        );
        let cap = capture(now).with_readiness(snapshot(0.005, now));
        let out = p.run(Some(&cap), &CTX, now);
        assert_eq!(out.error_code(), Some(ErrorCode::EmptyContent));
        assert!(!out.reached(Gate::Execution));
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn preflight_failure_carries_primary_reason() {
        let now = Instant::now();
        let backend = Scripted::new(Ok(graded(0.8)));
        let mut cap = capture(now);
        cap.encoded.truncate(10);
        let out = pipeline(&backend).run(Some(&cap), &CTX, now);
        assert_eq!(out.error_code(), Some(ErrorCode::PreflightFailed));
        assert!(out.error.is_some_and(|e| e.message.contains("too small")));
    }
}
