mod common;

use common::synthetic_image::{document_rgb, frame_of, png_of, PAPER};
use doc_capture::backend::{
    AnalysisRequest, AnalysisResult, BackendError, InterpretationBackend,
};
use doc_capture::pipeline::{AnalysisContext, Gate, GateOutcome};
use doc_capture::readiness::ReadinessInput;
use doc_capture::{AnalysisPipeline, Capture, EdgeQuadDetector, ErrorCode, ReadinessEngine};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PAGE: (u32, u32, u32, u32) = (60, 40, 260, 200);

const CTX: AnalysisContext<'static> = AnalysisContext {
    instructions: "grade every answer",
    document_type: "worksheet",
    image_quality: Some(0.75),
};

struct Failing {
    error: BackendError,
    calls: AtomicUsize,
}

impl InterpretationBackend for Failing {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, BackendError> {
        assert_eq!(request.timeout, Duration::from_millis(30_000));
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

fn failing(error: BackendError) -> Arc<Failing> {
    Arc::new(Failing {
        error,
        calls: AtomicUsize::new(0),
    })
}

fn pipeline(backend: &Arc<Failing>) -> AnalysisPipeline {
    let backend: Arc<dyn InterpretationBackend> = backend.clone();
    AnalysisPipeline::with_backend(Some(backend))
}

/// Run detection and readiness over a steady view of `still`, then package
/// the still the way a session would.
fn live_capture(still: &RgbImage, start: Instant) -> (Capture, Instant) {
    let _ = env_logger::builder().is_test(true).try_init();
    let frame = frame_of(still);
    let mut detector = EdgeQuadDetector::default();
    let mut readiness = ReadinessEngine::default();
    let mut now = start;
    let mut quad = None;
    for _ in 0..8 {
        quad = detector.detect(&frame);
        let input = ReadinessInput {
            quad: quad.as_ref().map(|q| q.corners.as_slice()),
            confidence: if quad.is_some() { 1.0 } else { 0.0 },
            frame: &frame,
        };
        readiness.assess(&input, now);
        now += Duration::from_millis(200);
    }
    let mut capture = Capture::new(png_of(still), now);
    if let Some(q) = quad {
        capture = capture.with_quad(q.to_vec(), (frame.width(), frame.height()));
    }
    if let Some(snapshot) = readiness.snapshot() {
        capture = capture.with_readiness(snapshot);
    }
    (capture, now)
}

#[test]
fn unreachable_service_yields_offline_estimate() {
    let (capture, now) = live_capture(&document_rgb(320, 240, PAGE), Instant::now());
    assert!(capture.quad.is_some());
    let backend = failing(BackendError::Transport("connection refused".into()));
    let out = pipeline(&backend).run(Some(&capture), &CTX, now);

    assert!(out.success, "{:?}", out.error);
    assert!(out.offline_estimate);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    assert!(out.warnings.iter().any(|w| w.contains("offline")));
    assert!(out
        .trace
        .iter()
        .any(|r| r.gate == Gate::Execution && r.outcome == GateOutcome::Fallback));
    let analysis = out.analysis.expect("offline analysis");
    assert!(analysis.result.offline_estimate);
    assert_eq!(analysis.result.document_type, "worksheet");
    assert!(analysis.confidence <= 0.5);
}

#[test]
fn rate_limited_service_is_recoverable() {
    let (capture, now) = live_capture(&document_rgb(320, 240, PAGE), Instant::now());
    let backend = failing(BackendError::RateLimited {
        retry_after: Some(Duration::from_secs(5)),
    });
    let out = pipeline(&backend).run(Some(&capture), &CTX, now);
    assert!(out.success);
    assert!(out.offline_estimate);
}

#[test]
fn rejected_request_fails_execution() {
    let (capture, now) = live_capture(&document_rgb(320, 240, PAGE), Instant::now());
    let backend = failing(BackendError::Rejected("unsupported document".into()));
    let out = pipeline(&backend).run(Some(&capture), &CTX, now);
    assert!(!out.success);
    assert_eq!(out.error_code(), Some(ErrorCode::ExecutionFailed));
    assert_eq!(out.failed_gate(), Some(Gate::Execution));
    assert!(out.error.is_some_and(|e| !e.retryable));
}

#[test]
fn capture_without_outline_never_reaches_service() {
    let still = document_rgb(320, 240, PAGE);
    let capture = Capture::new(png_of(&still), Instant::now());
    let backend = failing(BackendError::Transport("unused".into()));
    let out = pipeline(&backend).run(Some(&capture), &CTX, Instant::now());
    assert_eq!(out.error_code(), Some(ErrorCode::InvalidGeometry));
    assert!(out.reached(Gate::Capture));
    assert!(!out.reached(Gate::Preflight));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn blank_page_stops_before_the_service() {
    // A page with an outline but nothing written on it.
    let still = RgbImage::from_fn(320, 240, |x, y| {
        if (60..260).contains(&x) && (40..200).contains(&y) {
            Rgb([PAPER; 3])
        } else {
            Rgb([40; 3])
        }
    });
    let (capture, now) = live_capture(&still, Instant::now());
    assert!(capture.quad.is_some(), "outline of the blank page");
    let backend = failing(BackendError::Transport("unused".into()));
    let out = pipeline(&backend).run(Some(&capture), &CTX, now);
    assert!(!out.success);
    assert!(matches!(
        out.failed_gate(),
        Some(Gate::Preflight) | Some(Gate::Content)
    ));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn old_capture_is_only_a_warning() {
    let (capture, now) = live_capture(&document_rgb(320, 240, PAGE), Instant::now());
    let backend = failing(BackendError::Timeout(Duration::from_secs(30)));
    let much_later = now + Duration::from_secs(600);
    let out = pipeline(&backend).run(Some(&capture), &CTX, much_later);
    assert!(out.success, "{:?}", out.error);
    assert!(out.warnings.iter().any(|w| w.contains("old")));
    assert!(out
        .trace
        .iter()
        .any(|r| r.gate == Gate::Preflight && r.outcome == GateOutcome::Warned));
}
