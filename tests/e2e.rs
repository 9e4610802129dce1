mod common;

use common::synthetic_image::{blank_rgb, document_rgb, frame_of, png_of};
use doc_capture::backend::{
    AnalysisRequest, AnalysisResult, BackendError, InterpretationBackend, ItemResult, ItemStatus,
};
use doc_capture::quality::IssueKind;
use doc_capture::store::{LocalStore, RecordFilter, RecordStore};
use doc_capture::tracking::{PageId, PageStatus};
use doc_capture::types::Frame;
use doc_capture::{CaptureConfig, CaptureRejection, CaptureSession, CycleOutcome, FeedbackEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PAGE: (u32, u32, u32, u32) = (60, 40, 260, 200);

struct Grader;

impl InterpretationBackend for Grader {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, BackendError> {
        assert!(!request.image.is_empty());
        Ok(AnalysisResult {
            document_type: request.document_type.clone(),
            items: vec![ItemResult {
                question_id: "q1".into(),
                concept: Some("fractions".into()),
                response: Some("1/2".into()),
                score: 100.0,
                confidence: 0.9,
                status: ItemStatus::Legible,
                error_type: None,
            }],
            overall_score: Some(100.0),
            confidence: Some(0.88),
            summary: None,
            offline_estimate: false,
        })
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn session(backend: Option<Arc<dyn InterpretationBackend>>) -> CaptureSession {
    CaptureSession::new(
        "test-session",
        CaptureConfig::default(),
        backend,
        Box::new(LocalStore::new()),
    )
}

/// Tick at the session's own pace until readiness holds; returns the time
/// of the ready cycle.
fn tick_until_ready(s: &mut CaptureSession, frame: &Frame, start: Instant) -> (Instant, CycleOutcome) {
    let mut now = start;
    for _ in 0..20 {
        let cycle = s.tick(frame, now);
        if cycle.assessment.ready {
            return (now, cycle);
        }
        now += cycle.next_interval;
    }
    panic!("page never became ready");
}

#[test]
fn stable_document_becomes_ready_and_is_analyzed() {
    init_logging();
    let still = document_rgb(320, 240, PAGE);
    let frame = frame_of(&still);
    let backend: Arc<dyn InterpretationBackend> = Arc::new(Grader);
    let mut s = session(Some(backend));

    let t0 = Instant::now();
    let (now, cycle) = tick_until_ready(&mut s, &frame, t0);
    let quad = cycle.detection.expect("detected quad");
    assert!((quad.corners[0][0] - 60.0).abs() < 4.0, "{:?}", quad.corners);
    assert!(now.duration_since(t0) >= Duration::from_millis(500));
    assert!(cycle.assessment.blocking_reasons.is_empty());
    let page = cycle.page.expect("page id");

    let ticket = s.request_capture(png_of(&still), now).expect("capture accepted");
    assert_eq!(ticket.page, page);
    assert_eq!(s.tracker().page(page).map(|p| p.status), Some(PageStatus::Captured));

    let outcome = s.analyze(&ticket, "grade", "quiz", now);
    assert!(outcome.result.success, "{:?}", outcome.result.error);
    assert!(!outcome.result.offline_estimate);
    assert!(outcome.record.is_some());
    assert!(matches!(
        outcome.events.as_slice(),
        [FeedbackEvent::AnalysisSucceeded { .. }]
    ));
    let analysis = outcome.result.analysis.expect("calibrated analysis");
    assert!(analysis.confidence >= 0.1 && analysis.confidence <= 0.95);
    assert_eq!(s.tracker().page(page).map(|p| p.status), Some(PageStatus::Complete));

    let summary = s.cross_page_analysis();
    assert_eq!(summary.pages, vec![page]);
    assert_eq!(summary.items.len(), 1);
}

#[test]
fn ready_transition_event_fires_once() {
    init_logging();
    let frame = frame_of(&document_rgb(320, 240, PAGE));
    let mut s = session(None);
    let mut now = Instant::now();
    let mut fired = 0;
    for _ in 0..12 {
        let cycle = s.tick(&frame, now);
        fired += cycle
            .events
            .iter()
            .filter(|e| matches!(e, FeedbackEvent::ReadyTransition { .. }))
            .count();
        now += cycle.next_interval;
    }
    assert_eq!(fired, 1);
}

#[test]
fn detection_interval_throttles_then_recovers() {
    init_logging();
    let frame = frame_of(&document_rgb(320, 240, PAGE));
    let empty = frame_of(&blank_rgb(320, 240, 128));
    let mut s = session(None);
    let mut now = Instant::now();
    let mut last = Duration::ZERO;
    for _ in 0..30 {
        let cycle = s.tick(&frame, now);
        last = cycle.next_interval;
        now += cycle.next_interval;
    }
    assert_eq!(last, Duration::from_millis(500));
    let cycle = s.tick(&empty, now);
    assert_eq!(cycle.next_interval, Duration::from_millis(200));
}

#[test]
fn capture_without_page_is_rejected() {
    let mut s = session(None);
    let still = document_rgb(320, 240, PAGE);
    let err = s
        .request_capture(png_of(&still), Instant::now())
        .expect_err("no page yet");
    assert!(matches!(err, CaptureRejection::NoPage));
}

#[test]
fn second_capture_while_in_flight_is_busy() {
    init_logging();
    let still = document_rgb(320, 240, PAGE);
    let frame = frame_of(&still);
    let mut s = session(None);
    let (now, _) = tick_until_ready(&mut s, &frame, Instant::now());
    s.request_capture(png_of(&still), now).expect("first capture");
    let err = s.request_capture(png_of(&still), now).expect_err("busy");
    assert!(matches!(err, CaptureRejection::Busy));
    assert!(s.is_busy());
}

#[test]
fn blurry_still_is_rejected_with_remediation() {
    init_logging();
    let frame = frame_of(&document_rgb(320, 240, PAGE));
    let mut s = session(None);
    let (now, _) = tick_until_ready(&mut s, &frame, Instant::now());
    let err = s
        .request_capture(png_of(&blank_rgb(320, 240, 128)), now)
        .expect_err("blank still");
    match err {
        CaptureRejection::Quality {
            issue,
            recommendation,
            ..
        } => {
            assert_eq!(issue, IssueKind::Blurry);
            assert_eq!(recommendation, IssueKind::Blurry.recommendation());
        }
        other => panic!("unexpected rejection {other:?}"),
    }
    assert!(!s.is_busy());
}

#[test]
fn recapturing_the_same_page_is_a_duplicate() {
    init_logging();
    let still = document_rgb(320, 240, PAGE);
    let frame = frame_of(&still);
    let mut s = session(None);
    let (now, cycle) = tick_until_ready(&mut s, &frame, Instant::now());
    let first = cycle.page.expect("page");
    let ticket = s.request_capture(png_of(&still), now).expect("capture");
    let outcome = s.analyze(&ticket, "grade", "quiz", now);
    assert!(outcome.result.success);
    assert!(outcome.result.offline_estimate);

    // The completed page is closed, so the same view opens a new page.
    let later = now + Duration::from_millis(200);
    let cycle = s.tick(&frame, later);
    assert_ne!(cycle.page, Some(first));
    match s.request_capture(png_of(&still), later) {
        Err(CaptureRejection::Duplicate { page, similarity }) => {
            assert_eq!(page, first);
            assert!(similarity > 0.85);
        }
        other => panic!("expected duplicate, got {other:?}"),
    }
}

#[test]
fn offline_results_are_persisted_locally() {
    init_logging();
    let still = document_rgb(320, 240, PAGE);
    let frame = frame_of(&still);
    let mut s = session(None);
    let (now, _) = tick_until_ready(&mut s, &frame, Instant::now());
    let ticket = s.request_capture(png_of(&still), now).expect("capture");
    let outcome = s.analyze(&ticket, "grade", "quiz", now);
    let id = outcome.record.expect("stored");
    assert_eq!(id.0, "local-1");
    assert!(outcome.result.warnings.iter().any(|w| w.contains("offline")));
}

#[test]
fn reset_clears_pages_and_in_flight_capture() {
    init_logging();
    let still = document_rgb(320, 240, PAGE);
    let frame = frame_of(&still);
    let mut s = session(None);
    let (now, _) = tick_until_ready(&mut s, &frame, Instant::now());
    s.request_capture(png_of(&still), now).expect("capture");
    s.reset();
    assert!(!s.is_busy());
    assert!(s.tracker().pages().is_empty());
    assert_eq!(s.current_page(), None);
    let mut later = now;
    let mut pages = Vec::new();
    for _ in 0..5 {
        later += Duration::from_millis(200);
        let cycle = s.tick(&frame, later);
        assert!(!cycle.assessment.ready);
        pages.push(cycle.page);
    }
    // Numbering restarts once the outline has held long enough to track.
    assert_eq!(pages[0], None);
    assert_eq!(pages[4], Some(PageId(1)));
}

#[test]
fn single_spurious_outline_opens_no_page() {
    init_logging();
    let page = frame_of(&document_rgb(320, 240, PAGE));
    let empty = frame_of(&blank_rgb(320, 240, 128));
    let mut s = session(None);
    let mut now = Instant::now();

    let cycle = s.tick(&page, now);
    assert!(cycle.detection.is_some(), "raw outline in the first frame");
    assert_eq!(cycle.page, None);
    for _ in 0..6 {
        now += Duration::from_millis(200);
        let cycle = s.tick(&empty, now);
        assert_eq!(cycle.page, None);
    }
    assert!(s.tracker().pages().is_empty());
    assert_eq!(s.current_page(), None);
    assert!(matches!(
        s.request_capture(png_of(&document_rgb(320, 240, PAGE)), now),
        Err(CaptureRejection::NoPage)
    ));
}

#[test]
fn store_filter_by_session() {
    let mut store = LocalStore::new();
    let result = AnalysisResult {
        document_type: "quiz".into(),
        ..AnalysisResult::default()
    };
    store
        .insert(doc_capture::store::AnalysisRecord::new("a", PageId(1), 0.5, result.clone()))
        .expect("insert");
    store
        .insert(doc_capture::store::AnalysisRecord::new("b", PageId(1), 0.5, result))
        .expect("insert");
    let found = store.query(&RecordFilter::session("b")).expect("query");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].session_id, "b");
}
