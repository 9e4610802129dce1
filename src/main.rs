use doc_capture::backend::{
    AnalysisRequest, AnalysisResult, BackendError, InterpretationBackend, ItemResult, ItemStatus,
};
use doc_capture::source::{FrameSource, ImageSequence};
use doc_capture::store::LocalStore;
use doc_capture::{CaptureConfig, CaptureSession};
use image::{Rgb, RgbImage};
use std::sync::Arc;
use std::time::Instant;

/// Stands in for the remote service: grades two fixed questions.
struct DemoBackend;

impl InterpretationBackend for DemoBackend {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, BackendError> {
        let item = |id: &str, score: f32| ItemResult {
            question_id: id.to_string(),
            concept: Some("fractions".to_string()),
            response: None,
            score,
            confidence: 0.82,
            status: ItemStatus::Legible,
            error_type: None,
        };
        Ok(AnalysisResult {
            document_type: request.document_type.clone(),
            items: vec![item("q1", 85.0), item("q2", 70.0)],
            overall_score: Some(77.5),
            confidence: Some(0.8),
            summary: Some("demo grading".to_string()),
            offline_estimate: false,
        })
    }

    fn name(&self) -> &str {
        "demo"
    }
}

/// A light page with text-like stripes on a dark desk.
fn render_page(w: u32, h: u32) -> RgbImage {
    let (x0, y0, x1, y1) = (w / 6, h / 6, w - w / 6, h - h / 6);
    RgbImage::from_fn(w, h, |x, y| {
        if x < x0 || x >= x1 || y < y0 || y >= y1 {
            return Rgb([40, 36, 32]);
        }
        let (lx, ly) = (x - x0, y - y0);
        let margin = 24;
        let text = lx > margin
            && lx < (x1 - x0) - margin
            && ly > margin
            && ly < (y1 - y0) - margin
            && ly % 18 < 6
            && lx % 11 < 7;
        if text {
            Rgb([30, 30, 30])
        } else {
            Rgb([235, 235, 230])
        }
    })
}

fn main() {
    env_logger::init();

    let page = render_page(640, 480);
    let frames = vec![page; 20];
    let mut source = ImageSequence::from_images(&frames);
    let backend: Arc<dyn InterpretationBackend> = Arc::new(DemoBackend);
    let mut session = CaptureSession::new(
        "demo-session",
        CaptureConfig::default(),
        Some(backend),
        Box::new(LocalStore::new()),
    );

    let (w, h) = source.dimensions();
    println!("source {w}x{h}");

    let start = Instant::now();
    let mut now = start;
    while let Some(raw) = source.grab() {
        let frame = match raw.detection_frame() {
            Ok(f) => f,
            Err(err) => {
                eprintln!("Error: {err}");
                std::process::exit(1);
            }
        };
        let cycle = session.tick(&frame, now);
        println!(
            "t+{:>5} ms  found={} conf={:.2} score={:.2} ready={} hints={:?}",
            now.duration_since(start).as_millis(),
            cycle.detection.is_some(),
            cycle.smoothed.confidence,
            cycle.assessment.score,
            cycle.assessment.ready,
            cycle.assessment.messages()
        );
        for event in &cycle.events {
            println!("  event: {event:?}");
        }

        if cycle.assessment.ready {
            let still = match raw.encode_still() {
                Ok(bytes) => bytes,
                Err(err) => {
                    eprintln!("Error: {err}");
                    std::process::exit(1);
                }
            };
            match session.request_capture(still, now) {
                Ok(ticket) => {
                    println!(
                        "  captured {} (quality {:.2}, fixes {:?})",
                        ticket.page, ticket.quality.overall_score, ticket.fixes
                    );
                    let outcome = session.analyze(&ticket, "Grade each answer", "quiz", now);
                    println!(
                        "  analysis success={} offline={} record={:?} warnings={:?}",
                        outcome.result.success,
                        outcome.result.offline_estimate,
                        outcome.record,
                        outcome.result.warnings
                    );
                    if let Some(err) = &outcome.result.error {
                        println!("  error: {:?} {}", err.code, err.message);
                    }
                }
                Err(rejection) => println!("  capture rejected: {rejection}"),
            }
        }
        now += cycle.next_interval;
    }

    let summary = session.cross_page_analysis();
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("Error: {err}"),
    }
}
