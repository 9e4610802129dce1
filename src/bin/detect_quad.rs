use doc_capture::config::load_config;
use doc_capture::config::tools::DetectQuadToolConfig;
use doc_capture::diagnostics::DetectionReport;
use doc_capture::image::io::{load_grayscale_image, write_json_file};
use doc_capture::readiness::{ReadinessAssessment, ReadinessEngine, ReadinessInput};
use doc_capture::types::Frame;
use doc_capture::EdgeQuadDetector;
use serde::Serialize;
use std::env;
use std::error::Error;
use std::path::Path;
use std::time::Instant;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config: DetectQuadToolConfig = load_config(Path::new(&config_path))?;

    let gray = load_grayscale_image(&config.input)?;
    let max_long_edge = config.detector.max_long_edge;
    let frame = Frame::from_gray(&gray.as_view(), max_long_edge);

    let mut detector = EdgeQuadDetector::new(config.detector);
    let detection = detector.detect_with_diagnostics(&frame);

    // A single still has no history: full confidence, stability never met.
    let corners = detection.quad.map(|q| q.to_vec());
    let mut engine = ReadinessEngine::new(config.readiness);
    let readiness = engine.assess(
        &ReadinessInput {
            quad: corners.as_deref(),
            confidence: if corners.is_some() { 1.0 } else { 0.0 },
            frame: &frame,
        },
        Instant::now(),
    );

    let summary = DetectQuadSummary {
        input: config.input.display().to_string(),
        native_width: gray.width(),
        native_height: gray.height(),
        downscale: frame.downscale,
        detection,
        readiness,
    };
    write_json_file(&config.output.report_json, &summary)?;

    match &summary.detection.quad {
        Some(q) => println!(
            "Document found: corners {:?} (score {:.2})",
            q.scaled(frame.downscale).corners,
            summary.readiness.score
        ),
        None => println!("No document: {:?}", summary.detection.rejection),
    }
    println!(
        "Saved report to {} ({:.2} ms)",
        config.output.report_json.display(),
        summary.detection.timings.total_ms
    );
    Ok(())
}

fn usage() -> String {
    "Usage: detect_quad <config.json>".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectQuadSummary {
    input: String,
    native_width: usize,
    native_height: usize,
    downscale: f32,
    detection: DetectionReport,
    readiness: ReadinessAssessment,
}
