use doc_capture::config::load_config;
use doc_capture::config::tools::AssessStillToolConfig;
use doc_capture::fingerprint::{Fingerprint, SemanticFingerprinter};
use doc_capture::image::io::{load_rgb_image, save_rgb_image, write_json_file};
use doc_capture::quality::{Fix, ImageEnhancer, ImageQualityAnalyzer, QualityReport};
use serde::Serialize;
use std::env;
use std::error::Error;
use std::path::Path;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config_path = env::args().nth(1).ok_or_else(usage)?;
    let config: AssessStillToolConfig = load_config(Path::new(&config_path))?;

    let rgb = load_rgb_image(&config.input)?;
    let report = ImageQualityAnalyzer::new(config.quality).analyze(&rgb);

    let mut fixes = Vec::new();
    let mut estimated_improvement = 0.0;
    let mut still = rgb;
    if report.can_auto_fix {
        let enhanced = ImageEnhancer::new(config.enhance).enhance(&still, &report);
        fixes = enhanced.fixes;
        estimated_improvement = enhanced.estimated_improvement;
        still = enhanced.image;
        if let Some(path) = &config.output.enhanced_image {
            save_rgb_image(&still, path)?;
            println!("Saved enhanced still to {}", path.display());
        }
    }

    let fingerprint = SemanticFingerprinter::new(config.fingerprint).fingerprint(&still);
    let summary = AssessStillSummary {
        input: config.input.display().to_string(),
        width: still.width(),
        height: still.height(),
        quality: report,
        fixes,
        estimated_improvement,
        fingerprint,
    };
    write_json_file(&config.output.report_json, &summary)?;

    println!(
        "Quality {:.2} ({} issues, proceed={}, auto-fix={})",
        summary.quality.overall_score,
        summary.quality.issues.len(),
        summary.quality.should_proceed,
        summary.quality.can_auto_fix
    );
    println!(
        "Saved report to {} (fingerprint {})",
        config.output.report_json.display(),
        summary.fingerprint.combined
    );
    Ok(())
}

fn usage() -> String {
    "Usage: assess_still <config.json>".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssessStillSummary {
    input: String,
    width: u32,
    height: u32,
    quality: QualityReport,
    fixes: Vec<Fix>,
    estimated_improvement: f32,
    fingerprint: Fingerprint,
}
