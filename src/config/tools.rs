use crate::detector::DetectorParams;
use crate::fingerprint::FingerprintParams;
use crate::quality::{EnhanceParams, QualityParams};
use crate::readiness::ReadinessParams;
use serde::Deserialize;
use std::path::PathBuf;

/// Config for `detect_quad`: one image in, detection and readiness JSON out.
#[derive(Debug, Deserialize)]
pub struct DetectQuadToolConfig {
    pub input: PathBuf,
    #[serde(default)]
    pub detector: DetectorParams,
    #[serde(default)]
    pub readiness: ReadinessParams,
    pub output: DetectQuadOutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct DetectQuadOutputConfig {
    pub report_json: PathBuf,
}

/// Config for `assess_still`: quality report, enhancement and fingerprint.
#[derive(Debug, Deserialize)]
pub struct AssessStillToolConfig {
    pub input: PathBuf,
    #[serde(default)]
    pub quality: QualityParams,
    #[serde(default)]
    pub enhance: EnhanceParams,
    #[serde(default)]
    pub fingerprint: FingerprintParams,
    pub output: AssessStillOutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct AssessStillOutputConfig {
    pub report_json: PathBuf,
    /// Written only when the enhancer ran.
    #[serde(default)]
    pub enhanced_image: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_config_parses_with_defaults() {
        let cfg: AssessStillToolConfig = serde_json::from_str(
            r#"{ "input": "page.jpg", "output": { "report_json": "out/report.json" } }"#,
        )
        .expect("parse");
        assert_eq!(cfg.input, PathBuf::from("page.jpg"));
        assert!(cfg.output.enhanced_image.is_none());
        assert_eq!(cfg.quality.analysis_long_edge, 1600);
    }
}
