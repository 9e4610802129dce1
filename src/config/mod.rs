//! JSON configuration.
//!
//! [`CaptureConfig`] collects the parameters of every component; all fields
//! default, so a config file only needs the values it changes. Tool configs
//! for the command-line binaries live in [`tools`].

pub mod tools;

use crate::detector::DetectorParams;
use crate::error::{CaptureError, Result};
use crate::fingerprint::FingerprintParams;
use crate::pipeline::{CalibrationParams, PipelineParams};
use crate::preflight::PreflightParams;
use crate::quality::{EnhanceParams, QualityParams};
use crate::readiness::ReadinessParams;
use crate::reasoning::ReasonerParams;
use crate::session::SchedulerParams;
use crate::tracking::{SmootherParams, TrackerParams};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub detector: DetectorParams,
    pub smoother: SmootherParams,
    pub tracker: TrackerParams,
    pub readiness: ReadinessParams,
    pub quality: QualityParams,
    pub enhance: EnhanceParams,
    pub fingerprint: FingerprintParams,
    pub preflight: PreflightParams,
    pub pipeline: PipelineParams,
    pub calibration: CalibrationParams,
    pub reasoner: ReasonerParams,
    pub scheduler: SchedulerParams,
}

/// Read a JSON config file into any deserializable config type.
pub fn load_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).map_err(|e| CaptureError::io(path, e))?;
    serde_json::from_str(&data).map_err(|source| CaptureError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: CaptureConfig = serde_json::from_str(
            r#"{ "readiness": { "ready_score": 0.8 }, "scheduler": { "base_interval_ms": 100 } }"#,
        )
        .expect("parse");
        assert_eq!(cfg.readiness.ready_score, 0.8);
        assert_eq!(cfg.readiness.min_stable_ms, 500);
        assert_eq!(cfg.scheduler.base_interval_ms, 100);
        assert_eq!(cfg.scheduler.throttled_interval_ms, 500);
        assert_eq!(cfg.tracker.iou_threshold, 0.45);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config::<CaptureConfig>(Path::new("/nonexistent/doc_capture.json"))
            .expect_err("missing");
        assert!(matches!(err, CaptureError::Io { .. }));
    }
}
