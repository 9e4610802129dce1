use super::calibration::CalibratedAnalysis;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoCapture,
    InvalidGeometry,
    PreflightFailed,
    EmptyContent,
    ExecutionFailed,
    InvalidResult,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Capture,
    Geometry,
    Preflight,
    Content,
    Execution,
    Validation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Passed,
    /// Passed with warnings attached.
    Warned,
    /// Execution fell back to a local estimate.
    Fallback,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateRecord {
    pub gate: Gate,
    pub outcome: GateOutcome,
    pub elapsed_ms: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineError {
    pub code: ErrorCode,
    pub message: String,
    /// Whether taking a new capture may succeed.
    pub retryable: bool,
}

/// Outcome of one pipeline run. Exactly one of `error` and `analysis` is set.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub success: bool,
    pub error: Option<PipelineError>,
    pub analysis: Option<CalibratedAnalysis>,
    pub warnings: Vec<String>,
    pub trace: Vec<GateRecord>,
    pub total_ms: f64,
    pub offline_estimate: bool,
}

impl PipelineResult {
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }

    /// Gate that stopped the run, if any.
    pub fn failed_gate(&self) -> Option<Gate> {
        self.trace
            .iter()
            .find(|r| r.outcome == GateOutcome::Failed)
            .map(|r| r.gate)
    }

    pub fn reached(&self, gate: Gate) -> bool {
        self.trace.iter().any(|r| r.gate == gate)
    }
}
