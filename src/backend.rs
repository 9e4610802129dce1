//! Seam to the remote interpretation service.
//!
//! The service is opaque: it takes an encoded still plus instructions and
//! returns a structured per-item result. Its responses are validated by the
//! analysis pipeline before anything downstream trusts them.
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AnalysisRequest {
    /// Encoded still (PNG or JPEG).
    pub image: Vec<u8>,
    pub instructions: String,
    pub document_type: String,
    /// The backend must give up and return [`BackendError::Timeout`] after this.
    pub timeout: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Legible,
    Illegible,
    Partial,
    Skipped,
}

/// Interpretation of one question or field on the page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub question_id: String,
    #[serde(default)]
    pub concept: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    /// Score in points out of 100.
    pub score: f32,
    pub confidence: f32,
    pub status: ItemStatus,
    #[serde(default)]
    pub error_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub document_type: String,
    #[serde(default)]
    pub items: Vec<ItemResult>,
    /// Page score out of 100, when the service grades the page as a whole.
    #[serde(default)]
    pub overall_score: Option<f32>,
    /// The service's self-reported confidence.
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Set when the result was computed locally instead of by the service.
    #[serde(default)]
    pub offline_estimate: bool,
}

impl AnalysisResult {
    /// Mean item score, falling back to the overall score.
    pub fn mean_score(&self) -> Option<f32> {
        if self.items.is_empty() {
            return self.overall_score;
        }
        Some(self.items.iter().map(|i| i.score).sum::<f32>() / self.items.len() as f32)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Failures the pipeline recovers from with an offline estimate.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, BackendError::Rejected(_))
    }
}

pub trait InterpretationBackend: Send + Sync {
    fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, BackendError>;

    fn name(&self) -> &str {
        "interpretation"
    }
}
