//! Local stand-in result used when the interpretation service is unreachable.
use crate::backend::AnalysisResult;

/// Ceiling on the confidence an offline estimate may report.
const MAX_OFFLINE_CONFIDENCE: f32 = 0.5;

/// Build a result that carries no item interpretations, only a summary and a
/// conservative confidence derived from the still's quality.
pub fn offline_estimate(document_type: &str, image_quality: Option<f32>, reason: &str) -> AnalysisResult {
    let quality = image_quality.unwrap_or(0.5).clamp(0.0, 1.0);
    AnalysisResult {
        document_type: document_type.to_owned(),
        items: Vec::new(),
        overall_score: None,
        confidence: Some((0.2 + 0.3 * quality).min(MAX_OFFLINE_CONFIDENCE)),
        summary: Some(format!(
            "Estimated locally, interpretation unavailable ({reason}). Re-run analysis when online."
        )),
        offline_estimate: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_tagged_and_capped() {
        let r = offline_estimate("quiz", Some(1.0), "timeout");
        assert!(r.offline_estimate);
        assert!(r.items.is_empty());
        assert_eq!(r.document_type, "quiz");
        assert_eq!(r.confidence, Some(0.5));
        assert!(r.summary.as_deref().is_some_and(|s| s.contains("timeout")));
    }
}
