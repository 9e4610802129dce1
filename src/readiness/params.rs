//! Thresholds and weights for the readiness score.
use serde::Deserialize;

/// Composite score weights. Aspect ratio and focus only block; they do not
/// contribute to the score.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReadinessWeights {
    pub quad_confidence: f32,
    pub stability: f32,
    pub quality_estimate: f32,
    pub edge_density: f32,
    pub coverage: f32,
}

impl Default for ReadinessWeights {
    fn default() -> Self {
        Self {
            quad_confidence: 0.25,
            stability: 0.25,
            quality_estimate: 0.20,
            edge_density: 0.15,
            coverage: 0.15,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReadinessParams {
    /// Below this quad confidence the frame is critically blocked.
    pub min_confidence: f32,
    /// Fraction of strong neighbour changes inside the quad below which the
    /// surface is considered blank (critical).
    pub min_edge_density: f32,
    /// Density that maps to a full edge-density score.
    pub target_edge_density: f32,
    /// Intensity step (0..255) counted as a strong change.
    pub edge_step: u8,
    /// Shorter/longer mean side ratio below which the aspect is implausible.
    pub min_aspect_ratio: f32,
    pub too_far_coverage: f32,
    pub too_close_coverage: f32,
    /// Coverage band that scores 1.
    pub ideal_coverage_min: f32,
    pub ideal_coverage_max: f32,
    /// Focus score below which a warning block is raised.
    pub min_focus: f32,
    /// Laplacian variance mapping to a full focus score.
    pub focus_variance_target: f32,
    /// Half-size of the focus sampling window around the quad centroid.
    pub focus_window_half: usize,
    pub ready_score: f32,
    /// Continuous stability required before `ready`.
    pub min_stable_ms: u64,
    /// Engine-owned stability window length.
    pub stability_window: usize,
    /// Corner jitter (detection px) at or above which stability is lost.
    pub stability_jitter_px: f32,
    /// Quality estimate below which a lighting hint is given.
    pub min_quality_estimate: f32,
    pub weights: ReadinessWeights,
}

impl Default for ReadinessParams {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            min_edge_density: 0.015,
            target_edge_density: 0.1,
            edge_step: 24,
            min_aspect_ratio: 0.35,
            too_far_coverage: 0.15,
            too_close_coverage: 0.95,
            ideal_coverage_min: 0.3,
            ideal_coverage_max: 0.85,
            min_focus: 0.3,
            focus_variance_target: 250.0,
            focus_window_half: 24,
            ready_score: 0.7,
            min_stable_ms: 500,
            stability_window: 10,
            stability_jitter_px: 10.0,
            min_quality_estimate: 0.45,
            weights: ReadinessWeights::default(),
        }
    }
}
