//! Full-resolution still assessment and correction.
//!
//! - [`ImageQualityAnalyzer`] measures blur, brightness, contrast, noise,
//!   skew and text density and derives a [`QualityReport`].
//! - [`ImageEnhancer`] applies only the corrections the report asks for.

mod analyzer;
mod enhance;
pub mod metrics;

pub use analyzer::{
    ImageQualityAnalyzer, IssueKind, IssueSeverity, Measurements, QualityIssue, QualityMetrics,
    QualityParams, QualityReport, QualityWeights, TextDensity,
};
pub use enhance::{
    brighten, rotate_bilinear, stretch_contrast, tone_curve, unsharp_mask, EnhanceParams,
    Enhancement, Fix, ImageEnhancer,
};
