//! Still-image quality report.
//!
//! Six metrics are normalised into `[0, 1]` (higher is better) and combined
//! with fixed weights. Per-metric thresholds produce issues with a severity;
//! the report's `should_proceed` and `can_auto_fix` flags drive the capture
//! path.
use super::metrics::{
    dominant_skew, histogram, percentile, sharpness, tile_noise_variance, transition_rate,
};
use crate::error::Result;
use crate::image::io::decode_still;
use crate::image::resample::fit_long_edge;
use crate::image::{GrayImageU8, ImageU8};
use image::RgbImage;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub blur: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub noise: f32,
    pub skew: f32,
    pub text_density: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            blur: 0.25,
            brightness: 0.15,
            contrast: 0.20,
            noise: 0.15,
            skew: 0.10,
            text_density: 0.15,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QualityParams {
    /// Stills with a longer edge are area-downsampled before measuring.
    pub analysis_long_edge: usize,
    /// Laplacian variance that maps to a full blur score.
    pub blur_variance_target: f32,
    /// p95 − p5 spread that maps to a full contrast score.
    pub contrast_full_spread: f32,
    pub noise_tile: usize,
    pub noise_percentile: f32,
    /// Tile variance that maps to a zero noise score.
    pub noise_variance_ceiling: f32,
    /// Skew (degrees) that maps to a zero skew score.
    pub max_skew_deg: f32,
    pub skew_long_edge: usize,
    pub skew_edge_threshold: f32,
    pub text_radius: usize,
    pub text_offset: f32,
    /// Transition rates below this are too sparse, above `text_saturated`
    /// the page is saturated.
    pub text_sparse: f32,
    pub text_saturated: f32,
    /// Overall score above which the still proceeds.
    pub proceed_score: f32,
    pub weights: QualityWeights,
}

impl Default for QualityParams {
    fn default() -> Self {
        Self {
            analysis_long_edge: 1600,
            blur_variance_target: 150.0,
            contrast_full_spread: 160.0,
            noise_tile: 8,
            noise_percentile: 0.1,
            noise_variance_ceiling: 100.0,
            max_skew_deg: 15.0,
            skew_long_edge: 400,
            skew_edge_threshold: 0.35,
            text_radius: 7,
            text_offset: 10.0,
            text_sparse: 0.01,
            text_saturated: 0.3,
            proceed_score: 0.4,
            weights: QualityWeights::default(),
        }
    }
}

/// Normalised metrics, higher is better.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    pub blur: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub noise: f32,
    pub skew: f32,
    pub text_density: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextDensity {
    TooSparse,
    Good,
    Saturated,
}

/// Physical measurements behind the metrics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    pub laplacian_variance: f32,
    pub mean_luma: f32,
    pub p5: u8,
    pub p95: u8,
    pub noise_variance: f32,
    /// Signed skew in degrees (0 when no dominant line was found).
    pub skew_deg: f32,
    pub transition_rate: f32,
    pub text_density: TextDensity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Critical,
    Moderate,
    Info,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Blurry,
    Dark,
    Overexposed,
    LowContrast,
    Noisy,
    Skewed,
    SparseText,
    DenseText,
}

impl IssueKind {
    /// Issues the enhancer can correct.
    pub fn is_fixable(self) -> bool {
        matches!(self, IssueKind::LowContrast | IssueKind::Dark | IssueKind::Skewed)
    }

    pub fn recommendation(self) -> &'static str {
        match self {
            IssueKind::Blurry => "Hold the camera still and tap to focus before capturing",
            IssueKind::Dark => "Add more light or move to a brighter spot",
            IssueKind::Overexposed => "Avoid direct light or glare on the page",
            IssueKind::LowContrast => "Use even lighting so the writing stands out",
            IssueKind::Noisy => "Improve lighting to reduce grain",
            IssueKind::Skewed => "Line the page up with the edges of the frame",
            IssueKind::SparseText => "Check that the written side of the page is facing the camera",
            IssueKind::DenseText => "Move closer so the writing is larger",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    /// Normalised metric value that triggered the issue.
    pub value: f32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub metrics: QualityMetrics,
    pub measurements: Measurements,
    pub overall_score: f32,
    pub issues: Vec<QualityIssue>,
    pub recommendations: Vec<&'static str>,
    /// At least one issue is fixable and every critical issue is. A clean
    /// report is not auto-fixable.
    pub can_auto_fix: bool,
    pub should_proceed: bool,
}

impl QualityReport {
    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }

    /// Most severe issue, critical before moderate before info.
    pub fn worst_issue(&self) -> Option<&QualityIssue> {
        self.issues.iter().min_by_key(|i| i.severity as u8)
    }
}

pub struct ImageQualityAnalyzer {
    params: QualityParams,
}

impl ImageQualityAnalyzer {
    pub fn new(params: QualityParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &QualityParams {
        &self.params
    }

    /// Decode and analyze an encoded still.
    pub fn analyze_encoded(&self, bytes: &[u8]) -> Result<QualityReport> {
        let rgb = decode_still(bytes)?;
        Ok(self.analyze(&rgb))
    }

    pub fn analyze(&self, rgb: &RgbImage) -> QualityReport {
        self.analyze_gray(&GrayImageU8::from_rgb(rgb).as_view())
    }

    pub fn analyze_gray(&self, gray: &ImageU8<'_>) -> QualityReport {
        let p = &self.params;
        let (work, _) = fit_long_edge(gray, p.analysis_long_edge);
        let img = work.as_view();
        let measurements = self.measure(&img);
        let metrics = self.normalise(&measurements);
        let overall_score = self.overall(&metrics);
        let issues = self.issues(&metrics, &measurements);

        let can_auto_fix = auto_fixable(&issues);
        let mut recommendations: Vec<&'static str> =
            issues.iter().map(|i| i.kind.recommendation()).collect();
        recommendations.dedup();

        debug!(
            "ImageQualityAnalyzer: {}x{} overall {:.3} issues {:?}",
            work.width(),
            work.height(),
            overall_score,
            issues.iter().map(|i| i.kind).collect::<Vec<_>>()
        );
        QualityReport {
            metrics,
            measurements,
            overall_score,
            issues,
            recommendations,
            can_auto_fix,
            should_proceed: overall_score > p.proceed_score,
        }
    }

    fn measure(&self, img: &ImageU8<'_>) -> Measurements {
        let p = &self.params;
        let hist = histogram(img);
        let transition = transition_rate(img, p.text_radius, p.text_offset);
        let text_density = if transition < p.text_sparse {
            TextDensity::TooSparse
        } else if transition > p.text_saturated {
            TextDensity::Saturated
        } else {
            TextDensity::Good
        };
        Measurements {
            laplacian_variance: sharpness(img),
            mean_luma: img.mean(),
            p5: percentile(&hist, 0.05),
            p95: percentile(&hist, 0.95),
            noise_variance: tile_noise_variance(img, p.noise_tile, p.noise_percentile),
            skew_deg: dominant_skew(img, p.skew_long_edge, p.skew_edge_threshold)
                .map_or(0.0, f32::to_degrees),
            transition_rate: transition,
            text_density,
        }
    }

    fn normalise(&self, m: &Measurements) -> QualityMetrics {
        let p = &self.params;
        let text_density = match m.text_density {
            TextDensity::Good => 1.0,
            TextDensity::TooSparse => m.transition_rate / p.text_sparse.max(1e-6),
            TextDensity::Saturated => {
                1.0 - (m.transition_rate - p.text_saturated) / p.text_saturated.max(1e-6)
            }
        };
        QualityMetrics {
            blur: unit(m.laplacian_variance / p.blur_variance_target.max(1e-3)),
            brightness: unit(1.0 - (m.mean_luma - 128.0).abs() / 128.0),
            contrast: unit((m.p95 as f32 - m.p5 as f32) / p.contrast_full_spread.max(1.0)),
            noise: unit(1.0 - m.noise_variance / p.noise_variance_ceiling.max(1e-3)),
            skew: unit(1.0 - m.skew_deg.abs() / p.max_skew_deg.max(1e-3)),
            text_density: unit(text_density),
        }
    }

    /// Fixed weighted sum of the metrics.
    pub fn overall(&self, m: &QualityMetrics) -> f32 {
        let w = &self.params.weights;
        unit(
            w.blur * m.blur
                + w.brightness * m.brightness
                + w.contrast * m.contrast
                + w.noise * m.noise
                + w.skew * m.skew
                + w.text_density * m.text_density,
        )
    }

    fn issues(&self, m: &QualityMetrics, raw: &Measurements) -> Vec<QualityIssue> {
        use IssueSeverity::*;
        let mut out = Vec::new();
        let mut push = |kind, severity, value| {
            out.push(QualityIssue {
                kind,
                severity,
                value,
            })
        };

        if m.blur < 0.3 {
            push(IssueKind::Blurry, Critical, m.blur);
        } else if m.blur < 0.6 {
            push(IssueKind::Blurry, Moderate, m.blur);
        }

        let light = if raw.mean_luma < 128.0 {
            IssueKind::Dark
        } else {
            IssueKind::Overexposed
        };
        if m.brightness < 0.4 {
            push(light, Critical, m.brightness);
        } else if m.brightness < 0.65 {
            push(light, Moderate, m.brightness);
        }

        if m.contrast < 0.3 {
            push(IssueKind::LowContrast, Critical, m.contrast);
        } else if m.contrast < 0.5 {
            push(IssueKind::LowContrast, Moderate, m.contrast);
        }

        if m.noise < 0.3 {
            push(IssueKind::Noisy, Moderate, m.noise);
        } else if m.noise < 0.6 {
            push(IssueKind::Noisy, Info, m.noise);
        }

        let skew = raw.skew_deg.abs();
        if skew > 10.0 {
            push(IssueKind::Skewed, Critical, m.skew);
        } else if skew > 4.0 {
            push(IssueKind::Skewed, Moderate, m.skew);
        }

        match raw.text_density {
            TextDensity::TooSparse => push(IssueKind::SparseText, Info, m.text_density),
            TextDensity::Saturated => push(IssueKind::DenseText, Moderate, m.text_density),
            TextDensity::Good => {}
        }
        out
    }
}

impl Default for ImageQualityAnalyzer {
    fn default() -> Self {
        Self::new(QualityParams::default())
    }
}

fn auto_fixable(issues: &[QualityIssue]) -> bool {
    issues.iter().any(|i| i.kind.is_fixable())
        && issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Critical)
            .all(|i| i.kind.is_fixable())
}

#[inline]
fn unit(v: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Paper with short dark strokes on a regular grid.
    fn text_page(w: usize, h: usize, paper: u8, ink: u8) -> GrayImageU8 {
        let mut img = GrayImageU8::filled(w, h, paper);
        for y in 0..h {
            for x in 0..w {
                let in_line = (y % 16) < 4 && y > 20 && y + 20 < h;
                let in_word = (x % 12) < 7 && x > 20 && x + 20 < w;
                if in_line && in_word {
                    img.set(x, y, ink);
                }
            }
        }
        img
    }

    #[test]
    fn crisp_text_page_proceeds() {
        let img = text_page(400, 300, 225, 25);
        let report = ImageQualityAnalyzer::default().analyze_gray(&img.as_view());
        assert!(report.should_proceed, "score {}", report.overall_score);
        assert_eq!(report.measurements.text_density, TextDensity::Good);
        assert_eq!(report.metrics.blur, 1.0);
        assert!(!report.has(IssueKind::Blurry));
        assert!(report.measurements.skew_deg.abs() < 1.5);
    }

    #[test]
    fn dark_low_contrast_page_is_fixable() {
        let img = text_page(400, 300, 60, 35);
        let report = ImageQualityAnalyzer::default().analyze_gray(&img.as_view());
        assert!(report.has(IssueKind::Dark));
        assert!(report.has(IssueKind::LowContrast));
        let criticals: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Critical)
            .collect();
        assert!(!criticals.is_empty());
        assert_eq!(
            criticals.iter().all(|i| i.kind.is_fixable()),
            report.can_auto_fix
        );
    }

    #[test]
    fn auto_fix_needs_a_fixable_issue() {
        let issue = |kind, severity| QualityIssue {
            kind,
            severity,
            value: 0.2,
        };
        assert!(!auto_fixable(&[]));
        assert!(!auto_fixable(&[issue(IssueKind::Noisy, IssueSeverity::Moderate)]));
        assert!(auto_fixable(&[
            issue(IssueKind::Dark, IssueSeverity::Critical),
            issue(IssueKind::Noisy, IssueSeverity::Info),
        ]));
        assert!(!auto_fixable(&[
            issue(IssueKind::Dark, IssueSeverity::Moderate),
            issue(IssueKind::Blurry, IssueSeverity::Critical),
        ]));
    }

    #[test]
    fn blank_blur_is_never_fixable() {
        let img = GrayImageU8::filled(300, 200, 128);
        let report = ImageQualityAnalyzer::default().analyze_gray(&img.as_view());
        let blur = report
            .issues
            .iter()
            .find(|i| i.kind == IssueKind::Blurry)
            .expect("flat image is blurry");
        assert_eq!(blur.severity, IssueSeverity::Critical);
        assert!(!report.can_auto_fix);
        assert_eq!(report.measurements.text_density, TextDensity::TooSparse);
    }

    #[test]
    fn overall_uses_fixed_weights() {
        let a = ImageQualityAnalyzer::default();
        let ones = QualityMetrics {
            blur: 1.0,
            brightness: 1.0,
            contrast: 1.0,
            noise: 1.0,
            skew: 1.0,
            text_density: 1.0,
        };
        assert!((a.overall(&ones) - 1.0).abs() < 1e-5);
        let only_blur = QualityMetrics {
            blur: 1.0,
            ..QualityMetrics::default()
        };
        assert!((a.overall(&only_blur) - 0.25).abs() < 1e-6);
    }
}
