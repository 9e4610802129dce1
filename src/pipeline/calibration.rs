//! Confidence recalibration of interpretation results.
//!
//! The service's self-reported confidence is only one of five inputs; the
//! rest come from the still itself, the spread of item confidences, the
//! content size and how often results for the same document type turned out
//! right.
use crate::backend::{AnalysisResult, ItemStatus};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationWeights {
    pub image_quality: f32,
    pub consistency: f32,
    pub history: f32,
    pub complexity: f32,
    pub raw: f32,
}

impl Default for CalibrationWeights {
    fn default() -> Self {
        Self {
            image_quality: 0.25,
            consistency: 0.20,
            history: 0.25,
            complexity: 0.15,
            raw: 0.15,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Outcomes remembered per document type.
    pub history_len: usize,
    /// Accuracy assumed before any outcome is recorded.
    pub default_accuracy: f32,
    /// Raw confidence above this is compressed.
    pub dampen_above: f32,
    pub dampen_factor: f32,
    /// Item count up to which content counts as simple.
    pub simple_items: usize,
    /// Extra items over which the complexity factor falls to its floor.
    pub complexity_span: usize,
    pub complexity_floor: f32,
    pub illegible_penalty: f32,
    pub partial_penalty: f32,
    pub min_confidence: f32,
    pub max_confidence: f32,
    pub weights: CalibrationWeights,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            history_len: 20,
            default_accuracy: 0.7,
            dampen_above: 0.9,
            dampen_factor: 0.5,
            simple_items: 5,
            complexity_span: 45,
            complexity_floor: 0.5,
            illegible_penalty: 0.5,
            partial_penalty: 0.75,
            min_confidence: 0.1,
            max_confidence: 0.95,
            weights: CalibrationWeights::default(),
        }
    }
}

/// The five calibration inputs, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationFactors {
    pub image_quality: f32,
    pub consistency: f32,
    pub history: f32,
    pub complexity: f32,
    pub raw: f32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibratedAnalysis {
    pub result: AnalysisResult,
    /// Recalibrated confidence in `[min_confidence, max_confidence]`.
    pub confidence: f32,
    pub factors: CalibrationFactors,
    /// Per-item confidence after status penalties, keyed by question id.
    pub item_confidence: BTreeMap<String, f32>,
}

pub struct ConfidenceCalibrator {
    params: CalibrationParams,
    history: HashMap<String, VecDeque<bool>>,
}

impl ConfidenceCalibrator {
    pub fn new(params: CalibrationParams) -> Self {
        Self {
            params,
            history: HashMap::new(),
        }
    }

    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    /// Record whether a result for `document_type` was later confirmed correct.
    pub fn record_outcome(&mut self, document_type: &str, correct: bool) {
        let cap = self.params.history_len.max(1);
        let entries = self.history.entry(document_type.to_owned()).or_default();
        entries.push_back(correct);
        while entries.len() > cap {
            entries.pop_front();
        }
    }

    /// Fraction of recorded outcomes that were correct.
    pub fn historical_accuracy(&self, document_type: &str) -> f32 {
        match self.history.get(document_type) {
            Some(entries) if !entries.is_empty() => {
                entries.iter().filter(|&&c| c).count() as f32 / entries.len() as f32
            }
            _ => self.params.default_accuracy,
        }
    }

    /// `image_quality` is the still's overall quality score, `None` when unknown.
    pub fn calibrate(&self, result: AnalysisResult, image_quality: Option<f32>) -> CalibratedAnalysis {
        let factors = CalibrationFactors {
            image_quality: image_quality.unwrap_or(0.5).clamp(0.0, 1.0),
            consistency: consistency(&result),
            history: self.historical_accuracy(&result.document_type),
            complexity: self.complexity(result.items.len()),
            raw: self.dampen(result.confidence.unwrap_or(0.5)),
        };
        let confidence = self.combine(&factors);
        let item_confidence = self.item_confidence(&result);
        debug!(
            "ConfidenceCalibrator: {} items -> {:.3} ({:?})",
            result.items.len(),
            confidence,
            factors
        );
        CalibratedAnalysis {
            result,
            confidence,
            factors,
            item_confidence,
        }
    }

    /// Weighted sum of the factors, clamped to the configured band.
    pub fn combine(&self, f: &CalibrationFactors) -> f32 {
        let w = &self.params.weights;
        let raw = w.image_quality * f.image_quality
            + w.consistency * f.consistency
            + w.history * f.history
            + w.complexity * f.complexity
            + w.raw * f.raw;
        let score = if raw.is_finite() { raw } else { 0.0 };
        score.clamp(self.params.min_confidence, self.params.max_confidence)
    }

    fn dampen(&self, raw: f32) -> f32 {
        let p = &self.params;
        let raw = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };
        if raw > p.dampen_above {
            p.dampen_above + (raw - p.dampen_above) * p.dampen_factor
        } else {
            raw
        }
    }

    fn complexity(&self, items: usize) -> f32 {
        let p = &self.params;
        if items == 0 {
            return p.complexity_floor;
        }
        let extra = items.saturating_sub(p.simple_items) as f32;
        (1.0 - extra / p.complexity_span.max(1) as f32).max(p.complexity_floor)
    }

    fn item_confidence(&self, result: &AnalysisResult) -> BTreeMap<String, f32> {
        let p = &self.params;
        result
            .items
            .iter()
            .map(|item| {
                let penalty = match item.status {
                    ItemStatus::Illegible => p.illegible_penalty,
                    ItemStatus::Partial => p.partial_penalty,
                    ItemStatus::Legible | ItemStatus::Skipped => 1.0,
                };
                (item.question_id.clone(), (item.confidence * penalty).clamp(0.0, 1.0))
            })
            .collect()
    }
}

impl Default for ConfidenceCalibrator {
    fn default() -> Self {
        Self::new(CalibrationParams::default())
    }
}

/// `1 − stddev` of item confidences; 0.5 without items.
fn consistency(result: &AnalysisResult) -> f32 {
    let n = result.items.len();
    if n == 0 {
        return 0.5;
    }
    let mean = result.items.iter().map(|i| i.confidence).sum::<f32>() / n as f32;
    let var = result
        .items
        .iter()
        .map(|i| (i.confidence - mean).powi(2))
        .sum::<f32>()
        / n as f32;
    (1.0 - var.sqrt()).clamp(0.0, 1.0)
}
