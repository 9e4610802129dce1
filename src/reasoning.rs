//! Session-level reasoning over completed pages.
//!
//! [`CrossPageReasoner::analyze`] merges questions that were answered on
//! more than one page, compares the first and second half of the session,
//! buckets concepts by mastery, surfaces recurring patterns and turns all of
//! that into priority-ordered recommendations.
use crate::backend::{AnalysisResult, ItemResult, ItemStatus};
use crate::tracking::PageId;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReasonerParams {
    /// Half-to-half change in points that counts as a trend.
    pub trend_threshold: f32,
    pub mastered_score: f32,
    pub proficient_score: f32,
    pub developing_score: f32,
    /// Occurrences before something counts as a pattern.
    pub min_pattern_occurrences: usize,
}

impl Default for ReasonerParams {
    fn default() -> Self {
        Self {
            trend_threshold: 10.0,
            mastered_score: 90.0,
            proficient_score: 75.0,
            developing_score: 60.0,
            min_pattern_occurrences: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mastery {
    NeedsWork,
    Developing,
    Proficient,
    Mastered,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptMastery {
    pub concept: String,
    pub mean_score: f32,
    pub items: usize,
    pub level: Mastery,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatternKind {
    RecurringError { error_type: String },
    SkippedQuestions,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub kind: PatternKind,
    pub occurrences: usize,
    pub question_ids: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Positive,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub priority: Priority,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAnalysis {
    pub pages: Vec<PageId>,
    /// One entry per question id after merging.
    pub items: Vec<ItemResult>,
    pub duplicates_merged: usize,
    pub mean_score: Option<f32>,
    pub trend: Trend,
    pub first_half_mean: Option<f32>,
    pub second_half_mean: Option<f32>,
    pub mastery: Vec<ConceptMastery>,
    pub patterns: Vec<Pattern>,
    pub recommendations: Vec<Recommendation>,
}

pub struct CrossPageReasoner {
    params: ReasonerParams,
}

impl CrossPageReasoner {
    pub fn new(params: ReasonerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ReasonerParams {
        &self.params
    }

    /// `pages` must be in capture order.
    pub fn analyze<'a, I>(&self, pages: I) -> SessionAnalysis
    where
        I: IntoIterator<Item = (PageId, &'a AnalysisResult)>,
    {
        let pages: Vec<(PageId, &AnalysisResult)> = pages.into_iter().collect();
        let (items, duplicates_merged) = merge_items(&pages);
        let mean_score = mean(items.iter().map(|i| i.score));
        let (trend, first_half_mean, second_half_mean) = self.trend(&pages);
        let mastery = self.mastery(&items);
        let patterns = self.patterns(&items);
        let recommendations = self.recommend(trend, &mastery, &patterns);
        debug!(
            "CrossPageReasoner: {} pages, {} items ({} merged), trend {:?}",
            pages.len(),
            items.len(),
            duplicates_merged,
            trend
        );
        SessionAnalysis {
            pages: pages.iter().map(|(id, _)| *id).collect(),
            items,
            duplicates_merged,
            mean_score,
            trend,
            first_half_mean,
            second_half_mean,
            mastery,
            patterns,
            recommendations,
        }
    }

    /// Compares the mean of the earlier half of pages with the later half.
    /// With an odd count the middle page belongs to neither half. Offline
    /// estimates carry no grading and are left out.
    fn trend(&self, pages: &[(PageId, &AnalysisResult)]) -> (Trend, Option<f32>, Option<f32>) {
        let scores: Vec<f32> = pages
            .iter()
            .filter(|(_, r)| !r.offline_estimate)
            .filter_map(|(_, r)| r.mean_score())
            .collect();
        if scores.len() < 2 {
            return (Trend::InsufficientData, None, None);
        }
        let half = scores.len() / 2;
        let (first, second) = (&scores[..half], &scores[scores.len() - half..]);
        let a = mean(first.iter().copied()).unwrap_or(0.0);
        let b = mean(second.iter().copied()).unwrap_or(0.0);
        let trend = if b - a > self.params.trend_threshold {
            Trend::Improving
        } else if a - b > self.params.trend_threshold {
            Trend::Declining
        } else {
            Trend::Stable
        };
        (trend, Some(a), Some(b))
    }

    fn level(&self, score: f32) -> Mastery {
        let p = &self.params;
        if score >= p.mastered_score {
            Mastery::Mastered
        } else if score >= p.proficient_score {
            Mastery::Proficient
        } else if score >= p.developing_score {
            Mastery::Developing
        } else {
            Mastery::NeedsWork
        }
    }

    fn mastery(&self, items: &[ItemResult]) -> Vec<ConceptMastery> {
        let mut by_concept: BTreeMap<&str, Vec<f32>> = BTreeMap::new();
        for item in items {
            if let Some(concept) = item.concept.as_deref() {
                by_concept.entry(concept).or_default().push(item.score);
            }
        }
        by_concept
            .into_iter()
            .map(|(concept, scores)| {
                let mean_score = mean(scores.iter().copied()).unwrap_or(0.0);
                ConceptMastery {
                    concept: concept.to_owned(),
                    mean_score,
                    items: scores.len(),
                    level: self.level(mean_score),
                }
            })
            .collect()
    }

    fn patterns(&self, items: &[ItemResult]) -> Vec<Pattern> {
        let min = self.params.min_pattern_occurrences;
        let mut errors: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        let mut skipped = Vec::new();
        for item in items {
            if let Some(kind) = item.error_type.as_deref() {
                errors.entry(kind).or_default().push(item.question_id.clone());
            }
            if item.status == ItemStatus::Skipped {
                skipped.push(item.question_id.clone());
            }
        }
        let mut out: Vec<Pattern> = errors
            .into_iter()
            .filter(|(_, ids)| ids.len() >= min)
            .map(|(kind, ids)| Pattern {
                kind: PatternKind::RecurringError {
                    error_type: kind.to_owned(),
                },
                occurrences: ids.len(),
                question_ids: ids,
            })
            .collect();
        if skipped.len() >= min {
            out.push(Pattern {
                kind: PatternKind::SkippedQuestions,
                occurrences: skipped.len(),
                question_ids: skipped,
            });
        }
        out
    }

    fn recommend(
        &self,
        trend: Trend,
        mastery: &[ConceptMastery],
        patterns: &[Pattern],
    ) -> Vec<Recommendation> {
        let mut out = Vec::new();
        let mut push = |priority, message: String| out.push(Recommendation { priority, message });
        for m in mastery {
            match m.level {
                Mastery::NeedsWork => push(
                    Priority::High,
                    format!("Reteach {} (average {:.0})", m.concept, m.mean_score),
                ),
                Mastery::Developing => push(
                    Priority::Medium,
                    format!("Practice {} further (average {:.0})", m.concept, m.mean_score),
                ),
                Mastery::Mastered => push(
                    Priority::Positive,
                    format!("{} is mastered", m.concept),
                ),
                Mastery::Proficient => {}
            }
        }
        for p in patterns {
            match &p.kind {
                PatternKind::RecurringError { error_type } => push(
                    Priority::Medium,
                    format!("Address recurring {} errors ({} questions)", error_type, p.occurrences),
                ),
                PatternKind::SkippedQuestions => push(
                    Priority::Medium,
                    format!("{} questions were left unanswered", p.occurrences),
                ),
            }
        }
        match trend {
            Trend::Declining => push(
                Priority::High,
                "Scores dropped in the second half of the session".to_owned(),
            ),
            Trend::Improving => push(
                Priority::Positive,
                "Scores improved over the session".to_owned(),
            ),
            Trend::Stable | Trend::InsufficientData => {}
        }
        out.sort_by_key(|r| r.priority);
        out
    }
}

impl Default for CrossPageReasoner {
    fn default() -> Self {
        Self::new(ReasonerParams::default())
    }
}

/// Keep one item per question id, the one with the highest confidence.
/// First-seen order is preserved.
fn merge_items(pages: &[(PageId, &AnalysisResult)]) -> (Vec<ItemResult>, usize) {
    let mut items: Vec<ItemResult> = Vec::new();
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    let mut merged = 0;
    for (_, result) in pages {
        for item in &result.items {
            match index.get(item.question_id.as_str()) {
                Some(&i) => {
                    merged += 1;
                    if item.confidence > items[i].confidence {
                        items[i] = item.clone();
                    }
                }
                None => {
                    index.insert(item.question_id.as_str(), items.len());
                    items.push(item.clone());
                }
            }
        }
    }
    (items, merged)
}

fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, n) = values.fold((0.0f32, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, concept: &str, score: f32, confidence: f32) -> ItemResult {
        ItemResult {
            question_id: id.to_owned(),
            concept: Some(concept.to_owned()),
            response: None,
            score,
            confidence,
            status: ItemStatus::Legible,
            error_type: None,
        }
    }

    fn page(items: Vec<ItemResult>) -> AnalysisResult {
        AnalysisResult {
            document_type: "quiz".into(),
            items,
            ..AnalysisResult::default()
        }
    }

    #[test]
    fn duplicate_questions_keep_most_confident_answer() {
        let a = page(vec![item("q1", "algebra", 40.0, 0.5)]);
        let b = page(vec![item("q1", "algebra", 95.0, 0.9), item("q2", "algebra", 80.0, 0.8)]);
        let out = CrossPageReasoner::default().analyze([(PageId(1), &a), (PageId(2), &b)]);
        assert_eq!(out.items.len(), 2);
        assert_eq!(out.duplicates_merged, 1);
        assert_eq!(out.items[0].score, 95.0);
    }

    #[test]
    fn second_half_gain_is_improving() {
        let pages: Vec<AnalysisResult> = [50.0, 55.0, 70.0, 75.0]
            .iter()
            .enumerate()
            .map(|(i, &s)| page(vec![item(&format!("q{i}"), "geometry", s, 0.8)]))
            .collect();
        let out = CrossPageReasoner::default()
            .analyze(pages.iter().enumerate().map(|(i, r)| (PageId(i as u64 + 1), r)));
        assert_eq!(out.trend, Trend::Improving);
        assert_eq!(out.first_half_mean, Some(52.5));
        assert_eq!(out.second_half_mean, Some(72.5));
        assert_eq!(out.recommendations.last().map(|r| r.priority), Some(Priority::Positive));
    }

    #[test]
    fn small_change_is_stable_and_single_page_is_insufficient() {
        let a = page(vec![item("q1", "x", 70.0, 0.8)]);
        let b = page(vec![item("q2", "x", 75.0, 0.8)]);
        let r = CrossPageReasoner::default();
        assert_eq!(r.analyze([(PageId(1), &a), (PageId(2), &b)]).trend, Trend::Stable);
        assert_eq!(r.analyze([(PageId(1), &a)]).trend, Trend::InsufficientData);
    }

    #[test]
    fn middle_page_of_an_odd_count_is_left_out_of_the_trend() {
        let pages: Vec<AnalysisResult> = [60.0, 95.0, 62.0]
            .iter()
            .enumerate()
            .map(|(i, &s)| page(vec![item(&format!("q{i}"), "geometry", s, 0.8)]))
            .collect();
        let out = CrossPageReasoner::default()
            .analyze(pages.iter().enumerate().map(|(i, r)| (PageId(i as u64 + 1), r)));
        assert_eq!(out.first_half_mean, Some(60.0));
        assert_eq!(out.second_half_mean, Some(62.0));
        assert_eq!(out.trend, Trend::Stable);
    }

    #[test]
    fn offline_estimates_do_not_move_the_trend() {
        let a = page(vec![item("q1", "x", 90.0, 0.8)]);
        let offline = AnalysisResult {
            document_type: "quiz".into(),
            overall_score: Some(0.0),
            offline_estimate: true,
            ..AnalysisResult::default()
        };
        let out = CrossPageReasoner::default().analyze([(PageId(1), &a), (PageId(2), &offline)]);
        assert_eq!(out.trend, Trend::InsufficientData);
    }

    #[test]
    fn mastery_buckets_and_priority_order() {
        let a = page(vec![
            item("q1", "fractions", 95.0, 0.9),
            item("q2", "decimals", 40.0, 0.9),
            item("q3", "ratios", 65.0, 0.9),
            item("q4", "percent", 80.0, 0.9),
        ]);
        let out = CrossPageReasoner::default().analyze([(PageId(1), &a)]);
        let level = |c: &str| out.mastery.iter().find(|m| m.concept == c).map(|m| m.level);
        assert_eq!(level("fractions"), Some(Mastery::Mastered));
        assert_eq!(level("percent"), Some(Mastery::Proficient));
        assert_eq!(level("ratios"), Some(Mastery::Developing));
        assert_eq!(level("decimals"), Some(Mastery::NeedsWork));
        let priorities: Vec<Priority> = out.recommendations.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![Priority::High, Priority::Medium, Priority::Positive]);
    }

    #[test]
    fn patterns_need_two_occurrences() {
        let mut q1 = item("q1", "x", 30.0, 0.8);
        q1.error_type = Some("sign_error".into());
        let mut q2 = item("q2", "x", 35.0, 0.8);
        q2.error_type = Some("sign_error".into());
        let mut q3 = item("q3", "x", 20.0, 0.8);
        q3.error_type = Some("unit_error".into());
        let mut q4 = item("q4", "x", 0.0, 0.8);
        q4.status = ItemStatus::Skipped;
        let a = page(vec![q1, q2, q3, q4]);
        let out = CrossPageReasoner::default().analyze([(PageId(1), &a)]);
        assert_eq!(out.patterns.len(), 1);
        assert_eq!(
            out.patterns[0].kind,
            PatternKind::RecurringError {
                error_type: "sign_error".into()
            }
        );
        assert_eq!(out.patterns[0].occurrences, 2);
    }
}
