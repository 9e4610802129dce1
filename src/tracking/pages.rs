//! Persistent page identities across frames.
//!
//! Every smoothed quad is matched to an existing page by bounding-box IoU;
//! unmatched quads open a new page. Pages move through a forward-only
//! lifecycle and are only dropped by [`PageTracker::reset`].
use crate::backend::AnalysisResult;
use crate::fingerprint::Fingerprint;
use crate::geometry::Quad;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Monotonically increasing page identifier within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Detected,
    Captured,
    Analyzing,
    Complete,
    Failed,
}

impl PageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PageStatus::Complete | PageStatus::Failed)
    }

    /// Allowed moves: the linear chain, plus failure from any live state.
    pub fn can_become(self, next: PageStatus) -> bool {
        use PageStatus::*;
        matches!(
            (self, next),
            (Detected, Captured)
                | (Captured, Analyzing)
                | (Analyzing, Complete)
                | (Detected | Captured | Analyzing, Failed)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("unknown page {0}")]
    UnknownPage(PageId),
    #[error("{page}: illegal transition {from:?} -> {to:?}")]
    Illegal {
        page: PageId,
        from: PageStatus,
        to: PageStatus,
    },
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    /// Minimum bounding-box IoU (inclusive) to match an existing page.
    pub iou_threshold: f32,
    /// Per-page quad history length.
    pub history_len: usize,
    /// Average corner displacement below which a page is stable.
    pub jitter_threshold_px: f32,
    /// Observations required before a page can be stable.
    pub min_stable_frames: usize,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            iou_threshold: 0.45,
            history_len: 10,
            jitter_threshold_px: 8.0,
            min_stable_frames: 4,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Page {
    pub id: PageId,
    pub status: PageStatus,
    pub first_seen: Instant,
    pub last_seen: Instant,
    pub last_quad: Quad,
    pub quad_history: VecDeque<Quad>,
    /// Encoded still once captured.
    pub captured_image: Option<Vec<u8>>,
    pub fingerprint: Option<Fingerprint>,
    pub analysis: Option<AnalysisResult>,
    pub error: Option<String>,
}

impl Page {
    /// Mean corner displacement between consecutive history entries.
    pub fn jitter(&self) -> f32 {
        if self.quad_history.len() < 2 {
            return 0.0;
        }
        let total: f32 = self
            .quad_history
            .iter()
            .zip(self.quad_history.iter().skip(1))
            .map(|(a, b)| a.mean_corner_displacement(b))
            .sum();
        total / (self.quad_history.len() - 1) as f32
    }
}

pub struct PageTracker {
    params: TrackerParams,
    pages: Vec<Page>,
    next_id: u64,
}

impl PageTracker {
    pub fn new(params: TrackerParams) -> Self {
        Self {
            params,
            pages: Vec::new(),
            next_id: 1,
        }
    }

    /// Match `quad` to a live page or open a new one; returns the page id.
    pub fn observe(&mut self, quad: &Quad, now: Instant) -> PageId {
        let bbox = quad.bbox();
        let best = self
            .pages
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.status.is_terminal())
            .map(|(i, p)| (i, p.last_quad.bbox().iou(&bbox)))
            .filter(|&(_, iou)| iou >= self.params.iou_threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((idx, iou)) = best {
            let cap = self.params.history_len.max(2);
            let page = &mut self.pages[idx];
            page.last_quad = *quad;
            page.last_seen = now;
            if page.quad_history.len() >= cap {
                page.quad_history.pop_front();
            }
            page.quad_history.push_back(*quad);
            debug!("PageTracker: {} matched (iou {:.3})", page.id, iou);
            return page.id;
        }

        let id = PageId(self.next_id);
        self.next_id += 1;
        let mut quad_history = VecDeque::with_capacity(self.params.history_len);
        quad_history.push_back(*quad);
        self.pages.push(Page {
            id,
            status: PageStatus::Detected,
            first_seen: now,
            last_seen: now,
            last_quad: *quad,
            quad_history,
            captured_image: None,
            fingerprint: None,
            analysis: None,
            error: None,
        });
        debug!("PageTracker: new {}", id);
        id
    }

    pub fn page(&self, id: PageId) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == id)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Pages that finished analysis, in creation order.
    pub fn complete_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages
            .iter()
            .filter(|p| p.status == PageStatus::Complete)
    }

    /// Fingerprints of every page captured so far.
    pub fn fingerprints(&self) -> Vec<(PageId, Fingerprint)> {
        self.pages
            .iter()
            .filter_map(|p| p.fingerprint.clone().map(|f| (p.id, f)))
            .collect()
    }

    /// Whether the page has at least `min_stable_frames` observations and
    /// its average jitter is below the threshold.
    pub fn is_stable(&self, id: PageId) -> bool {
        self.page(id).is_some_and(|p| {
            p.quad_history.len() >= self.params.min_stable_frames
                && p.jitter() < self.params.jitter_threshold_px
        })
    }

    pub fn mark_captured(
        &mut self,
        id: PageId,
        image: Vec<u8>,
        fingerprint: Fingerprint,
    ) -> Result<(), TransitionError> {
        let page = self.transition(id, PageStatus::Captured)?;
        page.captured_image = Some(image);
        page.fingerprint = Some(fingerprint);
        Ok(())
    }

    pub fn mark_analyzing(&mut self, id: PageId) -> Result<(), TransitionError> {
        self.transition(id, PageStatus::Analyzing).map(|_| ())
    }

    pub fn complete(&mut self, id: PageId, result: AnalysisResult) -> Result<(), TransitionError> {
        let page = self.transition(id, PageStatus::Complete)?;
        page.analysis = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, id: PageId, reason: impl Into<String>) -> Result<(), TransitionError> {
        let page = self.transition(id, PageStatus::Failed)?;
        page.error = Some(reason.into());
        Ok(())
    }

    /// Drop every page and restart ids.
    pub fn reset(&mut self) {
        self.pages.clear();
        self.next_id = 1;
    }

    fn transition(&mut self, id: PageId, to: PageStatus) -> Result<&mut Page, TransitionError> {
        let page = self
            .pages
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(TransitionError::UnknownPage(id))?;
        if !page.status.can_become(to) {
            return Err(TransitionError::Illegal {
                page: id,
                from: page.status,
                to,
            });
        }
        debug!("PageTracker: {} {:?} -> {:?}", id, page.status, to);
        page.status = to;
        Ok(page)
    }
}

impl Default for PageTracker {
    fn default() -> Self {
        Self::new(TrackerParams::default())
    }
}
