//! Per-session orchestration of the capture loop.
//!
//! [`CaptureSession`] owns every stateful component of one capture session.
//! The host drives it with three calls:
//!
//! - [`CaptureSession::tick`] once per detection cycle, at the returned
//!   interval;
//! - [`CaptureSession::request_capture`] with an encoded still when the user
//!   (or the ready signal) triggers a capture;
//! - [`CaptureSession::analyze`] to run the gated hand-off for that capture.
//!
//! Feedback for the host (haptics, sounds) comes back as [`FeedbackEvent`]
//! values; the session never calls out to listeners.
use crate::backend::InterpretationBackend;
use crate::config::CaptureConfig;
use crate::detector::EdgeQuadDetector;
use crate::fingerprint::SemanticFingerprinter;
use crate::geometry::Quad;
use crate::image::io::{decode_still, encode_png};
use crate::pipeline::{AnalysisContext, AnalysisPipeline, ConfidenceCalibrator, PipelineResult};
use crate::preflight::PreFlightCheck;
use crate::quality::{
    Fix, ImageEnhancer, ImageQualityAnalyzer, IssueKind, IssueSeverity, QualityReport,
};
use crate::readiness::{ReadinessAssessment, ReadinessEngine, ReadinessInput};
use crate::reasoning::{CrossPageReasoner, SessionAnalysis};
use crate::store::{AnalysisRecord, RecordId, RecordStore};
use crate::tracking::{PageId, PageTracker, SmoothedDetection, TemporalSmoother, TransitionError};
use crate::types::{Capture, Frame};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SchedulerParams {
    pub base_interval_ms: u64,
    pub throttled_interval_ms: u64,
    /// Continuous readiness required before throttling.
    pub throttle_after_ms: u64,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            base_interval_ms: 200,
            throttled_interval_ms: 500,
            throttle_after_ms: 2000,
        }
    }
}

/// Adaptive detection interval: slows down once the page has been ready for
/// a while and speeds back up the moment stability is lost.
pub struct CycleScheduler {
    params: SchedulerParams,
    ready_since: Option<Instant>,
    throttled: bool,
}

impl CycleScheduler {
    pub fn new(params: SchedulerParams) -> Self {
        Self {
            params,
            ready_since: None,
            throttled: false,
        }
    }

    /// Record this cycle's readiness and return the delay before the next one.
    pub fn observe(&mut self, ready: bool, stable: bool, now: Instant) -> Duration {
        if ready && stable {
            let since = *self.ready_since.get_or_insert(now);
            let held = now.saturating_duration_since(since);
            let throttle = held > Duration::from_millis(self.params.throttle_after_ms);
            if throttle && !self.throttled {
                debug!("CycleScheduler: throttling after {:?} ready", held);
            }
            self.throttled = throttle;
        } else {
            if self.throttled {
                debug!("CycleScheduler: stability lost, restoring base interval");
            }
            self.ready_since = None;
            self.throttled = false;
        }
        self.interval()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(if self.throttled {
            self.params.throttled_interval_ms
        } else {
            self.params.base_interval_ms
        })
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled
    }

    pub fn reset(&mut self) {
        self.ready_since = None;
        self.throttled = false;
    }
}

impl Default for CycleScheduler {
    fn default() -> Self {
        Self::new(SchedulerParams::default())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedbackEvent {
    /// The framed page just became ready.
    ReadyTransition { page: Option<PageId> },
    AnalysisSucceeded { page: PageId, confidence: f32 },
}

/// Result of one detection cycle.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutcome {
    /// Raw detection in frame coordinates.
    pub detection: Option<Quad>,
    pub smoothed: SmoothedDetection,
    pub assessment: ReadinessAssessment,
    pub page: Option<PageId>,
    pub events: Vec<FeedbackEvent>,
    pub next_interval: Duration,
}

#[derive(Debug, Error)]
pub enum CaptureRejection {
    #[error("a capture is already being processed")]
    Busy,
    #[error("no page in view")]
    NoPage,
    #[error("capture could not be decoded: {0}")]
    Undecodable(String),
    #[error("image quality too low ({issue:?}): {recommendation}")]
    Quality {
        issue: IssueKind,
        value: f32,
        recommendation: &'static str,
    },
    #[error("{page} was already captured (similarity {similarity:.2})")]
    Duplicate { page: PageId, similarity: f32 },
    #[error(transparent)]
    Page(#[from] TransitionError),
}

/// Handle for an accepted capture awaiting analysis.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureTicket {
    pub page: PageId,
    pub quality: QualityReport,
    pub fixes: Vec<Fix>,
    pub estimated_improvement: f32,
}

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub result: PipelineResult,
    pub record: Option<RecordId>,
    pub events: Vec<FeedbackEvent>,
}

struct InFlight {
    page: PageId,
    capture: Capture,
    quality: f32,
}

pub struct CaptureSession {
    session_id: String,
    detector: EdgeQuadDetector,
    smoother: TemporalSmoother,
    tracker: PageTracker,
    readiness: ReadinessEngine,
    analyzer: ImageQualityAnalyzer,
    enhancer: ImageEnhancer,
    fingerprinter: SemanticFingerprinter,
    pipeline: AnalysisPipeline,
    reasoner: CrossPageReasoner,
    scheduler: CycleScheduler,
    store: Box<dyn RecordStore>,
    current_page: Option<PageId>,
    last_detection: Option<Quad>,
    frame_size: (usize, usize),
    in_flight: Option<InFlight>,
}

impl CaptureSession {
    pub fn new(
        session_id: impl Into<String>,
        config: CaptureConfig,
        backend: Option<Arc<dyn InterpretationBackend>>,
        store: Box<dyn RecordStore>,
    ) -> Self {
        let pipeline = AnalysisPipeline::new(
            config.pipeline,
            backend,
            PreFlightCheck::new(config.preflight),
            ConfidenceCalibrator::new(config.calibration),
        );
        Self {
            session_id: session_id.into(),
            detector: EdgeQuadDetector::new(config.detector),
            smoother: TemporalSmoother::new(config.smoother),
            tracker: PageTracker::new(config.tracker),
            readiness: ReadinessEngine::new(config.readiness),
            analyzer: ImageQualityAnalyzer::new(config.quality),
            enhancer: ImageEnhancer::new(config.enhance),
            fingerprinter: SemanticFingerprinter::new(config.fingerprint),
            pipeline,
            reasoner: CrossPageReasoner::new(config.reasoner),
            scheduler: CycleScheduler::new(config.scheduler),
            store,
            current_page: None,
            last_detection: None,
            frame_size: (0, 0),
            in_flight: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn tracker(&self) -> &PageTracker {
        &self.tracker
    }

    pub fn current_page(&self) -> Option<PageId> {
        self.current_page
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Run one detection cycle on a downscaled frame.
    ///
    /// Readiness sees the raw detection; page tracking sees only the
    /// smoothed outline, so a single spurious quad never opens a page.
    pub fn tick(&mut self, frame: &Frame, now: Instant) -> CycleOutcome {
        let frame_size = (frame.width(), frame.height());
        let detection = self.detector.detect(frame);
        let smoothed = self.smoother.push(detection.clone(), frame_size, now);
        // pages open only for outlines that have persisted across frames
        let page = smoothed.quad.as_ref().map(|q| self.tracker.observe(q, now));

        let input = ReadinessInput {
            quad: detection.as_ref().map(|q| q.corners.as_slice()),
            confidence: smoothed.confidence,
            frame,
        };
        let assessment = self.readiness.assess(&input, now);
        let next_interval = self
            .scheduler
            .observe(assessment.ready, assessment.stability_met, now);

        let mut events = Vec::new();
        if smoothed.ready_transition {
            events.push(FeedbackEvent::ReadyTransition { page });
        }

        self.frame_size = frame_size;
        self.last_detection = detection.clone();
        if page.is_some() {
            self.current_page = page;
        }

        CycleOutcome {
            detection,
            smoothed,
            assessment,
            page,
            events,
            next_interval,
        }
    }

    /// Accept a still for the page in view.
    ///
    /// Runs quality assessment, enhancement when every blocking issue is
    /// correctable, and duplicate detection against earlier pages. On
    /// success the page moves to `captured` and the capture is held for
    /// [`CaptureSession::analyze`].
    pub fn request_capture(
        &mut self,
        encoded: Vec<u8>,
        now: Instant,
    ) -> Result<CaptureTicket, CaptureRejection> {
        if self.in_flight.is_some() {
            return Err(CaptureRejection::Busy);
        }
        let page = self.current_page.ok_or(CaptureRejection::NoPage)?;
        let rgb = decode_still(&encoded).map_err(|e| CaptureRejection::Undecodable(e.to_string()))?;

        let report = self.analyzer.analyze(&rgb);
        let blocking = report
            .issues
            .iter()
            .find(|i| i.severity == IssueSeverity::Critical && !i.kind.is_fixable());
        if let Some(issue) = blocking {
            return Err(quality_rejection(issue.kind, issue.value));
        }
        if !report.should_proceed && !report.can_auto_fix {
            let (kind, value) = report
                .worst_issue()
                .map_or((IssueKind::LowContrast, report.overall_score), |i| (i.kind, i.value));
            return Err(quality_rejection(kind, value));
        }

        let (still, encoded, fixes, improvement) = if report.can_auto_fix {
            let enhanced = self.enhancer.enhance(&rgb, &report);
            match encode_png(&enhanced.image) {
                Ok(bytes) => (enhanced.image, bytes, enhanced.fixes, enhanced.estimated_improvement),
                Err(err) => {
                    warn!("CaptureSession: keeping original still, re-encode failed: {err}");
                    (rgb, encoded, Vec::new(), 0.0)
                }
            }
        } else {
            (rgb, encoded, Vec::new(), 0.0)
        };

        let fingerprint = self.fingerprinter.fingerprint(&still);
        let earlier = self.tracker.fingerprints();
        if let Some(dup) = self.fingerprinter.find_duplicate(&fingerprint, &earlier) {
            return Err(CaptureRejection::Duplicate {
                page: dup.page,
                similarity: dup.similarity,
            });
        }

        self.tracker.mark_captured(page, encoded.clone(), fingerprint)?;
        let mut capture = Capture::new(encoded, now).with_page(page);
        if let Some(q) = &self.last_detection {
            capture = capture.with_quad(q.to_vec(), self.frame_size);
        }
        if let Some(snapshot) = self.readiness.snapshot() {
            capture = capture.with_readiness(snapshot);
        }
        let quality = (report.overall_score + improvement).min(1.0);
        info!(
            "CaptureSession: captured {} (quality {:.2}, {} fixes)",
            page,
            quality,
            fixes.len()
        );
        self.in_flight = Some(InFlight {
            page,
            capture,
            quality,
        });
        Ok(CaptureTicket {
            page,
            quality: report,
            fixes,
            estimated_improvement: improvement,
        })
    }

    /// Drop the held capture without analyzing it; the page is marked failed.
    pub fn cancel_capture(&mut self) {
        if let Some(held) = self.in_flight.take() {
            if let Err(err) = self.tracker.fail(held.page, "capture cancelled") {
                debug!("CaptureSession: {err}");
            }
        }
    }

    /// Run the analysis pipeline on the held capture.
    pub fn analyze(
        &mut self,
        ticket: &CaptureTicket,
        instructions: &str,
        document_type: &str,
        now: Instant,
    ) -> AnalysisOutcome {
        let held = match self.in_flight.take() {
            Some(h) if h.page == ticket.page => Some(h),
            other => {
                self.in_flight = other;
                None
            }
        };
        let ctx = AnalysisContext {
            instructions,
            document_type,
            image_quality: held.as_ref().map(|h| h.quality),
        };
        let Some(held) = held else {
            return AnalysisOutcome {
                result: self.pipeline.run(None, &ctx, now),
                record: None,
                events: Vec::new(),
            };
        };

        if let Err(err) = self.tracker.mark_analyzing(held.page) {
            warn!("CaptureSession: {err}");
        }
        let result = self.pipeline.run(Some(&held.capture), &ctx, now);
        let mut events = Vec::new();
        let mut record = None;

        match (&result.analysis, &result.error) {
            (Some(analysis), _) => {
                if let Err(err) = self.tracker.complete(held.page, analysis.result.clone()) {
                    warn!("CaptureSession: {err}");
                }
                let mut entry = AnalysisRecord::new(
                    self.session_id.clone(),
                    held.page,
                    analysis.confidence,
                    analysis.result.clone(),
                );
                entry.warnings = result.warnings.clone();
                match self.store.insert(entry) {
                    Ok(id) => record = Some(id),
                    Err(err) => warn!("CaptureSession: record not stored: {err}"),
                }
                events.push(FeedbackEvent::AnalysisSucceeded {
                    page: held.page,
                    confidence: analysis.confidence,
                });
            }
            (None, error) => {
                let reason = error
                    .as_ref()
                    .map_or_else(|| "analysis failed".to_owned(), |e| e.message.clone());
                if let Err(err) = self.tracker.fail(held.page, reason) {
                    warn!("CaptureSession: {err}");
                }
            }
        }
        AnalysisOutcome {
            result,
            record,
            events,
        }
    }

    /// Feed back whether a result for `document_type` was correct.
    pub fn record_outcome(&mut self, document_type: &str, correct: bool) {
        self.pipeline
            .calibrator_mut()
            .record_outcome(document_type, correct);
    }

    pub fn cross_page_analysis(&self) -> SessionAnalysis {
        self.reasoner.analyze(
            self.tracker
                .complete_pages()
                .filter_map(|p| p.analysis.as_ref().map(|a| (p.id, a))),
        )
    }

    /// Forget all pages, detection history and any held capture.
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.tracker.reset();
        self.readiness.reset();
        self.scheduler.reset();
        self.current_page = None;
        self.last_detection = None;
        self.in_flight = None;
        info!("CaptureSession: {} reset", self.session_id);
    }
}

fn quality_rejection(issue: IssueKind, value: f32) -> CaptureRejection {
    CaptureRejection::Quality {
        issue,
        value,
        recommendation: issue.recommendation(),
    }
}
