#![doc = include_str!("../README.md")]

// Per-frame detection and readiness
pub mod detector;
pub mod diagnostics;
pub mod readiness;
pub mod tracking;
pub mod types;

// Capture path: quality, dedup, validation and hand-off
pub mod fingerprint;
pub mod pipeline;
pub mod preflight;
pub mod quality;
pub mod reasoning;
pub mod session;

// Collaborator seams
pub mod backend;
pub mod source;
pub mod store;

// Building blocks, public for tools and tests.
pub mod angle;
pub mod config;
pub mod edges;
pub mod error;
pub mod geometry;
pub mod hough;
pub mod image;

// --- High-level re-exports -------------------------------------------------

pub use crate::detector::{DetectorParams, EdgeQuadDetector};
pub use crate::error::{CaptureError, Result};
pub use crate::geometry::Quad;
pub use crate::types::{Capture, Frame};

pub use crate::readiness::{ReadinessAssessment, ReadinessEngine};
pub use crate::tracking::{PageTracker, TemporalSmoother};

pub use crate::pipeline::{AnalysisPipeline, ErrorCode, PipelineResult};
pub use crate::session::{CaptureRejection, CaptureSession, CycleOutcome, FeedbackEvent};

pub use crate::config::{load_config, CaptureConfig};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for driving a session.
///
/// ```no_run
/// use doc_capture::prelude::*;
/// use std::time::Instant;
///
/// # fn main() {
/// let (w, h) = (640usize, 480usize);
/// let rgba = vec![255u8; w * h * 4];
/// let frame = Frame::from_rgba(w, h, &rgba, 320).expect("frame");
///
/// let mut session = CaptureSession::new(
///     "demo",
///     CaptureConfig::default(),
///     None,
///     Box::new(LocalStore::new()),
/// );
/// let cycle = session.tick(&frame, Instant::now());
/// println!(
///     "ready={} score={:.2} next in {:?}",
///     cycle.assessment.ready, cycle.assessment.score, cycle.next_interval
/// );
/// # }
/// ```
pub mod prelude {
    pub use crate::backend::{AnalysisResult, InterpretationBackend};
    pub use crate::store::LocalStore;
    pub use crate::{CaptureConfig, CaptureSession, Frame, Quad};
}
