//! Temporal state over the detection stream: the smoothing window and the
//! page identities built on top of it.

mod pages;
mod smoother;

pub use pages::{Page, PageId, PageStatus, PageTracker, TrackerParams, TransitionError};
pub use smoother::{Alignment, SmoothedDetection, SmootherParams, TemporalSmoother};
