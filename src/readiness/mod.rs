//! Composite capture-readiness judgment.
//!
//! Every cycle the [`ReadinessEngine`] validates the detected quad, measures
//! seven factors on the detection frame, raises blocking conditions from a
//! fixed threshold table and fuses the scoring factors into one number.
//! `ready` additionally needs the engine's own stability signal to have held
//! for a minimum duration; the timer restarts the moment stability is lost.

mod engine;
pub mod factors;
mod params;

pub use engine::{
    BlockCode, BlockingReason, Hint, ReadinessAssessment, ReadinessEngine, ReadinessInput,
    ReadinessSnapshot, Severity,
};
pub use factors::Factors;
pub use params::{ReadinessParams, ReadinessWeights};
