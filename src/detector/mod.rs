//! Per-frame document quad detector.
//!
//! Overview
//! - Downscales the frame so its long edge is at most `max_long_edge`.
//! - Computes a thinned Sobel edge map and votes lines into a Hough
//!   accumulator at 1° resolution; the strongest non-overlapping peaks are
//!   kept.
//! - Splits lines into horizontal-ish and vertical-ish buckets, intersects
//!   the top two of each, and validates the resulting quad against margin,
//!   area and interior-angle bounds.
//!
//! Modules
//! - [`params`] – tunables for every stage.
//! - `pipeline` – the [`EdgeQuadDetector`] implementation.
//! - `workspace` – the accumulator cache reused across frames.

pub mod params;
mod pipeline;
mod workspace;

pub use params::DetectorParams;
pub use pipeline::EdgeQuadDetector;
pub use workspace::DetectorWorkspace;
