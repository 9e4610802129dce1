//! Shared value types passed between the detection cycle and the capture path.
use crate::error::CaptureError;
use crate::geometry::Point;
use crate::image::resample::fit_long_edge;
use crate::image::{GrayImageU8, ImageU8};
use crate::readiness::ReadinessSnapshot;
use crate::tracking::PageId;
use std::time::Instant;

/// Long edge of the detection frame in pixels.
pub const DETECTION_LONG_EDGE: usize = 320;

/// Downscaled grayscale frame for one detection cycle.
#[derive(Clone, Debug)]
pub struct Frame {
    pub gray: GrayImageU8,
    /// `native / downscaled` size ratio (≥ 1).
    pub downscale: f32,
}

impl Frame {
    /// Wrap an already-small grayscale image without resampling.
    pub fn new(gray: GrayImageU8) -> Self {
        Self {
            gray,
            downscale: 1.0,
        }
    }

    /// Downscale a native grayscale frame so its long edge is ≤ `max_long_edge`.
    pub fn from_gray(native: &ImageU8<'_>, max_long_edge: usize) -> Self {
        let (gray, downscale) = fit_long_edge(native, max_long_edge);
        Self { gray, downscale }
    }

    /// Convert a native RGBA camera buffer into a detection frame.
    pub fn from_rgba(
        width: usize,
        height: usize,
        rgba: &[u8],
        max_long_edge: usize,
    ) -> Result<Self, CaptureError> {
        let native = GrayImageU8::from_rgba(width, height, rgba)?;
        Ok(Self::from_gray(&native.as_view(), max_long_edge))
    }

    pub fn width(&self) -> usize {
        self.gray.width()
    }

    pub fn height(&self) -> usize {
        self.gray.height()
    }

    pub fn area(&self) -> f32 {
        (self.width() * self.height()) as f32
    }

    pub fn view(&self) -> ImageU8<'_> {
        self.gray.as_view()
    }
}

/// A still handed from the camera to the capture path.
#[derive(Clone, Debug)]
pub struct Capture {
    /// Encoded image bytes (JPEG/PNG) as delivered by the camera.
    pub encoded: Vec<u8>,
    pub captured_at: Instant,
    /// Document outline in detection-frame coordinates, exactly as reported.
    pub quad: Option<Vec<Point>>,
    /// Detection frame size the quad refers to.
    pub frame_size: (usize, usize),
    /// Readiness state at the moment of capture.
    pub readiness: Option<ReadinessSnapshot>,
    /// Page the capture belongs to, when known.
    pub page: Option<PageId>,
}

impl Capture {
    pub fn new(encoded: Vec<u8>, captured_at: Instant) -> Self {
        Self {
            encoded,
            captured_at,
            quad: None,
            frame_size: (0, 0),
            readiness: None,
            page: None,
        }
    }

    pub fn with_quad(mut self, quad: Vec<Point>, frame_size: (usize, usize)) -> Self {
        self.quad = Some(quad);
        self.frame_size = frame_size;
        self
    }

    pub fn with_readiness(mut self, snapshot: ReadinessSnapshot) -> Self {
        self.readiness = Some(snapshot);
        self
    }

    pub fn with_page(mut self, page: PageId) -> Self {
        self.page = Some(page);
        self
    }
}
