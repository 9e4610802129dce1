//! Reusable detection buffers.
//!
//! The Hough accumulator is the largest per-cycle allocation; it is kept
//! between frames and only rebuilt when the frame shape or angular
//! resolution changes.
use crate::hough::Accumulator;

#[derive(Default)]
pub struct DetectorWorkspace {
    accumulator: Option<Accumulator>,
}

impl DetectorWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator sized for `width × height` at `theta_step_deg`.
    pub fn accumulator(
        &mut self,
        width: usize,
        height: usize,
        theta_step_deg: f32,
    ) -> &mut Accumulator {
        let stale = self
            .accumulator
            .as_ref()
            .map_or(true, |acc| !acc.fits(width, height, theta_step_deg));
        if stale {
            self.accumulator = Some(Accumulator::new(width, height, theta_step_deg));
        }
        self.accumulator
            .get_or_insert_with(|| Accumulator::new(width, height, theta_step_deg))
    }

    /// Drop cached buffers.
    pub fn reset(&mut self) {
        self.accumulator = None;
    }
}
