//! Angle helpers for line voting.

use std::f32::consts::{FRAC_PI_2, PI};

/// Smallest unsigned difference between two line orientations; antipodal
/// directions compare equal (π apart → 0).
#[inline]
pub fn angular_difference(a: f32, b: f32) -> f32 {
    let diff = (a - b).abs().rem_euclid(PI);
    if diff > FRAC_PI_2 {
        PI - diff
    } else {
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn angular_difference_handles_wrap() {
        assert!(approx_eq(angular_difference(0.0, PI), 0.0));
        assert!(approx_eq(angular_difference(0.0, FRAC_PI_2), FRAC_PI_2));
        assert!(approx_eq(angular_difference(FRAC_PI_4, -FRAC_PI_4), FRAC_PI_2));
        assert!(approx_eq(angular_difference(0.05, PI - 0.05), 0.1));
        assert!(approx_eq(angular_difference(0.25, 1.7), angular_difference(1.7, 0.25)));
    }
}
