//! Hough-transform line voting over an edge map.
//!
//! Lines use the normal form `rho = x·cosθ + y·sinθ` with `θ ∈ [0, π)` at a
//! configurable angular resolution (1° by default) and 1 px rho bins. Peaks
//! are local maxima of the accumulator, taken in decreasing vote order and
//! merged greedily: a candidate within the rho/theta tolerance of an already
//! accepted line is dropped, so the higher-vote line always wins.
//!
//! Orientation buckets follow the document convention: a *vertical-ish* line
//! has its normal near 0°/180°, a *horizontal-ish* line near 90°.
use crate::angle::angular_difference;
use crate::edges::EdgeMap;
use crate::geometry::Point;
use nalgebra::{Matrix2, Vector2};
use serde::Serialize;
use std::f32::consts::{FRAC_PI_2, PI};

/// Line in frame-local polar coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Line {
    /// Signed distance from the origin in pixels.
    pub rho: f32,
    /// Normal angle in radians, `[0, π)`.
    pub theta: f32,
    /// Accumulator votes.
    pub votes: u32,
}

impl Line {
    /// Whether the normal lies within `tol` of 90° (a horizontal-ish line).
    pub fn is_horizontal(&self, tol: f32) -> bool {
        (self.theta - FRAC_PI_2).abs() <= tol
    }

    /// Whether the normal lies within `tol` of 0°/180° (a vertical-ish line).
    pub fn is_vertical(&self, tol: f32) -> bool {
        self.theta <= tol || PI - self.theta <= tol
    }

    /// Whether two lines are the same line within the given tolerances,
    /// accounting for the `(rho, θ) ≡ (−rho, θ ± π)` wrap.
    pub fn is_near(&self, other: &Line, rho_tol: f32, theta_tol: f32) -> bool {
        if angular_difference(self.theta, other.theta) > theta_tol {
            return false;
        }
        let wrapped = (self.theta - other.theta).abs() > FRAC_PI_2;
        let other_rho = if wrapped { -other.rho } else { other.rho };
        (self.rho - other_rho).abs() <= rho_tol
    }

    /// Intersection point, `None` for (near-)parallel lines.
    pub fn intersect(&self, other: &Line) -> Option<Point> {
        let a = Matrix2::new(
            self.theta.cos(),
            self.theta.sin(),
            other.theta.cos(),
            other.theta.sin(),
        );
        if a.determinant().abs() < 1e-4 {
            return None;
        }
        let inv = a.try_inverse()?;
        let p = inv * Vector2::new(self.rho, other.rho);
        (p[0].is_finite() && p[1].is_finite()).then_some([p[0], p[1]])
    }
}

/// Line voting parameters.
#[derive(Clone, Debug)]
pub struct HoughParams {
    /// Angular resolution in degrees.
    pub theta_step_deg: f32,
    /// Minimum votes for a peak.
    pub min_votes: u32,
    /// Maximum number of lines returned.
    pub max_lines: usize,
    /// Rho merge tolerance in pixels.
    pub merge_rho_px: f32,
    /// Theta merge tolerance in degrees.
    pub merge_theta_deg: f32,
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            theta_step_deg: 1.0,
            min_votes: 20,
            max_lines: 16,
            merge_rho_px: 12.0,
            merge_theta_deg: 8.0,
        }
    }
}

/// Vote accumulator over `(θ, rho)`.
pub struct Accumulator {
    width: usize,
    height: usize,
    theta_step_deg: f32,
    thetas: Vec<f32>,
    cos: Vec<f32>,
    sin: Vec<f32>,
    rho_max: i32,
    rho_bins: usize,
    votes: Vec<u32>,
}

impl Accumulator {
    pub fn new(width: usize, height: usize, theta_step_deg: f32) -> Self {
        let step = theta_step_deg.clamp(0.1, 45.0).to_radians();
        let n_theta = (PI / step).round().max(1.0) as usize;
        let thetas: Vec<f32> = (0..n_theta).map(|i| i as f32 * step).collect();
        let cos = thetas.iter().map(|t| t.cos()).collect();
        let sin = thetas.iter().map(|t| t.sin()).collect();
        let rho_max = ((width * width + height * height) as f32).sqrt().ceil() as i32;
        let rho_bins = (2 * rho_max + 1) as usize;
        Self {
            width,
            height,
            theta_step_deg,
            votes: vec![0; n_theta * rho_bins],
            thetas,
            cos,
            sin,
            rho_max,
            rho_bins,
        }
    }

    /// Whether this accumulator can be reused for a frame of the given shape.
    pub fn fits(&self, width: usize, height: usize, theta_step_deg: f32) -> bool {
        self.width == width && self.height == height && self.theta_step_deg == theta_step_deg
    }

    /// Zero all votes, keeping the allocation.
    pub fn clear(&mut self) {
        self.votes.iter_mut().for_each(|v| *v = 0);
    }

    #[inline]
    fn at(&self, t: usize, r: usize) -> u32 {
        self.votes[t * self.rho_bins + r]
    }

    /// Add one vote per θ bin for every edge pixel.
    pub fn vote(&mut self, edges: &EdgeMap) {
        for (x, y) in edges.edge_pixels() {
            let (xf, yf) = (x as f32, y as f32);
            for t in 0..self.thetas.len() {
                let rho = xf * self.cos[t] + yf * self.sin[t];
                let r = (rho.round() as i32 + self.rho_max) as usize;
                if r < self.rho_bins {
                    self.votes[t * self.rho_bins + r] += 1;
                }
            }
        }
    }

    /// Local maxima (3×3 neighbourhood) with at least `min_votes`, strongest first.
    pub fn peaks(&self, min_votes: u32) -> Vec<Line> {
        let n_theta = self.thetas.len();
        let mut out = Vec::new();
        for t in 0..n_theta {
            for r in 0..self.rho_bins {
                let v = self.at(t, r);
                if v < min_votes.max(1) {
                    continue;
                }
                let mut is_max = true;
                'nbr: for dt in [n_theta - 1, 0, 1] {
                    let tt = (t + dt) % n_theta;
                    // crossing θ = π flips the sign of rho
                    let wraps = dt != 0
                        && ((dt == 1 && t + 1 == n_theta) || (dt == n_theta - 1 && t == 0));
                    let base = if wraps {
                        2 * self.rho_max - r as i32
                    } else {
                        r as i32
                    };
                    for dr in [-1i32, 0, 1] {
                        if dt == 0 && dr == 0 {
                            continue;
                        }
                        let rr = base + dr;
                        if rr < 0 || rr as usize >= self.rho_bins {
                            continue;
                        }
                        let nv = self.at(tt, rr as usize);
                        // ties resolve towards the lower index
                        if nv > v || (nv == v && (tt, rr as usize) < (t, r)) {
                            is_max = false;
                            break 'nbr;
                        }
                    }
                }
                if is_max {
                    out.push(Line {
                        rho: r as f32 - self.rho_max as f32,
                        theta: self.thetas[t],
                        votes: v,
                    });
                }
            }
        }
        out.sort_by(|a, b| b.votes.cmp(&a.votes));
        out
    }
}

/// Vote over `edges` and return up to `max_lines` merged, strongest-first lines.
pub fn detect_lines(edges: &EdgeMap, params: &HoughParams) -> Vec<Line> {
    if edges.w == 0 || edges.h == 0 {
        return Vec::new();
    }
    let mut acc = Accumulator::new(edges.w, edges.h, params.theta_step_deg);
    detect_lines_with(&mut acc, edges, params)
}

/// Like [`detect_lines`] but votes into a caller-owned accumulator, which
/// must have been built for the edge map's shape.
pub fn detect_lines_with(acc: &mut Accumulator, edges: &EdgeMap, params: &HoughParams) -> Vec<Line> {
    acc.clear();
    acc.vote(edges);
    merge_lines(
        acc.peaks(params.min_votes),
        params.merge_rho_px,
        params.merge_theta_deg.to_radians(),
        params.max_lines,
    )
}

/// Greedy non-overlap pruning of strongest-first candidates.
pub fn merge_lines(candidates: Vec<Line>, rho_tol: f32, theta_tol: f32, max: usize) -> Vec<Line> {
    let mut kept: Vec<Line> = Vec::with_capacity(max);
    for line in candidates {
        if kept.len() >= max {
            break;
        }
        if kept.iter().any(|k| k.is_near(&line, rho_tol, theta_tol)) {
            continue;
        }
        kept.push(line);
    }
    kept
}
