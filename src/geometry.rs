//! Planar geometry for document outlines: quads, bounding boxes, IoU.
//!
//! Points are `[x, y]` in image coordinates (x right, y down). A [`Quad`]
//! always stores its corners in rotational order starting at the top-left
//! corner: top-left, top-right, bottom-right, bottom-left.
use serde::{Deserialize, Serialize};

pub type Point = [f32; 2];

const EPS: f32 = 1e-6;

/// Structural defect found while validating a raw corner list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuadDefect {
    WrongArity,
    NonFinite,
    Degenerate,
    SelfIntersecting,
}

/// Four-corner document outline.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub corners: [Point; 4],
}

impl Quad {
    /// Build a quad from four corners in any order; corners are re-sorted.
    pub fn new(corners: [Point; 4]) -> Self {
        Self {
            corners: sort_corners(corners),
        }
    }

    /// Axis-aligned rectangle `[x0, x1] × [y0, y1]`.
    pub fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            corners: [[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
        }
    }

    /// Validate a raw corner list in the order given and build a sorted quad.
    ///
    /// The self-intersection test runs on the caller's order so that a
    /// bow-tie outline is reported instead of silently repaired by sorting.
    pub fn from_points(points: &[Point]) -> Result<Self, QuadDefect> {
        let corners: [Point; 4] = points.try_into().map_err(|_| QuadDefect::WrongArity)?;
        if corners.iter().flatten().any(|v| !v.is_finite()) {
            return Err(QuadDefect::NonFinite);
        }
        if is_self_intersecting(&corners) {
            return Err(QuadDefect::SelfIntersecting);
        }
        if polygon_area(&corners) < 1.0 || min_side(&corners) < 1.0 {
            return Err(QuadDefect::Degenerate);
        }
        Ok(Self::new(corners))
    }

    pub fn area(&self) -> f32 {
        polygon_area(&self.corners)
    }

    pub fn centroid(&self) -> Point {
        centroid(&self.corners)
    }

    pub fn bbox(&self) -> BBox {
        BBox::of_points(&self.corners)
    }

    /// Side lengths: top, right, bottom, left.
    pub fn side_lengths(&self) -> [f32; 4] {
        side_lengths(&self.corners)
    }

    /// Interior angles in degrees, one per corner.
    pub fn interior_angles_deg(&self) -> [f32; 4] {
        let c = &self.corners;
        let mut out = [0.0f32; 4];
        for (i, angle) in out.iter_mut().enumerate() {
            let prev = c[(i + 3) % 4];
            let cur = c[i];
            let next = c[(i + 1) % 4];
            let a = [prev[0] - cur[0], prev[1] - cur[1]];
            let b = [next[0] - cur[0], next[1] - cur[1]];
            let na = (a[0] * a[0] + a[1] * a[1]).sqrt().max(EPS);
            let nb = (b[0] * b[0] + b[1] * b[1]).sqrt().max(EPS);
            let cos = ((a[0] * b[0] + a[1] * b[1]) / (na * nb)).clamp(-1.0, 1.0);
            *angle = cos.acos().to_degrees();
        }
        out
    }

    pub fn is_convex(&self) -> bool {
        is_convex(&self.corners)
    }

    /// Average of opposite side lengths as (width, height).
    pub fn mean_extent(&self) -> (f32, f32) {
        let [top, right, bottom, left] = self.side_lengths();
        ((top + bottom) * 0.5, (left + right) * 0.5)
    }

    /// Multiply every coordinate by `factor` (frame → native resolution).
    pub fn scaled(&self, factor: f32) -> Self {
        let mut corners = self.corners;
        for c in &mut corners {
            c[0] *= factor;
            c[1] *= factor;
        }
        Self { corners }
    }

    /// Mean Euclidean displacement of corresponding corners.
    pub fn mean_corner_displacement(&self, other: &Quad) -> f32 {
        self.corners
            .iter()
            .zip(other.corners.iter())
            .map(|(a, b)| distance(a, b))
            .sum::<f32>()
            / 4.0
    }

    /// Largest displacement of any corresponding corner.
    pub fn max_corner_displacement(&self, other: &Quad) -> f32 {
        self.corners
            .iter()
            .zip(other.corners.iter())
            .map(|(a, b)| distance(a, b))
            .fold(0.0, f32::max)
    }

    /// Corner-wise average of a non-empty set of quads.
    pub fn average<'a>(quads: impl IntoIterator<Item = &'a Quad>) -> Option<Quad> {
        let mut acc = [[0.0f32; 2]; 4];
        let mut n = 0usize;
        for q in quads {
            for (a, c) in acc.iter_mut().zip(q.corners.iter()) {
                a[0] += c[0];
                a[1] += c[1];
            }
            n += 1;
        }
        if n == 0 {
            return None;
        }
        let inv = 1.0 / n as f32;
        for a in &mut acc {
            a[0] *= inv;
            a[1] *= inv;
        }
        Some(Quad { corners: acc })
    }

    pub fn to_vec(&self) -> Vec<Point> {
        self.corners.to_vec()
    }
}

/// Sort four corners rotationally around their centroid, starting top-left.
///
/// Corners are ordered by increasing angle around the centroid (clockwise on
/// screen since y points down); the cycle is then rotated so that the corner
/// with the smallest `x + y` comes first.
pub fn sort_corners(corners: [Point; 4]) -> [Point; 4] {
    let c = centroid(&corners);
    let mut sorted = corners;
    sorted.sort_by(|a, b| {
        let ta = (a[1] - c[1]).atan2(a[0] - c[0]);
        let tb = (b[1] - c[1]).atan2(b[0] - c[0]);
        ta.total_cmp(&tb)
    });
    let start = sorted
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a[0] + a[1]).total_cmp(&(b[0] + b[1])))
        .map(|(i, _)| i)
        .unwrap_or(0);
    sorted.rotate_left(start);
    sorted
}

#[inline]
pub fn distance(a: &Point, b: &Point) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return [0.0, 0.0];
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p[0], sy + p[1]));
    [sx / n, sy / n]
}

/// Shoelace area (absolute value) of a simple polygon.
pub fn polygon_area(points: &[Point]) -> f32 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice = 0.0f32;
    for i in 0..n {
        let p = points[i];
        let q = points[(i + 1) % n];
        twice += p[0] * q[1] - q[0] * p[1];
    }
    (twice * 0.5).abs()
}

fn side_lengths(c: &[Point; 4]) -> [f32; 4] {
    [
        distance(&c[0], &c[1]),
        distance(&c[1], &c[2]),
        distance(&c[2], &c[3]),
        distance(&c[3], &c[0]),
    ]
}

/// Shortest side of the closed polygon.
pub fn min_side(c: &[Point; 4]) -> f32 {
    side_lengths(c).into_iter().fold(f32::INFINITY, f32::min)
}

/// Signed orientation of the triangle (a, b, c): >0 one way, <0 the other.
#[inline]
pub fn orientation(a: &Point, b: &Point, c: &Point) -> f32 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// Proper crossing test for segments `p1p2` and `p3p4`.
pub fn segments_cross(p1: &Point, p2: &Point, p3: &Point, p4: &Point) -> bool {
    let d1 = orientation(p3, p4, p1);
    let d2 = orientation(p3, p4, p2);
    let d3 = orientation(p1, p2, p3);
    let d4 = orientation(p1, p2, p4);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

/// A quadrilateral self-intersects iff one pair of opposite sides crosses.
pub fn is_self_intersecting(c: &[Point; 4]) -> bool {
    segments_cross(&c[0], &c[1], &c[2], &c[3]) || segments_cross(&c[1], &c[2], &c[3], &c[0])
}

/// Every consecutive turn has the same sign.
pub fn is_convex(c: &[Point; 4]) -> bool {
    let mut sign = 0.0f32;
    for i in 0..4 {
        let o = orientation(&c[i], &c[(i + 1) % 4], &c[(i + 2) % 4]);
        if o.abs() <= EPS {
            continue;
        }
        if sign == 0.0 {
            sign = o.signum();
        } else if o.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl BBox {
    pub fn of_points(points: &[Point]) -> Self {
        let mut b = BBox {
            min_x: f32::INFINITY,
            min_y: f32::INFINITY,
            max_x: f32::NEG_INFINITY,
            max_y: f32::NEG_INFINITY,
        };
        for p in points {
            b.min_x = b.min_x.min(p[0]);
            b.min_y = b.min_y.min(p[1]);
            b.max_x = b.max_x.max(p[0]);
            b.max_y = b.max_y.max(p[1]);
        }
        b
    }

    pub fn width(&self) -> f32 {
        (self.max_x - self.min_x).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.max_y - self.min_y).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let w = self.max_x.min(other.max_x) - self.min_x.max(other.min_x);
        let h = self.max_y.min(other.max_y) - self.min_y.max(other.min_y);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    /// Intersection over union; 0 for disjoint or empty boxes.
    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = self.intersection_area(other);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}
