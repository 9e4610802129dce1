//! Sobel image gradients with magnitude.
//!
//! - Convolves the 3×3 Sobel pair with border clamping (replicate).
//! - Outputs per-pixel `gx`, `gy` and `mag = sqrt(gx^2 + gy^2)`.
//!
//! On a [0,1] input a step edge of height `d` yields a magnitude of `4·d`.
use crate::image::{ImageF32, ImageView, ImageViewMut};

/// Per-pixel gradient buffers.
#[derive(Clone, Debug)]
pub struct Grad {
    pub gx: ImageF32,
    pub gy: ImageF32,
    pub mag: ImageF32,
}

/// Sobel gradients of a float image, replicating border pixels.
pub fn sobel_gradients(l: &ImageF32) -> Grad {
    let (w, h) = (l.w, l.h);
    let mut grad = Grad {
        gx: ImageF32::new(w, h),
        gy: ImageF32::new(w, h),
        mag: ImageF32::new(w, h),
    };
    if w == 0 || h == 0 {
        return grad;
    }

    for y in 0..h {
        let up = l.row(y.saturating_sub(1));
        let mid = l.row(y);
        let down = l.row((y + 1).min(h - 1));
        for x in 0..w {
            let (xl, xr) = (x.saturating_sub(1), (x + 1).min(w - 1));
            let dx = (up[xr] - up[xl]) + 2.0 * (mid[xr] - mid[xl]) + (down[xr] - down[xl]);
            let dy = (down[xl] - up[xl]) + 2.0 * (down[x] - up[x]) + (down[xr] - up[xr]);
            grad.gx.row_mut(y)[x] = dx;
            grad.gy.row_mut(y)[x] = dy;
            grad.mag.row_mut(y)[x] = dx.hypot(dy);
        }
    }
    grad
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertical_step_produces_horizontal_gradient() {
        let mut img = ImageF32::new(8, 8);
        for y in 0..8 {
            for x in 4..8 {
                img.set(x, y, 1.0);
            }
        }
        let g = sobel_gradients(&img);
        assert!((g.gx.get(4, 4) - 4.0).abs() < 1e-5 || (g.gx.get(3, 4) - 4.0).abs() < 1e-5);
        assert!(g.gy.get(4, 4).abs() < 1e-5);
        assert_eq!(g.mag.get(0, 4), 0.0);
    }
}
