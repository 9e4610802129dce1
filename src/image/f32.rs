//! Owned float luminance plane used by the gradient and edge stages.
use super::traits::{ImageView, ImageViewMut};
use super::u8::ImageU8;

/// Row-major `w × h` float image; 8-bit sources map to `[0, 1]`.
#[derive(Clone, Debug)]
pub struct ImageF32 {
    pub w: usize,
    pub h: usize,
    pub data: Vec<f32>,
}

impl ImageF32 {
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            data: vec![0.0; w * h],
        }
    }

    pub fn from_u8(gray: &ImageU8<'_>) -> Self {
        let data = gray
            .rows()
            .flat_map(|row| row.iter().map(|&v| v as f32 / 255.0))
            .collect();
        Self {
            w: gray.w,
            h: gray.h,
            data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.w + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.w + x] = v;
    }
}

impl ImageView for ImageF32 {
    type Pixel = f32;

    fn width(&self) -> usize {
        self.w
    }

    fn height(&self) -> usize {
        self.h
    }

    #[inline]
    fn row(&self, y: usize) -> &[f32] {
        &self.data[y * self.w..(y + 1) * self.w]
    }
}

impl ImageViewMut for ImageF32 {
    #[inline]
    fn row_mut(&mut self, y: usize) -> &mut [f32] {
        &mut self.data[y * self.w..(y + 1) * self.w]
    }
}
