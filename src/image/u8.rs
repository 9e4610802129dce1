//! 8-bit grayscale images: a borrowed strided view and an owned buffer.
use super::traits::{ImageView, ImageViewMut};
use crate::error::CaptureError;
use image::RgbImage;

/// Borrowed 8-bit grayscale view.
#[derive(Clone, Debug)]
pub struct ImageU8<'a> {
    pub w: usize,
    pub h: usize,
    pub stride: usize, // bytes between rows
    pub data: &'a [u8],
}

impl<'a> ImageU8<'a> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.stride + x]
    }

    /// Mean intensity over the whole view, 0 for empty views.
    pub fn mean(&self) -> f32 {
        if self.w == 0 || self.h == 0 {
            return 0.0;
        }
        let sum: u64 = self
            .rows()
            .map(|row| row.iter().map(|&v| v as u64).sum::<u64>())
            .sum();
        sum as f32 / (self.w * self.h) as f32
    }
}

impl<'a> ImageView for ImageU8<'a> {
    type Pixel = u8;

    #[inline]
    fn width(&self) -> usize {
        self.w
    }
    #[inline]
    fn height(&self) -> usize {
        self.h
    }
    #[inline]
    fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.data[start..start + self.w]
    }
}

/// Owned 8-bit grayscale buffer (`stride == width`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImageU8 {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl GrayImageU8 {
    /// Wrap raw bytes; fails when the buffer does not match `width × height`.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width * height;
        if data.len() != expected {
            return Err(CaptureError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Uniform image filled with `value`.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Rec. 601 luma of an RGB image.
    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let width = rgb.width() as usize;
        let height = rgb.height() as usize;
        let data = rgb
            .pixels()
            .map(|p| luma(p.0[0], p.0[1], p.0[2]))
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Rec. 601 luma of a tightly packed RGBA buffer.
    pub fn from_rgba(width: usize, height: usize, rgba: &[u8]) -> Result<Self, CaptureError> {
        let expected = width * height * 4;
        if rgba.len() != expected {
            return Err(CaptureError::BufferSize {
                expected,
                actual: rgba.len(),
            });
        }
        let data = rgba
            .chunks_exact(4)
            .map(|px| luma(px[0], px[1], px[2]))
            .collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: u8) {
        self.data[y * self.width + x] = v;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Borrow as a read-only `ImageU8` view.
    pub fn as_view(&self) -> ImageU8<'_> {
        ImageU8 {
            w: self.width,
            h: self.height,
            stride: self.width,
            data: &self.data,
        }
    }
}

impl ImageView for GrayImageU8 {
    type Pixel = u8;

    #[inline]
    fn width(&self) -> usize {
        self.width
    }
    #[inline]
    fn height(&self) -> usize {
        self.height
    }
    #[inline]
    fn row(&self, y: usize) -> &[u8] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }
}

impl ImageViewMut for GrayImageU8 {
    #[inline]
    fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = y * self.width;
        &mut self.data[start..start + self.width]
    }
}

#[inline]
pub(crate) fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}
