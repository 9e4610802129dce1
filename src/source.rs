//! Camera frame sources.
//!
//! The capture loop pulls native RGBA frames from a [`FrameSource`] and
//! converts them into downscaled detection frames and encoded stills.
use crate::error::{CaptureError, Result};
use crate::image::io::{encode_png, load_rgb_image};
use crate::types::{Frame, DETECTION_LONG_EDGE};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::path::Path;

/// Native camera frame, tightly packed RGBA.
#[derive(Clone, Debug)]
pub struct RgbaFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbaFrame {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        let expected = width * height * 4;
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

    pub fn from_rgb(rgb: &RgbImage) -> Self {
        let mut data = Vec::with_capacity(rgb.as_raw().len() / 3 * 4);
        for px in rgb.pixels() {
            data.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        Self {
            width: rgb.width() as usize,
            height: rgb.height() as usize,
            data,
        }
    }

    /// Detection frame with the long edge capped at [`DETECTION_LONG_EDGE`].
    pub fn detection_frame(&self) -> Result<Frame> {
        Frame::from_rgba(self.width, self.height, &self.data, DETECTION_LONG_EDGE)
    }

    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let i = (y as usize * self.width + x as usize) * 4;
            Rgb([self.data[i], self.data[i + 1], self.data[i + 2]])
        })
    }

    /// Full-resolution still encoded as PNG.
    pub fn encode_still(&self) -> Result<Vec<u8>> {
        encode_png(&self.to_rgb())
    }
}

pub trait FrameSource {
    /// Native frame size `(width, height)`.
    fn dimensions(&self) -> (usize, usize);
    /// Next frame, or `None` when the source is exhausted or not ready.
    fn grab(&mut self) -> Option<RgbaFrame>;
}

/// Replays a fixed list of frames, e.g. images loaded from disk.
pub struct ImageSequence {
    frames: VecDeque<RgbaFrame>,
    dims: (usize, usize),
}

impl ImageSequence {
    pub fn new(frames: Vec<RgbaFrame>) -> Self {
        let dims = frames.first().map_or((0, 0), |f| (f.width, f.height));
        Self {
            frames: frames.into(),
            dims,
        }
    }

    pub fn from_images(images: &[RgbImage]) -> Self {
        Self::new(images.iter().map(RgbaFrame::from_rgb).collect())
    }

    pub fn load(paths: &[&Path]) -> Result<Self> {
        let images = paths
            .iter()
            .map(|p| load_rgb_image(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_images(&images))
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ImageSequence {
    fn dimensions(&self) -> (usize, usize) {
        self.dims
    }

    fn grab(&mut self) -> Option<RgbaFrame> {
        self.frames.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffers() {
        assert!(matches!(
            RgbaFrame::new(4, 4, vec![0; 10]),
            Err(CaptureError::BufferSize {
                expected: 64,
                actual: 10
            })
        ));
    }

    #[test]
    fn sequence_yields_downscaled_frames_in_order() {
        let imgs = vec![
            RgbImage::from_pixel(640, 480, Rgb([10, 10, 10])),
            RgbImage::from_pixel(640, 480, Rgb([200, 200, 200])),
        ];
        let mut src = ImageSequence::from_images(&imgs);
        assert_eq!(src.dimensions(), (640, 480));
        let first = src.grab().expect("frame");
        let frame = first.detection_frame().expect("frame");
        assert_eq!((frame.width(), frame.height()), (320, 240));
        assert!((frame.downscale - 2.0).abs() < 1e-6);
        assert_eq!(first.to_rgb(), imgs[0]);
        assert!(src.grab().is_some());
        assert!(src.grab().is_none());
    }
}
