#![allow(dead_code)]

use doc_capture::image::io::encode_png;
use doc_capture::image::GrayImageU8;
use doc_capture::types::Frame;
use image::{Rgb, RgbImage};

pub const DESK: u8 = 40;
pub const PAPER: u8 = 230;
pub const INK: u8 = 30;

/// Light page at `page = (x0, y0, x1, y1)` on a dark desk. Text-like rows of
/// dashes are kept 12 px away from the page border so the page outline is
/// the strongest straight structure in the image.
pub fn document_rgb(width: u32, height: u32, page: (u32, u32, u32, u32)) -> RgbImage {
    assert!(width > 0 && height > 0, "image dimensions must be positive");
    let (x0, y0, x1, y1) = page;
    let margin = 12;
    RgbImage::from_fn(width, height, |x, y| {
        if x < x0 || x >= x1 || y < y0 || y >= y1 {
            return Rgb([DESK; 3]);
        }
        let (lx, ly) = (x - x0, y - y0);
        let in_text_area =
            lx >= margin && lx < (x1 - x0) - margin && ly >= margin && ly < (y1 - y0) - margin;
        let ink = in_text_area && (ly - margin) % 14 < 4 && (lx - margin) % 10 < 6;
        Rgb([if ink { INK } else { PAPER }; 3])
    })
}

/// Same page with a different text layout: tall blocks instead of rows.
pub fn other_document_rgb(width: u32, height: u32, page: (u32, u32, u32, u32)) -> RgbImage {
    let (x0, y0, x1, y1) = page;
    let margin = 12;
    RgbImage::from_fn(width, height, |x, y| {
        if x < x0 || x >= x1 || y < y0 || y >= y1 {
            return Rgb([DESK; 3]);
        }
        let (lx, ly) = (x - x0, y - y0);
        let in_text_area = lx >= margin
            && lx < (x1 - x0) / 2
            && ly >= margin
            && ly < (y1 - y0) - margin;
        let ink = in_text_area && (lx - margin) % 16 < 3;
        Rgb([if ink { INK } else { PAPER }; 3])
    })
}

/// Uniform gray image with no structure at all.
pub fn blank_rgb(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value; 3]))
}

pub fn frame_of(rgb: &RgbImage) -> Frame {
    Frame::new(GrayImageU8::from_rgb(rgb))
}

pub fn png_of(rgb: &RgbImage) -> Vec<u8> {
    encode_png(rgb).expect("encode synthetic still")
}
