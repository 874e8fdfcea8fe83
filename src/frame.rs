//! Frame primitives shared by the session, the pipeline and the analyzers.
//!
//! - `Frame`: decoded RGB raster (height x width x 3, 8-bit channels).
//! - `FaceRegion`: rectangle within a frame, coordinates only.
//! - Pixel helpers: resize, BT.601 grayscale, 8-bit HSV, crop, overlay.
//! - Codec helpers: JPEG encode at a fixed quality, decode of uploaded bytes.
//!
//! Frames are ephemeral. Nothing in this module writes to disk.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::rect::Rect;
use serde::Serialize;

use crate::error::{VisionError, VisionResult};

/// Canonical working resolution of the streaming pipeline.
pub const WORKING_WIDTH: u32 = 640;
pub const WORKING_HEIGHT: u32 = 480;

/// Overlay color for detected faces.
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
/// Overlay stroke width in pixels.
pub const OVERLAY_STROKE: u32 = 2;

/// A decoded RGB frame.
pub type Frame = RgbImage;

// ----------------------------------------------------------------------------
// FaceRegion
// ----------------------------------------------------------------------------

/// Axis-aligned rectangle within a frame.
///
/// Carries coordinates only. Pixels are copied out with [`FaceRegion::crop`]
/// when a region is classified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Clip the rectangle to the frame bounds. `None` when nothing remains.
    pub fn clipped_to(&self, frame_width: u32, frame_height: u32) -> Option<FaceRegion> {
        if self.x >= frame_width || self.y >= frame_height {
            return None;
        }
        let width = self.width.min(frame_width - self.x);
        let height = self.height.min(frame_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(FaceRegion::new(self.x, self.y, width, height))
    }

    /// Copy the region's pixels out of `frame`.
    pub fn crop(&self, frame: &Frame) -> VisionResult<Frame> {
        let clipped = self
            .clipped_to(frame.width(), frame.height())
            .ok_or_else(|| {
                VisionError::malformed(format!(
                    "region {}x{}+{}+{} is empty within {}x{} frame",
                    self.width,
                    self.height,
                    self.x,
                    self.y,
                    frame.width(),
                    frame.height()
                ))
            })?;
        Ok(
            imageops::crop_imm(frame, clipped.x, clipped.y, clipped.width, clipped.height)
                .to_image(),
        )
    }
}

// ----------------------------------------------------------------------------
// Pixel helpers
// ----------------------------------------------------------------------------

/// Build a frame from packed RGB24 bytes.
pub fn frame_from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> VisionResult<Frame> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| VisionError::malformed("frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(VisionError::malformed(format!(
            "RGB frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        )));
    }
    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| VisionError::malformed("RGB buffer does not match dimensions"))
}

/// Bilinear resize. Returns a copy even when the size already matches.
pub fn resize(frame: &Frame, width: u32, height: u32) -> VisionResult<Frame> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(VisionError::malformed("cannot resize an empty frame"));
    }
    if frame.width() == width && frame.height() == height {
        return Ok(frame.clone());
    }
    Ok(imageops::resize(frame, width, height, FilterType::Triangle))
}

/// BT.601 luma of one pixel, rounded.
pub fn luma(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

/// Grayscale conversion with BT.601 weights.
pub fn to_gray(frame: &Frame) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        Luma([luma(frame.get_pixel(x, y))])
    })
}

/// 8-bit HSV of one pixel: hue in 0..180 (degrees / 2), saturation and value in 0..=255.
pub fn to_hsv(pixel: &Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = pixel.0.map(|c| c as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let mut hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    [
        clamp_to_u8(hue / 2.0).min(179),
        clamp_to_u8(saturation),
        clamp_to_u8(max),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Draw a hollow rectangle per region, `stroke` pixels wide, growing inwards.
///
/// Destructive: the frame is modified in place.
pub fn draw_regions(frame: &mut Frame, regions: &[FaceRegion], color: Rgb<u8>, stroke: u32) {
    for region in regions {
        let Some(region) = region.clipped_to(frame.width(), frame.height()) else {
            continue;
        };
        for inset in 0..stroke {
            let width = region.width.saturating_sub(inset * 2);
            let height = region.height.saturating_sub(inset * 2);
            if width == 0 || height == 0 {
                break;
            }
            let rect = Rect::at((region.x + inset) as i32, (region.y + inset) as i32)
                .of_size(width, height);
            imageproc::drawing::draw_hollow_rect_mut(frame, rect, color);
        }
    }
}

// ----------------------------------------------------------------------------
// Codec helpers
// ----------------------------------------------------------------------------

/// Encode a frame as baseline JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> VisionResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(64 * 1024);
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(frame)?;
    Ok(buf)
}

/// Decode any supported still image into an RGB frame.
pub fn decode_image(bytes: &[u8]) -> VisionResult<Frame> {
    if bytes.is_empty() {
        return Err(VisionError::malformed("empty image payload"));
    }
    let image = image::load_from_memory(bytes)
        .map_err(|err| VisionError::malformed(format!("decode image: {}", err)))?;
    Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_matches_eight_bit_convention() {
        assert_eq!(to_hsv(&Rgb([255, 0, 0])), [0, 255, 255]);
        assert_eq!(to_hsv(&Rgb([0, 255, 0])), [60, 255, 255]);
        assert_eq!(to_hsv(&Rgb([0, 0, 255])), [120, 255, 255]);
        assert_eq!(to_hsv(&Rgb([128, 128, 128])), [0, 0, 128]);
        assert_eq!(to_hsv(&Rgb([0, 0, 0])), [0, 0, 0]);
    }

    #[test]
    fn gray_of_neutral_pixel_is_unchanged() {
        let frame = RgbImage::from_pixel(4, 4, Rgb([77, 77, 77]));
        let gray = to_gray(&frame);
        assert!(gray.pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn crop_clips_to_frame() {
        let frame = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        let crop = FaceRegion::new(8, 8, 5, 5).crop(&frame).unwrap();
        assert_eq!(crop.dimensions(), (2, 2));
    }

    #[test]
    fn crop_outside_frame_is_malformed() {
        let frame = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        let err = FaceRegion::new(10, 0, 5, 5).crop(&frame).unwrap_err();
        assert!(matches!(err, VisionError::MalformedInput(_)));
    }

    #[test]
    fn overlay_draws_two_pixel_border() {
        let mut frame = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        draw_regions(
            &mut frame,
            &[FaceRegion::new(2, 2, 10, 10)],
            OVERLAY_COLOR,
            OVERLAY_STROKE,
        );
        assert_eq!(*frame.get_pixel(2, 2), OVERLAY_COLOR);
        assert_eq!(*frame.get_pixel(3, 3), OVERLAY_COLOR);
        assert_eq!(*frame.get_pixel(4, 4), Rgb([0, 0, 0]));
        assert_eq!(*frame.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn frame_from_rgb_validates_length() {
        assert!(frame_from_rgb(vec![0u8; 12], 2, 2).is_ok());
        assert!(frame_from_rgb(vec![0u8; 11], 2, 2).is_err());
    }

    #[test]
    fn jpeg_encode_then_decode_keeps_dimensions() {
        let frame = RgbImage::from_pixel(32, 24, Rgb([200, 100, 50]));
        let jpeg = encode_jpeg(&frame, 70).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = decode_image(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (32, 24));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            decode_image(b"not an image"),
            Err(VisionError::MalformedInput(_))
        ));
        assert!(decode_image(&[]).is_err());
    }
}
