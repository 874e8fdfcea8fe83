use image::RgbImage;

use crate::error::{VisionError, VisionResult};
use crate::frame::{self, Frame};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" => Some(PixelFormat::Mjpeg),
            _ => None,
        }
    }
}

pub(crate) fn to_frame(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> VisionResult<Frame> {
    match format {
        PixelFormat::Rgb24 => {
            let expected = rgb_len(width, height)?;
            if pixels.len() < expected {
                return Err(VisionError::malformed(format!(
                    "RGB frame length mismatch: expected {}, got {}",
                    expected,
                    pixels.len()
                )));
            }
            frame::frame_from_rgb(pixels[..expected].to_vec(), width, height)
        }
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, width, height),
        PixelFormat::Mjpeg => frame::decode_image(pixels),
    }
}

fn rgb_len(width: u32, height: u32) -> VisionResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| VisionError::malformed("RGB frame dimensions overflow"))
}

/// Packed 4:2:2 (Y0 U Y1 V) to RGB24, BT.601.
fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> VisionResult<Frame> {
    let w = width as usize;
    let h = height as usize;
    if w % 2 != 0 {
        return Err(VisionError::malformed("YUYV frame width must be even"));
    }
    let expected = w
        .checked_mul(h)
        .and_then(|v| v.checked_mul(2))
        .ok_or_else(|| VisionError::malformed("YUYV frame dimensions overflow"))?;
    if pixels.len() < expected {
        return Err(VisionError::malformed(format!(
            "YUYV frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        )));
    }

    let mut rgb = vec![0u8; rgb_len(width, height)?];
    for (pair, chunk) in pixels[..expected].chunks_exact(4).enumerate() {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for (k, &y) in [chunk[0], chunk[2]].iter().enumerate() {
            let y = y as f32;
            let offset = (pair * 2 + k) * 3;
            rgb[offset] = clamp_to_u8(y + 1.402_f32 * v);
            rgb[offset + 1] = clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v);
            rgb[offset + 2] = clamp_to_u8(y + 1.772_f32 * u);
        }
    }

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| VisionError::malformed("YUYV conversion produced a short buffer"))
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_conversion_produces_gray() -> VisionResult<()> {
        let yuyv = vec![128u8, 128, 128, 128, 128, 128, 128, 128];
        let frame = to_frame(&yuyv, 2, 2, PixelFormat::Yuyv)?;
        assert_eq!(frame.into_raw(), vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn rgb_pass_through_validates_length() -> VisionResult<()> {
        let pixels = vec![1u8; 9];
        let frame = to_frame(&pixels, 1, 3, PixelFormat::Rgb24)?;
        assert_eq!(frame.into_raw(), pixels);
        assert!(to_frame(&pixels[..8], 1, 3, PixelFormat::Rgb24).is_err());
        Ok(())
    }

    #[test]
    fn fourcc_mapping() {
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(b"NV12"), None);
    }
}
