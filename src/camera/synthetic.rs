//! Synthetic camera for `stub://` devices.

use std::time::Instant;

use image::{Rgb, RgbImage};

use super::{CameraDevice, CaptureSettings};
use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;

/// Generates a moving test pattern at the configured rate.
pub struct SyntheticCamera {
    settings: CaptureSettings,
    frame_count: u64,
    /// Simulated "scene" state, advanced every 50 frames.
    scene_state: u8,
    last_frame_at: Option<Instant>,
}

impl SyntheticCamera {
    /// Synthetic sources are always available.
    pub fn open(settings: CaptureSettings) -> Self {
        log::info!(
            "camera: opened {} (synthetic, {}x{} @ {} fps)",
            settings.device,
            settings.width,
            settings.height,
            settings.target_fps
        );
        Self {
            settings,
            frame_count: 0,
            scene_state: 0,
            last_frame_at: None,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn pace(&mut self) {
        let interval = self.settings.frame_interval();
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    /// Diagonal gradient with a bright vertical bar that sweeps across the frame.
    fn generate(&self) -> Frame {
        let width = self.settings.width;
        let height = self.settings.height;
        let bar_x = ((self.frame_count * 8) % width.max(1) as u64) as u32;
        let tint = self.scene_state.wrapping_mul(40);
        RgbImage::from_fn(width, height, |x, y| {
            if x.abs_diff(bar_x) < 12 {
                return Rgb([240, 240, 240]);
            }
            let base = ((x + y) % 256) as u8;
            Rgb([base, base.wrapping_add(tint), 255 - base])
        })
    }
}

impl CameraDevice for SyntheticCamera {
    fn read_frame(&mut self) -> VisionResult<Frame> {
        if self.settings.width == 0 || self.settings.height == 0 {
            return Err(VisionError::capture_failure("synthetic camera has zero size"));
        }
        self.pace();
        self.frame_count += 1;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        Ok(self.generate())
    }

    fn describe(&self) -> String {
        format!("{} (synthetic)", self.settings.device)
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        log::info!(
            "camera: released {} after {} frame(s)",
            self.settings.device,
            self.frame_count
        );
    }
}
