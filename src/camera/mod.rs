//! Camera devices.
//!
//! A `DeviceOpener` turns capture settings into an open `CameraDevice`
//! handle. The handle is the OS-level resource: dropping it releases the
//! device. Sessions never hold more than one.
//!
//! `SystemOpener` dispatches on the device string:
//! - `stub://offline`: always fails to open (exercises the unavailable path)
//! - `stub://<name>`: synthetic frames, no hardware needed
//! - anything else: a V4L2 node such as `/dev/video0` (feature: camera-v4l2)

#[cfg(feature = "camera-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "camera-v4l2")]
pub mod v4l2;

use std::time::Duration;

use crate::error::{VisionError, VisionResult};
use crate::frame::{Frame, WORKING_HEIGHT, WORKING_WIDTH};

pub use synthetic::SyntheticCamera;
#[cfg(feature = "camera-v4l2")]
pub use v4l2::V4l2Camera;

pub const DEFAULT_DEVICE: &str = "/dev/video0";
pub const DEFAULT_TARGET_FPS: u32 = 15;
const OFFLINE_STUB: &str = "stub://offline";

/// Capture parameters applied when a device is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Device path (e.g., "/dev/video0") or `stub://` name.
    pub device: String,
    /// Requested frame width.
    pub width: u32,
    /// Requested frame height.
    pub height: u32,
    /// Requested frame rate. 0 means as fast as the device delivers.
    pub target_fps: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            width: WORKING_WIDTH,
            height: WORKING_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

impl CaptureSettings {
    /// Minimum spacing between frames implied by `target_fps`.
    pub fn frame_interval(&self) -> Duration {
        if self.target_fps == 0 {
            Duration::from_millis(0)
        } else {
            Duration::from_millis((1000 / self.target_fps).max(1) as u64)
        }
    }
}

/// An open camera handle. Dropping it releases the device.
pub trait CameraDevice: Send {
    /// Block until the next frame is available.
    fn read_frame(&mut self) -> VisionResult<Frame>;

    /// Human-readable device description for logs.
    fn describe(&self) -> String;
}

/// Opens camera handles. Every call opens a fresh handle.
pub trait DeviceOpener: Send + Sync {
    fn open(&self, settings: &CaptureSettings) -> VisionResult<Box<dyn CameraDevice>>;
}

/// Opener for real devices and `stub://` synthetic sources.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemOpener;

impl DeviceOpener for SystemOpener {
    fn open(&self, settings: &CaptureSettings) -> VisionResult<Box<dyn CameraDevice>> {
        if settings.device == OFFLINE_STUB {
            return Err(VisionError::device_unavailable(format!(
                "{} never opens",
                settings.device
            )));
        }
        if settings.device.starts_with("stub://") {
            return Ok(Box::new(SyntheticCamera::open(settings.clone())));
        }
        open_hardware(settings)
    }
}

#[cfg(feature = "camera-v4l2")]
fn open_hardware(settings: &CaptureSettings) -> VisionResult<Box<dyn CameraDevice>> {
    Ok(Box::new(V4l2Camera::open(settings.clone())?))
}

#[cfg(not(feature = "camera-v4l2"))]
fn open_hardware(settings: &CaptureSettings) -> VisionResult<Box<dyn CameraDevice>> {
    Err(VisionError::device_unavailable(format!(
        "cannot open {}: hardware capture requires the camera-v4l2 feature",
        settings.device
    )))
}
