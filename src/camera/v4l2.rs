//! V4L2 camera device.
//!
//! Opens a local device node (e.g. /dev/video0), negotiates a capture
//! format close to the requested settings, and decodes each buffer into an
//! RGB frame. The device and its mmap stream live together; dropping the
//! camera unmaps the buffers and closes the node.

use ouroboros::self_referencing;

use super::normalize::{to_frame, PixelFormat};
use super::{CameraDevice, CaptureSettings};
use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;

const STREAM_BUFFERS: u32 = 4;

pub struct V4l2Camera {
    settings: CaptureSettings,
    state: V4l2State,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn open(settings: CaptureSettings) -> VisionResult<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let unavailable = |what: &str, err: std::io::Error| {
            VisionError::device_unavailable(format!("{} {}: {}", what, settings.device, err))
        };

        let device =
            v4l::Device::with_path(&settings.device).map_err(|err| unavailable("open", err))?;
        let mut requested = device
            .format()
            .map_err(|err| unavailable("read format of", err))?;
        requested.width = settings.width;
        requested.height = settings.height;
        requested.fourcc = v4l::FourCC::new(b"MJPG");

        let negotiated = match device.set_format(&requested) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "camera: failed to set format on {}: {}",
                    settings.device,
                    err
                );
                device
                    .format()
                    .map_err(|err| unavailable("read format after set failure of", err))?
            }
        };

        let format = PixelFormat::from_fourcc(&negotiated.fourcc.repr).ok_or_else(|| {
            VisionError::device_unavailable(format!(
                "{} offers unsupported pixel format {}",
                settings.device, negotiated.fourcc
            ))
        })?;

        if settings.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(settings.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("camera: failed to set fps on {}: {}", settings.device, err);
            }
        }

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
            },
        }
        .try_build()
        .map_err(|err| unavailable("create buffer stream for", err))?;

        log::info!(
            "camera: opened {} ({}x{} {:?})",
            settings.device,
            negotiated.width,
            negotiated.height,
            format
        );

        Ok(Self {
            active_width: negotiated.width,
            active_height: negotiated.height,
            settings,
            state,
            format,
            frame_count: 0,
        })
    }
}

impl CameraDevice for V4l2Camera {
    fn read_frame(&mut self) -> VisionResult<Frame> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.active_width, self.active_height, self.format);
        let frame = self.state.with_stream_mut(|stream| {
            let (buf, meta) = stream
                .next()
                .map_err(|err| VisionError::capture_failure(format!("dequeue buffer: {}", err)))?;
            let used = (meta.bytesused as usize).min(buf.len());
            if used == 0 {
                return Err(VisionError::capture_failure("device returned an empty buffer"));
            }
            to_frame(&buf[..used], width, height, format)
                .map_err(|err| VisionError::capture_failure(err.to_string()))
        })?;

        self.frame_count += 1;
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!(
            "{} ({}x{} {:?})",
            self.settings.device, self.active_width, self.active_height, self.format
        )
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        log::info!(
            "camera: released {} after {} frame(s)",
            self.settings.device,
            self.frame_count
        );
    }
}
