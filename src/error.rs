//! Error taxonomy for the camera session and analysis pipeline.

use thiserror::Error;

pub type VisionResult<T> = Result<T, VisionError>;

#[derive(Debug, Error)]
pub enum VisionError {
    /// The camera device could not be opened.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),

    /// An operation needed an active session.
    #[error("camera is not active")]
    NotActive,

    /// The device is open but returned no frame.
    #[error("failed to capture frame: {0}")]
    CaptureFailure(String),

    /// No usable face model was found. Fatal at startup.
    #[error("face model unavailable: {0}")]
    ModelUnavailable(String),

    /// The detector backend could not service a request.
    #[error("face detector failed: {0}")]
    DetectorFailure(String),

    /// Pixel data that cannot be classified.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A thread panicked while holding the session guard.
    #[error("camera session lock poisoned")]
    SessionPoisoned,

    #[error("image encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

impl VisionError {
    pub fn device_unavailable(msg: impl Into<String>) -> Self {
        Self::DeviceUnavailable(msg.into())
    }

    pub fn capture_failure(msg: impl Into<String>) -> Self {
        Self::CaptureFailure(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedInput(msg.into())
    }

    pub fn model_unavailable(msg: impl Into<String>) -> Self {
        Self::ModelUnavailable(msg.into())
    }
}
