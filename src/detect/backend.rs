use image::GrayImage;

use crate::error::VisionResult;
use crate::frame::FaceRegion;

/// Detection parameters passed with every request.
///
/// `scale_factor` is the ratio between successive pyramid levels (> 1.0).
/// `min_neighbors` is the strictness of the detector: higher values keep
/// fewer, more certain candidates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectParams {
    pub scale_factor: f32,
    pub min_neighbors: u32,
    /// Smallest face edge, in pixels, the detector will report.
    pub min_face_size: u32,
}

impl DetectParams {
    /// Parameters used by the live stream and live analysis.
    pub const STREAM: DetectParams = DetectParams {
        scale_factor: 1.3,
        min_neighbors: 5,
        min_face_size: 20,
    };

    /// Parameters used for uploaded stills.
    pub const UPLOAD: DetectParams = DetectParams {
        scale_factor: 1.1,
        min_neighbors: 4,
        min_face_size: 20,
    };
}

impl Default for DetectParams {
    fn default() -> Self {
        Self::STREAM
    }
}

/// Face detector trait.
///
/// Input is a single-channel grayscale image; output is zero or more
/// rectangles in that image's coordinates. Order is backend-defined and
/// overlapping candidates are only merged as far as the backend does it.
///
/// Implementations must treat the image as read-only and must not retain it
/// beyond the call.
pub trait FaceDetector: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn detect(&self, gray: &GrayImage, params: &DetectParams) -> VisionResult<Vec<FaceRegion>>;
}
