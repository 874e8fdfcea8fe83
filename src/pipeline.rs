//! Frame pipeline.
//!
//! Pulls frames from the camera session, decimates them, detects faces,
//! draws overlays and encodes JPEG. Also hosts the one-shot operations
//! (snapshot, live analysis, still-image analysis).
//!
//! The session guard is held only while a frame is read and the frame
//! counter advanced. Resize, detection and encoding run outside it, so a
//! toggle or snapshot request waits for at most one device read.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::analysis::{self, FaceAnalysis, SceneAnalysis};
use crate::detect::{DetectParams, FaceDetector};
use crate::error::{VisionError, VisionResult};
use crate::frame::{self, FaceRegion, Frame, OVERLAY_COLOR, OVERLAY_STROKE};
use crate::session::CameraSession;
use crate::storage;

pub const DEFAULT_FRAME_SKIP: u64 = 2;
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

const MULTIPART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const MULTIPART_TRAILER: &[u8] = b"\r\n";

/// Boundary used by `multipart_part`; the HTTP content type must match.
pub const MULTIPART_BOUNDARY: &str = "frame";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Forward one frame in every `frame_skip`.
    pub frame_skip: u64,
    pub jpeg_quality: u8,
    /// Detection for the live stream, live analysis and still images.
    pub stream_params: DetectParams,
    /// Detection for uploaded stills (single face).
    pub upload_params: DetectParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_skip: DEFAULT_FRAME_SKIP,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            stream_params: DetectParams::STREAM,
            upload_params: DetectParams::UPLOAD,
        }
    }
}

/// One detected face with its classification.
#[derive(Clone, Debug, Serialize)]
pub struct FaceReport {
    pub location: FaceRegion,
    pub details: FaceAnalysis,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnalysisReport {
    pub faces: Vec<FaceReport>,
    pub background: SceneAnalysis,
}

impl AnalysisReport {
    /// No faces, with a placeholder background carrying `reason`.
    pub fn unavailable(reason: &str, at: NaiveDateTime) -> Self {
        Self {
            faces: Vec::new(),
            background: SceneAnalysis::unavailable(reason, at),
        }
    }
}

/// A captured frame ready to be stored.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub frame: Frame,
    pub analysis: SceneAnalysis,
    /// Suggested file name, `snapshot_<YYYYmmdd_HHMMSS>.jpg`.
    pub filename: String,
}

/// Frame the encoded JPEG as one part of a `multipart/x-mixed-replace` body.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(MULTIPART_HEADER.len() + jpeg.len() + MULTIPART_TRAILER.len());
    part.extend_from_slice(MULTIPART_HEADER);
    part.extend_from_slice(jpeg);
    part.extend_from_slice(MULTIPART_TRAILER);
    part
}

#[derive(Clone)]
pub struct Pipeline {
    session: Arc<CameraSession>,
    detector: Arc<dyn FaceDetector>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        session: Arc<CameraSession>,
        detector: Arc<dyn FaceDetector>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            session,
            detector,
            config,
        }
    }

    pub fn session(&self) -> &Arc<CameraSession> {
        &self.session
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a stream of encoded frames. It ends once the session goes
    /// inactive or the device stops delivering.
    pub fn stream(&self) -> FrameStream {
        FrameStream {
            pipeline: self.clone(),
            finished: false,
        }
    }

    /// Read one frame for a snapshot. Scene analysis runs on the raw frame.
    pub fn capture_snapshot(&self) -> VisionResult<Snapshot> {
        let frame = self.session.read()?;
        let at = analysis::now();
        let analysis = analysis::analyze_scene_at(&frame, at);
        log::info!("snapshot captured ({}x{})", frame.width(), frame.height());
        Ok(Snapshot {
            frame,
            analysis,
            filename: storage::snapshot_filename(at),
        })
    }

    /// Detect and classify every face in the current camera frame.
    pub fn analyze_live_frame(&self) -> VisionResult<AnalysisReport> {
        let frame = self.session.read()?;
        Ok(self.analyze_with(&frame, &self.config.stream_params, usize::MAX))
    }

    /// Detect and classify every face in a still image. Session state is not consulted.
    pub fn analyze_image(&self, image: &Frame) -> AnalysisReport {
        self.analyze_with(image, &self.config.stream_params, usize::MAX)
    }

    pub fn analyze_image_bytes(&self, bytes: &[u8]) -> VisionResult<AnalysisReport> {
        let image = frame::decode_image(bytes)?;
        Ok(self.analyze_image(&image))
    }

    /// Upload profile: finer detection, only the first face classified.
    pub fn analyze_upload(&self, image: &Frame) -> AnalysisReport {
        self.analyze_with(image, &self.config.upload_params, 1)
    }

    pub fn analyze_upload_bytes(&self, bytes: &[u8]) -> VisionResult<AnalysisReport> {
        let image = frame::decode_image(bytes)?;
        Ok(self.analyze_upload(&image))
    }

    fn analyze_with(&self, image: &Frame, params: &DetectParams, max_faces: usize) -> AnalysisReport {
        let faces = self
            .detect(image, params)
            .into_iter()
            .take(max_faces)
            .map(|location| {
                let details = match location.crop(image) {
                    Ok(region) => analysis::analyze_face(&region),
                    Err(err) => {
                        log::warn!("face crop failed: {}", err);
                        FaceAnalysis::Unidentified
                    }
                };
                FaceReport { location, details }
            })
            .collect();
        AnalysisReport {
            faces,
            background: analysis::analyze_scene(image),
        }
    }

    /// Detection failures degrade to "no faces".
    fn detect(&self, image: &Frame, params: &DetectParams) -> Vec<FaceRegion> {
        let gray = frame::to_gray(image);
        match self.detector.detect(&gray, params) {
            Ok(regions) => regions,
            Err(err) => {
                log::warn!("face detection failed ({}): {}", self.detector.name(), err);
                Vec::new()
            }
        }
    }

    /// Read under the guard and advance the counter. `None` for a discarded frame.
    fn next_forwarded_frame(&self) -> VisionResult<Option<Frame>> {
        let mut state = self.session.lock()?;
        if !state.is_active() {
            return Err(VisionError::NotActive);
        }
        let frame = state.read()?;
        if state.advance_counter(self.config.frame_skip) {
            Ok(Some(frame))
        } else {
            Ok(None)
        }
    }

    /// Resize, detect, overlay and encode one forwarded frame.
    fn render(&self, captured: &Frame) -> VisionResult<Vec<u8>> {
        let mut working = frame::resize(captured, frame::WORKING_WIDTH, frame::WORKING_HEIGHT)?;
        let regions = self.detect(&working, &self.config.stream_params);
        log::trace!("stream frame: {} face(s)", regions.len());
        frame::draw_regions(&mut working, &regions, OVERLAY_COLOR, OVERLAY_STROKE);
        frame::encode_jpeg(&working, self.config.jpeg_quality)
    }
}

/// Lazy, non-restartable sequence of JPEG-encoded frames.
///
/// Liveness is re-checked on every pull; dropping the stream cancels it.
pub struct FrameStream {
    pipeline: Pipeline,
    finished: bool,
}

impl Iterator for FrameStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.finished {
            return None;
        }
        loop {
            let captured = match self.pipeline.next_forwarded_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(err) => {
                    log::debug!("frame stream ended: {}", err);
                    self.finished = true;
                    return None;
                }
            };
            match self.pipeline.render(&captured) {
                Ok(jpeg) => return Some(jpeg),
                Err(err) => {
                    log::warn!("frame stream ended: {}", err);
                    self.finished = true;
                    return None;
                }
            }
        }
    }
}
