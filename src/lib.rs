//! facecam
//!
//! Live camera feed with face-rectangle overlays and coarse heuristic
//! attributes (skin tone, hair color, eye color, scene lighting and type)
//! derived from pixel statistics.
//!
//! # Architecture
//!
//! The core is a concurrent camera session plus a frame-analysis pipeline:
//!
//! 1. **Single handle**: at most one open camera handle, owned by the session.
//! 2. **One guard**: handle, active flag and frame counter change only under one mutex.
//! 3. **Pull-based stream**: the encoded-frame stream re-checks liveness on every pull.
//! 4. **Explicit degradation**: unusable regions classify as `Unidentified`,
//!    unusable scenes as `unknown`; detection errors become "no faces".
//!
//! # Module Structure
//!
//! - `analysis`: pure feature extraction (bucket tables, face and scene analysis)
//! - `detect`: face detector trait, rustface backend, stub backend
//! - `camera`: device trait, synthetic `stub://` device, V4L2 device
//! - `session`: camera session manager
//! - `pipeline`: decimated MJPEG stream and one-shot analysis operations
//! - `frame`: frame type and pixel/codec helpers
//! - `storage`, `publish`, `api`, `config`: collaborators around the core

pub mod analysis;
pub mod api;
pub mod camera;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod publish;
pub mod session;
pub mod storage;

pub use analysis::{analyze_face, analyze_scene, analyze_scene_at, classify_face, FaceAnalysis, SceneAnalysis};
pub use camera::{CameraDevice, CaptureSettings, DeviceOpener, SyntheticCamera, SystemOpener};
#[cfg(feature = "camera-v4l2")]
pub use camera::V4l2Camera;
pub use detect::{DetectParams, FaceDetector, SeetaDetector, StubDetector};
pub use error::{VisionError, VisionResult};
pub use frame::{FaceRegion, Frame};
pub use pipeline::{
    multipart_part, AnalysisReport, FaceReport, FrameStream, Pipeline, PipelineConfig, Snapshot,
};
pub use session::CameraSession;
pub use storage::SnapshotStore;
