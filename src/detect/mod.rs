//! Face region detection.
//!
//! - `FaceDetector`: backend trait, grayscale in, rectangles out.
//! - `SeetaDetector`: rustface model backend, loaded from a search path list.
//! - `StubDetector`: fixed regions, for tests and model-less demos.

mod backend;
mod backends;
pub mod model;

pub use backend::{DetectParams, FaceDetector};
pub use backends::{SeetaDetector, StubDetector};
pub use model::{default_search_paths, locate_model, ModelArtifact};
