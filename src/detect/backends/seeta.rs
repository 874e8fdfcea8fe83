use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{mpsc, Mutex};
use std::thread::JoinHandle;

use image::GrayImage;
use rustface::{Detector, ImageData};

use crate::detect::backend::{DetectParams, FaceDetector};
use crate::detect::model::{locate_model, ModelArtifact};
use crate::error::{VisionError, VisionResult};
use crate::frame::FaceRegion;

/// Smallest face size rustface accepts.
const MIN_WINDOW: u32 = 20;

struct DetectJob {
    gray: GrayImage,
    params: DetectParams,
    reply: mpsc::Sender<Vec<FaceRegion>>,
}

/// Frontal-face detector backed by rustface (SeetaFace funnel cascade).
///
/// The rustface detector is stateful (`&mut self`) and is owned by a
/// dedicated worker thread. Callers submit jobs over a channel and block on
/// the reply, so requests are serialized the same way a mutex would.
pub struct SeetaDetector {
    jobs: Mutex<Option<mpsc::Sender<DetectJob>>>,
    worker: Option<JoinHandle<()>>,
    model_path: PathBuf,
}

impl SeetaDetector {
    /// Load the first valid model from `search_paths` and start the worker.
    pub fn load(search_paths: &[PathBuf]) -> VisionResult<Self> {
        let artifact = locate_model(search_paths)?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ModelArtifact) -> VisionResult<Self> {
        let ModelArtifact { path, bytes } = artifact;
        let model = rustface::read_model(Cursor::new(&bytes))
            .map_err(|err| VisionError::model_unavailable(format!("parse: {}", err)))?;
        drop(model);

        let (tx, rx) = mpsc::channel::<DetectJob>();
        let worker = std::thread::Builder::new()
            .name("face-detector".to_string())
            .spawn(move || run_worker(bytes, rx))
            .map_err(|err| VisionError::DetectorFailure(format!("spawn worker: {}", err)))?;

        Ok(Self {
            jobs: Mutex::new(Some(tx)),
            worker: Some(worker),
            model_path: path,
        })
    }

    pub fn model_path(&self) -> &PathBuf {
        &self.model_path
    }
}

impl FaceDetector for SeetaDetector {
    fn name(&self) -> &'static str {
        "seeta"
    }

    fn detect(&self, gray: &GrayImage, params: &DetectParams) -> VisionResult<Vec<FaceRegion>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        {
            let guard = self
                .jobs
                .lock()
                .map_err(|_| VisionError::DetectorFailure("job queue lock poisoned".into()))?;
            let jobs = guard
                .as_ref()
                .ok_or_else(|| VisionError::DetectorFailure("detector shut down".into()))?;
            jobs.send(DetectJob {
                gray: gray.clone(),
                params: *params,
                reply: reply_tx,
            })
            .map_err(|_| VisionError::DetectorFailure("detector worker stopped".into()))?;
        }
        reply_rx
            .recv()
            .map_err(|_| VisionError::DetectorFailure("detector worker dropped request".into()))
    }
}

impl Drop for SeetaDetector {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop.
        if let Ok(mut guard) = self.jobs.lock() {
            guard.take();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("face detector worker panicked");
            }
        }
    }
}

fn run_worker(model_bytes: Vec<u8>, jobs: mpsc::Receiver<DetectJob>) {
    let model = match rustface::read_model(Cursor::new(&model_bytes)) {
        Ok(model) => model,
        Err(err) => {
            log::error!("face detector worker could not parse model: {}", err);
            return;
        }
    };
    let mut detector = rustface::create_detector_with_model(model);
    detector.set_slide_window_step(4, 4);

    while let Ok(job) = jobs.recv() {
        apply_params(detector.as_mut(), &job.params);
        let (width, height) = job.gray.dimensions();
        let regions = if width < MIN_WINDOW || height < MIN_WINDOW {
            Vec::new()
        } else {
            let mut image = ImageData::new(&job.gray, width, height);
            detector
                .detect(&mut image)
                .iter()
                .filter_map(|face| {
                    let bbox = face.bbox();
                    let x = bbox.x().max(0) as u32;
                    let y = bbox.y().max(0) as u32;
                    FaceRegion::new(x, y, bbox.width(), bbox.height()).clipped_to(width, height)
                })
                .collect()
        };
        log::trace!("face detector: {} candidate(s)", regions.len());
        // The caller may have given up; nothing to do then.
        let _ = job.reply.send(regions);
    }
    log::debug!("face detector worker exiting");
}

/// Translate cascade-style parameters into rustface settings.
///
/// rustface shrinks the image by `pyramid_scale_factor` (< 1.0) per level,
/// the inverse of a cascade scale factor. It has no neighbor grouping; the
/// neighbor count maps onto the score threshold instead.
fn apply_params(detector: &mut dyn Detector, params: &DetectParams) {
    detector.set_pyramid_scale_factor(pyramid_scale(params.scale_factor));
    detector.set_score_thresh(score_threshold(params.min_neighbors));
    detector.set_min_face_size(params.min_face_size.max(MIN_WINDOW));
}

fn pyramid_scale(scale_factor: f32) -> f32 {
    if scale_factor.is_finite() && scale_factor > 1.0 {
        (1.0 / scale_factor).clamp(0.1, 0.99)
    } else {
        0.8
    }
}

fn score_threshold(min_neighbors: u32) -> f64 {
    min_neighbors as f64 * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pyramid_scale_is_inverse_of_scale_factor() {
        assert!((pyramid_scale(1.3) - 1.0 / 1.3).abs() < 1e-6);
        assert!((pyramid_scale(1.1) - 1.0 / 1.1).abs() < 1e-6);
        assert_eq!(pyramid_scale(1.0), 0.8);
        assert_eq!(pyramid_scale(f32::NAN), 0.8);
    }

    #[test]
    fn neighbor_count_raises_threshold() {
        assert_eq!(score_threshold(5), 2.5);
        assert_eq!(score_threshold(4), 2.0);
        assert!(score_threshold(5) > score_threshold(4));
    }

    #[test]
    fn load_fails_without_model() {
        let dir = tempfile::tempdir().unwrap();
        let err = SeetaDetector::load(&[dir.path().join("missing.bin")]).err();
        assert!(matches!(err, Some(VisionError::ModelUnavailable(_))));
    }
}
