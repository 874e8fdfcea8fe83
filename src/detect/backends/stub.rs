use std::sync::atomic::{AtomicUsize, Ordering};

use image::GrayImage;

use crate::detect::backend::{DetectParams, FaceDetector};
use crate::error::VisionResult;
use crate::frame::FaceRegion;

/// Stub backend for testing. Reports a fixed set of regions on every frame.
pub struct StubDetector {
    regions: Vec<FaceRegion>,
    calls: AtomicUsize,
}

impl StubDetector {
    pub fn new(regions: Vec<FaceRegion>) -> Self {
        Self {
            regions,
            calls: AtomicUsize::new(0),
        }
    }

    /// A detector that never finds a face.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of `detect` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::empty()
    }
}

impl FaceDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&self, gray: &GrayImage, _params: &DetectParams) -> VisionResult<Vec<FaceRegion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = gray.dimensions();
        Ok(self
            .regions
            .iter()
            .filter_map(|region| region.clipped_to(width, height))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_reports_configured_regions_clipped() {
        let detector = StubDetector::new(vec![
            FaceRegion::new(10, 10, 20, 20),
            FaceRegion::new(90, 90, 50, 50),
            FaceRegion::new(200, 200, 5, 5),
        ]);
        let gray = GrayImage::new(100, 100);

        let regions = detector.detect(&gray, &DetectParams::STREAM).unwrap();
        assert_eq!(
            regions,
            vec![FaceRegion::new(10, 10, 20, 20), FaceRegion::new(90, 90, 10, 10)]
        );
        assert_eq!(detector.calls(), 1);
    }
}
