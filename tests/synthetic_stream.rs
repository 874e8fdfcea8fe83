use std::sync::Arc;
use std::thread;

use facecam::{
    frame, CameraSession, CaptureSettings, FaceRegion, Pipeline, PipelineConfig, StubDetector,
    VisionError,
};

fn synthetic_session() -> Arc<CameraSession> {
    Arc::new(CameraSession::new(CaptureSettings {
        device: "stub://bench".to_string(),
        width: 320,
        height: 240,
        target_fps: 0,
    }))
}

#[test]
fn stream_upscales_to_working_resolution() {
    let session = synthetic_session();
    let detector = Arc::new(StubDetector::new(vec![FaceRegion::new(10, 10, 100, 100)]));
    let pipeline = Pipeline::new(session.clone(), detector.clone(), PipelineConfig::default());

    assert!(session.toggle().unwrap());
    let frames: Vec<_> = pipeline.stream().take(3).collect();
    assert_eq!(frames.len(), 3);
    for jpeg in frames {
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = frame::decode_image(&jpeg).unwrap();
        assert_eq!(decoded.dimensions(), (640, 480));
    }
    // Detection runs only on forwarded frames.
    assert_eq!(detector.calls(), 3);
}

#[test]
fn offline_device_never_activates() {
    let session = Arc::new(CameraSession::new(CaptureSettings {
        device: "stub://offline".to_string(),
        ..CaptureSettings::default()
    }));
    for _ in 0..3 {
        assert!(matches!(
            session.toggle(),
            Err(VisionError::DeviceUnavailable(_))
        ));
        assert!(!session.is_active().unwrap());
    }
}

#[test]
fn concurrent_consumers_share_one_session() {
    let session = synthetic_session();
    let pipeline = Pipeline::new(
        session.clone(),
        Arc::new(StubDetector::empty()),
        PipelineConfig::default(),
    );
    session.toggle().unwrap();

    let streamer = {
        let pipeline = pipeline.clone();
        thread::spawn(move || pipeline.stream().take(20).count())
    };
    let analyzer = {
        let pipeline = pipeline.clone();
        thread::spawn(move || {
            (0..10)
                .map(|_| pipeline.analyze_live_frame().unwrap().faces.len())
                .sum::<usize>()
        })
    };
    let snapshots = {
        let pipeline = pipeline.clone();
        thread::spawn(move || {
            (0..10)
                .filter(|_| pipeline.capture_snapshot().is_ok())
                .count()
        })
    };

    assert_eq!(streamer.join().unwrap(), 20);
    assert_eq!(analyzer.join().unwrap(), 0);
    assert_eq!(snapshots.join().unwrap(), 10);
    assert!(session.is_active().unwrap());
    assert!(!session.toggle().unwrap());
}
