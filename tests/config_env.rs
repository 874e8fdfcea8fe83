use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use facecam::config::FacecamConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FACECAM_CONFIG",
        "FACECAM_API_ADDR",
        "FACECAM_CAMERA_DEVICE",
        "FACECAM_UPLOAD_DIR",
        "FACECAM_MODEL_PATHS",
        "FACECAM_FRAME_SKIP",
        "FACEBOOK_PAGE_ID",
        "FACEBOOK_ACCESS_TOKEN",
        "INSTAGRAM_BUSINESS_ACCOUNT_ID",
        "INSTAGRAM_ACCESS_TOKEN",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "api": { "addr": "0.0.0.0:9000" },
        "camera": {
            "device": "/dev/video2",
            "width": 800,
            "height": 600,
            "target_fps": 10
        },
        "pipeline": { "frame_skip": 3, "jpeg_quality": 80 },
        "model_paths": ["/opt/models/seeta.bin"],
        "upload_dir": "/var/lib/facecam/uploads",
        "social": {
            "facebook_page_id": "page-1",
            "instagram_account_id": "ig-1"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("FACECAM_CONFIG", file.path());
    std::env::set_var("FACECAM_CAMERA_DEVICE", "stub://bench");
    std::env::set_var("FACECAM_MODEL_PATHS", "/a/model.bin, /b/model.bin");
    std::env::set_var("FACECAM_FRAME_SKIP", "4");
    std::env::set_var("INSTAGRAM_ACCESS_TOKEN", "ig-token");

    let cfg = FacecamConfig::load().expect("load config");

    assert_eq!(cfg.api_addr, "0.0.0.0:9000");
    assert_eq!(cfg.camera.device, "stub://bench");
    assert_eq!(cfg.camera.width, 800);
    assert_eq!(cfg.camera.height, 600);
    assert_eq!(cfg.camera.target_fps, 10);
    assert_eq!(cfg.frame_skip, 4);
    assert_eq!(cfg.jpeg_quality, 80);
    assert_eq!(
        cfg.model_paths,
        vec![PathBuf::from("/a/model.bin"), PathBuf::from("/b/model.bin")]
    );
    assert_eq!(cfg.upload_dir, PathBuf::from("/var/lib/facecam/uploads"));
    assert_eq!(cfg.social.facebook_page_id, "page-1");
    assert_eq!(cfg.social.instagram_account_id, "ig-1");
    assert_eq!(cfg.social.instagram_access_token, "ig-token");
    assert!(cfg.social.facebook_access_token.is_empty());

    clear_env();
}

#[test]
fn defaults_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FacecamConfig::load().expect("load defaults");
    assert_eq!(cfg.api_addr, "127.0.0.1:5000");
    assert_eq!(cfg.camera.device, "/dev/video0");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.frame_skip, 2);
    assert_eq!(cfg.jpeg_quality, 70);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FACECAM_FRAME_SKIP", "0");
    assert!(FacecamConfig::load().is_err());

    std::env::set_var("FACECAM_FRAME_SKIP", "every other");
    assert!(FacecamConfig::load().is_err());
    std::env::remove_var("FACECAM_FRAME_SKIP");

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"pipeline":{"jpeg_quality":0}}"#)
        .expect("write config");
    assert!(FacecamConfig::load_from(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    assert!(FacecamConfig::load_from(Some(file.path())).is_err());

    assert!(FacecamConfig::load_from(Some(std::path::Path::new("/nonexistent/facecam.json"))).is_err());

    clear_env();
}
