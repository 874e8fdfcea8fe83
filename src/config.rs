use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::camera::{CaptureSettings, DEFAULT_DEVICE, DEFAULT_TARGET_FPS};
use crate::detect::default_search_paths;
use crate::frame::{WORKING_HEIGHT, WORKING_WIDTH};
use crate::pipeline::{PipelineConfig, DEFAULT_FRAME_SKIP, DEFAULT_JPEG_QUALITY};
use crate::publish::SocialCredentials;

const DEFAULT_API_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_UPLOAD_DIR: &str = "static/uploads";

#[derive(Debug, Deserialize, Default)]
struct FacecamConfigFile {
    api: Option<ApiConfigFile>,
    camera: Option<CameraConfigFile>,
    pipeline: Option<PipelineConfigFile>,
    model_paths: Option<Vec<PathBuf>>,
    upload_dir: Option<PathBuf>,
    social: Option<SocialCredentials>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    frame_skip: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct FacecamConfig {
    pub api_addr: String,
    pub camera: CaptureSettings,
    pub frame_skip: u64,
    pub jpeg_quality: u8,
    /// Searched in order for the face model.
    pub model_paths: Vec<PathBuf>,
    pub upload_dir: PathBuf,
    pub social: SocialCredentials,
}

impl Default for FacecamConfig {
    fn default() -> Self {
        Self::from_file(FacecamConfigFile::default())
    }
}

impl FacecamConfig {
    /// File named by `FACECAM_CONFIG` (optional), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = non_empty_var("FACECAM_CONFIG").map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Same as `load`, with the config file given explicitly.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FacecamConfigFile) -> Self {
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
        let camera_file = file.camera.unwrap_or_default();
        let camera = CaptureSettings {
            device: camera_file
                .device
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            width: camera_file.width.unwrap_or(WORKING_WIDTH),
            height: camera_file.height.unwrap_or(WORKING_HEIGHT),
            target_fps: camera_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
        };
        let pipeline = file.pipeline.unwrap_or_default();
        Self {
            api_addr,
            camera,
            frame_skip: pipeline.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
            jpeg_quality: pipeline.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            model_paths: file.model_paths.unwrap_or_else(default_search_paths),
            upload_dir: file
                .upload_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            social: file.social.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_var("FACECAM_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(device) = non_empty_var("FACECAM_CAMERA_DEVICE") {
            self.camera.device = device;
        }
        if let Some(dir) = non_empty_var("FACECAM_UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(paths) = non_empty_var("FACECAM_MODEL_PATHS") {
            let parsed = split_csv(&paths);
            if !parsed.is_empty() {
                self.model_paths = parsed.into_iter().map(PathBuf::from).collect();
            }
        }
        if let Some(skip) = non_empty_var("FACECAM_FRAME_SKIP") {
            self.frame_skip = skip
                .trim()
                .parse()
                .map_err(|_| anyhow!("FACECAM_FRAME_SKIP must be a positive integer"))?;
        }
        if let Some(page) = non_empty_var("FACEBOOK_PAGE_ID") {
            self.social.facebook_page_id = page;
        }
        if let Some(token) = non_empty_var("FACEBOOK_ACCESS_TOKEN") {
            self.social.facebook_access_token = token;
        }
        if let Some(account) = non_empty_var("INSTAGRAM_BUSINESS_ACCOUNT_ID") {
            self.social.instagram_account_id = account;
        }
        if let Some(token) = non_empty_var("INSTAGRAM_ACCESS_TOKEN") {
            self.social.instagram_access_token = token;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_skip == 0 {
            return Err(anyhow!("frame_skip must be at least 1"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.api_addr.trim().is_empty() {
            return Err(anyhow!("api addr must not be empty"));
        }
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            frame_skip: self.frame_skip,
            jpeg_quality: self.jpeg_quality,
            ..PipelineConfig::default()
        }
    }
}

fn read_config_file(path: &Path) -> Result<FacecamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_daemon() {
        let cfg = FacecamConfig::default();
        assert_eq!(cfg.api_addr, "127.0.0.1:5000");
        assert_eq!(cfg.camera, CaptureSettings::default());
        assert_eq!(cfg.frame_skip, 2);
        assert_eq!(cfg.jpeg_quality, 70);
        assert_eq!(cfg.upload_dir, PathBuf::from("static/uploads"));
        assert_eq!(cfg.model_paths, default_search_paths());
        cfg.validate().unwrap();
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = FacecamConfig::default();
        cfg.frame_skip = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = FacecamConfig::default();
        cfg.jpeg_quality = 0;
        assert!(cfg.validate().is_err());
        cfg.jpeg_quality = 101;
        assert!(cfg.validate().is_err());

        let mut cfg = FacecamConfig::default();
        cfg.camera.height = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn csv_split_drops_blanks() {
        assert_eq!(split_csv(" a.bin, ,b.bin,"), vec!["a.bin", "b.bin"]);
    }

    #[test]
    fn pipeline_config_carries_overrides() {
        let mut cfg = FacecamConfig::default();
        cfg.frame_skip = 3;
        cfg.jpeg_quality = 85;
        let pipeline = cfg.pipeline();
        assert_eq!(pipeline.frame_skip, 3);
        assert_eq!(pipeline.jpeg_quality, 85);
        assert_eq!(pipeline.upload_params, crate::detect::DetectParams::UPLOAD);
    }
}
