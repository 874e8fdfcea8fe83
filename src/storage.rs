//! Snapshot and upload persistence on local disk.
//!
//! Files live flat in one upload directory and are served back under
//! `/static/uploads/<name>`. Names carry a second-resolution timestamp; a
//! second capture within the same second replaces the first.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;

use crate::frame::{self, Frame, WORKING_HEIGHT, WORKING_WIDTH};
use crate::pipeline::Snapshot;

/// URL prefix under which stored images are served.
pub const URL_PREFIX: &str = "/static/uploads";
/// JPEG quality of stored snapshots.
pub const SNAPSHOT_QUALITY: u8 = 95;

const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const LIST_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn snapshot_filename(at: NaiveDateTime) -> String {
    format!("snapshot_{}.jpg", at.format(FILE_TIMESTAMP_FORMAT))
}

pub fn upload_filename(at: NaiveDateTime) -> String {
    format!("upload_{}.jpg", at.format(FILE_TIMESTAMP_FORMAT))
}

pub fn url_for(filename: &str) -> String {
    format!("{}/{}", URL_PREFIX, filename)
}

/// A file written by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredImage {
    pub filename: String,
    pub url: String,
}

/// One entry of the snapshot listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnapshotEntry {
    pub filename: String,
    pub url: String,
    /// Modification time, local, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,
}

pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create upload directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a snapshot resized to the working resolution.
    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<StoredImage> {
        let resized = frame::resize(&snapshot.frame, WORKING_WIDTH, WORKING_HEIGHT)
            .context("resize snapshot")?;
        self.save_frame(&snapshot.filename, &resized)
    }

    /// Encode and write a frame under `filename`.
    pub fn save_frame(&self, filename: &str, image: &Frame) -> Result<StoredImage> {
        let jpeg = frame::encode_jpeg(image, SNAPSHOT_QUALITY).context("encode snapshot")?;
        self.write(filename, &jpeg)
    }

    /// Write uploaded bytes as received.
    pub fn save_upload(&self, bytes: &[u8], at: NaiveDateTime) -> Result<StoredImage> {
        self.write(&upload_filename(at), bytes)
    }

    fn write(&self, filename: &str, bytes: &[u8]) -> Result<StoredImage> {
        let path = self
            .resolve(filename)
            .ok_or_else(|| anyhow!("invalid image file name: {}", filename))?;
        fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        log::info!("stored {} ({} bytes)", path.display(), bytes.len());
        Ok(StoredImage {
            filename: filename.to_string(),
            url: url_for(filename),
        })
    }

    /// Every `*.jpg` in the directory, sorted by name. A missing directory lists as empty.
    pub fn list(&self) -> Result<Vec<SnapshotEntry>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("list {}", self.dir.display()));
            }
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("list {}", self.dir.display()))?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !is_jpeg_name(&filename) {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let modified: DateTime<Local> = meta
                .modified()
                .with_context(|| format!("mtime of {}", filename))?
                .into();
            out.push(SnapshotEntry {
                url: url_for(&filename),
                timestamp: modified.format(LIST_TIMESTAMP_FORMAT).to_string(),
                filename,
            });
        }
        out.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(out)
    }

    /// Read a stored image by bare file name.
    pub fn read(&self, filename: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.resolve(filename) else {
            return Ok(None);
        };
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }

    /// Path for a bare `*.jpg` name; `None` for anything that could escape the directory.
    fn resolve(&self, filename: &str) -> Option<PathBuf> {
        if filename.contains(['/', '\\']) || filename.starts_with('.') || !is_jpeg_name(filename) {
            return None;
        }
        Some(self.dir.join(filename))
    }
}

fn is_jpeg_name(name: &str) -> bool {
    name.len() > ".jpg".len() && name.ends_with(".jpg")
}
