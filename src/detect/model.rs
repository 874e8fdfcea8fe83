//! Trained-model discovery.
//!
//! The detector cannot run without a model, so a missing model is a startup
//! failure rather than a per-request one.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::error::{VisionError, VisionResult};

/// File name of the SeetaFace frontal model shipped with rustface.
pub const MODEL_FILE_NAME: &str = "seeta_fd_frontal_v1.0.bin";

/// Default locations searched for the frontal-face model, in order.
pub fn default_search_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/local/share/rustface").join(MODEL_FILE_NAME),
        PathBuf::from("/usr/share/rustface").join(MODEL_FILE_NAME),
        PathBuf::from("model").join(MODEL_FILE_NAME),
    ]
}

/// A model artifact that parsed successfully.
#[derive(Clone, Debug)]
pub struct ModelArtifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Return the first search path holding a parseable model.
///
/// Paths that do not exist are skipped silently; paths that exist but do
/// not parse are skipped with a warning.
pub fn locate_model(search_paths: &[PathBuf]) -> VisionResult<ModelArtifact> {
    for path in search_paths {
        if !path.is_file() {
            log::debug!("face model not found at {}", path.display());
            continue;
        }
        match read_artifact(path) {
            Ok(artifact) => {
                log::info!("face model loaded from {}", path.display());
                return Ok(artifact);
            }
            Err(err) => {
                log::warn!("face model at {} rejected: {}", path.display(), err);
            }
        }
    }

    let searched = search_paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(VisionError::model_unavailable(format!(
        "no valid face model found (searched: [{}])",
        searched
    )))
}

fn read_artifact(path: &Path) -> VisionResult<ModelArtifact> {
    let bytes = std::fs::read(path)
        .map_err(|err| VisionError::model_unavailable(format!("read: {}", err)))?;
    if bytes.is_empty() {
        return Err(VisionError::model_unavailable("model file is empty"));
    }
    rustface::read_model(Cursor::new(&bytes))
        .map_err(|err| VisionError::model_unavailable(format!("parse: {}", err)))?;
    Ok(ModelArtifact {
        path: path.to_path_buf(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_search_list_is_fatal() {
        let err = locate_model(&[]).unwrap_err();
        assert!(matches!(err, VisionError::ModelUnavailable(_)));
    }

    #[test]
    fn missing_paths_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![dir.path().join("a.bin"), dir.path().join("b.bin")];
        let err = locate_model(&paths).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("a.bin"));
        assert!(msg.contains("b.bin"));
    }

    #[test]
    fn empty_model_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MODEL_FILE_NAME);
        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            locate_model(&[path]),
            Err(VisionError::ModelUnavailable(_))
        ));
    }
}
