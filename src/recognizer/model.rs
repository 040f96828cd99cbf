use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::features::FeatureVector;
use crate::error::{DialError, Result};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledFeature {
    pub vector: FeatureVector,
    pub hour: u8,
    /// Lower bound of the minute bucket.
    pub minute_bucket: u8,
}

/// Flat, ordered list of labelled vectors. Built once per training run and
/// read-only afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub feature_size: u32,
    pub minute_bucket: u8,
    pub entries: Vec<LabeledFeature>,
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("malformed model: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported model version {0}")]
    Version(u32),
    #[error("entry {index} has {got} values, expected {expected}")]
    VectorLength {
        index: usize,
        got: usize,
        expected: usize,
    },
}

impl ModelArtifact {
    pub fn new(feature_size: u32, minute_bucket: u8) -> Self {
        Self {
            version: MODEL_FORMAT_VERSION,
            feature_size,
            minute_bucket,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn vector_len(&self) -> usize {
        self.feature_size as usize * self.feature_size as usize
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // Plain data with string keys; serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let artifact: ModelArtifact = serde_json::from_slice(bytes)?;
        if artifact.version != MODEL_FORMAT_VERSION {
            return Err(ArtifactError::Version(artifact.version));
        }
        let expected = artifact.vector_len();
        if let Some((index, entry)) = artifact
            .entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.vector.len() != expected)
        {
            return Err(ArtifactError::VectorLength {
                index,
                got: entry.vector.len(),
                expected,
            });
        }
        Ok(artifact)
    }

    /// Writes next to `path` first and renames over it, so readers see either
    /// the previous model or the complete new one.
    pub fn save(&self, path: &Path) -> Result<()> {
        let persist_err = |source| DialError::ModelPersistFailed {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persist_err)?;
        }
        let tmp = staging_path(path);
        fs::write(&tmp, self.to_bytes()).map_err(persist_err)?;
        if let Err(err) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(persist_err(err));
        }
        log::info!("saved model with {} entries to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let not_found = |reason: String| DialError::ModelNotFound {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = fs::read(path).map_err(|err| not_found(err.to_string()))?;
        let artifact = Self::from_bytes(&bytes).map_err(|err| not_found(err.to_string()))?;
        log::debug!(
            "loaded model with {} entries from {}",
            artifact.len(),
            path.display()
        );
        Ok(artifact)
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;
    use crate::error::ErrorKind;

    fn scratch_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!(
            "dialsense-{tag}-{}-{nanos}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_artifact() -> ModelArtifact {
        let mut artifact = ModelArtifact::new(2, 5);
        artifact.entries.push(LabeledFeature {
            vector: vec![0.1, 0.2, 0.3, 1.0 / 3.0],
            hour: 3,
            minute_bucket: 0,
        });
        artifact.entries.push(LabeledFeature {
            vector: vec![0.0, 1.0, 0.5, 0.123_456_79],
            hour: 11,
            minute_bucket: 55,
        });
        artifact
    }

    #[test]
    fn bytes_round_trip_exactly() {
        let artifact = sample_artifact();
        let bytes = artifact.to_bytes();
        let restored = ModelArtifact::from_bytes(&bytes).unwrap();
        assert_eq!(restored.len(), 2);
        for (a, b) in artifact.entries.iter().zip(&restored.entries) {
            assert_eq!(a.hour, b.hour);
            assert_eq!(a.minute_bucket, b.minute_bucket);
            for (x, y) in a.vector.iter().zip(&b.vector) {
                assert!((x - y).abs() <= 1e-6);
            }
        }
        assert_eq!(restored.to_bytes(), bytes);
    }

    #[test]
    fn wrong_vector_length_is_rejected() {
        let mut artifact = sample_artifact();
        artifact.entries[1].vector.pop();
        let err = ModelArtifact::from_bytes(&artifact.to_bytes()).unwrap_err();
        assert!(matches!(err, ArtifactError::VectorLength { index: 1, .. }));
    }

    #[test]
    fn save_replaces_existing_model() {
        let dir = scratch_dir("save");
        let path = dir.join("model.json");

        let mut first = sample_artifact();
        first.entries.truncate(1);
        first.save(&path).unwrap();
        let second = sample_artifact();
        second.save(&path).unwrap();

        assert_eq!(ModelArtifact::load(&path).unwrap(), second);
        assert!(!staging_path(&path).exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_or_corrupt_model_is_not_found() {
        let dir = scratch_dir("load");
        let path = dir.join("model.json");
        assert_eq!(
            ModelArtifact::load(&path).unwrap_err().kind(),
            ErrorKind::ModelNotFound
        );

        fs::write(&path, b"{ truncated").unwrap();
        assert_eq!(
            ModelArtifact::load(&path).unwrap_err().kind(),
            ErrorKind::ModelNotFound
        );
        let _ = fs::remove_dir_all(dir);
    }
}
