use std::path::PathBuf;

use thiserror::Error;

/// Stable classification of a [`DialError`] so callers can branch without
/// matching on message text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingInputData,
    InpaintingFailed,
    NoTrainingSamplesGenerated,
    ModelNotFound,
    FeatureExtractionFailed,
    PredictionFailed,
    ModelPersistFailed,
    Cancelled,
    InvalidConfig,
}

impl ErrorKind {
    /// Whether the failure only affects a single prediction call and leaves the
    /// stored model usable.
    pub fn is_inference_scoped(&self) -> bool {
        matches!(
            self,
            ErrorKind::ModelNotFound
                | ErrorKind::FeatureExtractionFailed
                | ErrorKind::PredictionFailed
        )
    }
}

#[derive(Debug, Error)]
pub enum DialError {
    #[error("missing input data: {0}")]
    MissingInputData(String),

    #[error("inpainting failed: {0}")]
    InpaintingFailed(String),

    #[error("no training samples were generated")]
    NoTrainingSamplesGenerated,

    #[error("model not found at {path}: {reason}")]
    ModelNotFound { path: PathBuf, reason: String },

    #[error("feature extraction failed: {0}")]
    FeatureExtractionFailed(String),

    #[error("prediction failed: {0}")]
    PredictionFailed(String),

    #[error("failed to persist model to {path}")]
    ModelPersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("training was cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DialError::MissingInputData(_) => ErrorKind::MissingInputData,
            DialError::InpaintingFailed(_) => ErrorKind::InpaintingFailed,
            DialError::NoTrainingSamplesGenerated => ErrorKind::NoTrainingSamplesGenerated,
            DialError::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            DialError::FeatureExtractionFailed(_) => ErrorKind::FeatureExtractionFailed,
            DialError::PredictionFailed(_) => ErrorKind::PredictionFailed,
            DialError::ModelPersistFailed { .. } => ErrorKind::ModelPersistFailed,
            DialError::Cancelled => ErrorKind::Cancelled,
            DialError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

pub type Result<T, E = DialError> = std::result::Result<T, E>;
