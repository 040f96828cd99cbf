//! Reads the time off an analog watch face.
//!
//! A single reference photo plus hand masks is turned into a labelled corpus
//! of synthetic clock readings, which then backs a k-nearest-neighbour
//! classifier for new photos of the same watch.

pub mod config;
pub mod error;
pub mod geometry;
pub mod imaging;
pub mod pipeline;
pub mod recognizer;
pub mod types;

pub use config::{AugmentConfig, PredictConfig, TrainingConfig};
pub use error::{DialError, ErrorKind, Result};
pub use pipeline::{
    CancelToken, TrainingHandle, TrainingInputs, TrainingProgress, TrainingReport, run_training,
    start_training,
};
pub use recognizer::{
    Classifier, predict, predict_path,
    model::{LabeledFeature, ModelArtifact},
};
pub use types::{Image, Mask, PivotPoint, Prediction, ReferenceTime, TrainingSample};
