use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{DialError, Result};

pub const DEFAULT_SAMPLES_PER_HOUR: u32 = 60;
pub const DEFAULT_OUTPUT_SIZE: (u32, u32) = (224, 224);
pub const DEFAULT_WORKING_MAX_SIDE: u32 = 800;
pub const DEFAULT_INPAINT_MAX_RADIUS: u32 = 64;
pub const DEFAULT_MINUTE_BUCKET: u8 = 5;
pub const DEFAULT_FEATURE_SIZE: u32 = 32;
pub const DEFAULT_K: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    pub brightness_probability: f64,
    pub brightness_range: (f32, f32),
    pub rotation_probability: f64,
    /// Radians either side of zero.
    pub max_rotation: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            brightness_probability: 0.5,
            brightness_range: (0.9, 1.1),
            rotation_probability: 0.5,
            max_rotation: 0.05,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub samples_per_hour: u32,
    pub output_size: (u32, u32),
    pub include_seconds: bool,
    pub augment: bool,
    pub augmentation: AugmentConfig,
    /// Longest side the inpainter and compositor work at.
    pub working_max_side: u32,
    pub inpaint_max_radius: u32,
    pub minute_bucket: u8,
    pub feature_size: u32,
    /// Fixed seed for reproducible corpora; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            samples_per_hour: DEFAULT_SAMPLES_PER_HOUR,
            output_size: DEFAULT_OUTPUT_SIZE,
            include_seconds: true,
            augment: true,
            augmentation: AugmentConfig::default(),
            working_max_side: DEFAULT_WORKING_MAX_SIDE,
            inpaint_max_radius: DEFAULT_INPAINT_MAX_RADIUS,
            minute_bucket: DEFAULT_MINUTE_BUCKET,
            feature_size: DEFAULT_FEATURE_SIZE,
            seed: None,
        }
    }
}

impl TrainingConfig {
    /// Reads a JSON config; absent fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            DialError::InvalidConfig(format!("failed to read {}: {err}", path.display()))
        })?;
        let config: TrainingConfig = serde_json::from_str(&contents).map_err(|err| {
            DialError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples_per_hour == 0 {
            return Err(DialError::InvalidConfig(
                "samples_per_hour must be positive".into(),
            ));
        }
        if self.output_size.0 == 0 || self.output_size.1 == 0 {
            return Err(DialError::InvalidConfig(
                "output_size must be non-zero".into(),
            ));
        }
        if self.working_max_side == 0 || self.feature_size == 0 {
            return Err(DialError::InvalidConfig(
                "working_max_side and feature_size must be non-zero".into(),
            ));
        }
        if self.minute_bucket == 0 || self.minute_bucket > 60 {
            return Err(DialError::InvalidConfig(
                "minute_bucket must be within 1..=60".into(),
            ));
        }
        let (lo, hi) = self.augmentation.brightness_range;
        if !(lo > 0.0 && lo <= hi) {
            return Err(DialError::InvalidConfig(
                "brightness_range must be positive and ordered".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.augmentation.brightness_probability)
            || !(0.0..=1.0).contains(&self.augmentation.rotation_probability)
        {
            return Err(DialError::InvalidConfig(
                "augmentation probabilities must be within 0..=1".into(),
            ));
        }
        if self.augmentation.max_rotation < 0.0 {
            return Err(DialError::InvalidConfig(
                "max_rotation must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn expected_samples(&self) -> usize {
        12 * self.samples_per_hour as usize
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    pub k: usize,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self { k: DEFAULT_K }
    }
}
