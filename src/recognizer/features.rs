use crate::{
    error::{DialError, Result},
    imaging,
    types::{Image, luminance},
};

pub type FeatureVector = Vec<f32>;

/// Grayscale thumbnail features. Training and inference must go through the
/// same extractor so their vectors are comparable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureExtractor {
    size: u32,
}

impl FeatureExtractor {
    pub fn new(size: u32) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn len(&self) -> usize {
        self.size as usize * self.size as usize
    }

    /// Resize to `size`x`size`, take luminance per pixel, flatten row-major.
    pub fn extract(&self, image: &Image) -> Result<FeatureVector> {
        let thumb = imaging::resize(image, self.size, self.size)
            .map_err(|err| DialError::FeatureExtractionFailed(err.to_string()))?;
        Ok(thumb.rgba.chunks_exact(4).map(luminance).collect())
    }

    pub fn extract_encoded(&self, bytes: &[u8]) -> Result<FeatureVector> {
        let image = imaging::decode(bytes)
            .map_err(|err| DialError::FeatureExtractionFailed(err.to_string()))?;
        self.extract(&image)
    }
}
