//! k-nearest-neighbour clock reader over grayscale thumbnail features.

pub mod features;
pub mod model;

use std::path::Path;

use self::{
    features::FeatureExtractor,
    model::{LabeledFeature, ModelArtifact},
};
use crate::{
    config::TrainingConfig,
    error::{DialError, Result},
    pipeline::CancelToken,
    types::{Image, Prediction, TrainingSample},
};

/// Lower bound of the bucket `minute` falls into.
pub fn minute_bucket(minute: u8, width: u8) -> u8 {
    let width = width.max(1);
    (minute / width) * width
}

#[derive(Clone, Copy, Debug)]
pub struct Classifier {
    extractor: FeatureExtractor,
    minute_bucket: u8,
}

impl Classifier {
    pub fn new(feature_size: u32, minute_bucket: u8) -> Self {
        Self {
            extractor: FeatureExtractor::new(feature_size),
            minute_bucket: minute_bucket.max(1),
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(config.feature_size, config.minute_bucket)
    }

    pub fn train(&self, samples: &[TrainingSample]) -> Result<ModelArtifact> {
        self.train_with_progress(samples, &CancelToken::new(), |_, _| {})
    }

    /// Extracts one labelled vector per sample, in sample order.
    pub fn train_with_progress<F>(
        &self,
        samples: &[TrainingSample],
        cancel: &CancelToken,
        mut progress: F,
    ) -> Result<ModelArtifact>
    where
        F: FnMut(usize, usize),
    {
        let mut artifact = ModelArtifact::new(self.extractor.size(), self.minute_bucket);
        artifact.entries.reserve(samples.len());

        for (i, sample) in samples.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DialError::Cancelled);
            }
            let vector = self.extractor.extract(&sample.image)?;
            artifact.entries.push(LabeledFeature {
                vector,
                hour: sample.hour % 12,
                minute_bucket: minute_bucket(sample.minute, self.minute_bucket),
            });
            progress(i + 1, samples.len());
        }

        log::info!(
            "trained model with {} entries ({}x{} features, {}-minute buckets)",
            artifact.len(),
            self.extractor.size(),
            self.extractor.size(),
            self.minute_bucket
        );
        Ok(artifact)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub distance: f32,
    pub hour: u8,
    pub minute_bucket: u8,
}

/// Entries sorted by Euclidean distance to `query`, closest first. Equal
/// distances keep storage order.
pub fn nearest(query: &[f32], model: &ModelArtifact, k: usize) -> Vec<Neighbor> {
    let mut ranked: Vec<(usize, f32)> = model
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| (i, squared_distance(query, &entry.vector)))
        .collect();
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1));

    ranked
        .into_iter()
        .take(k)
        .map(|(index, d2)| {
            let entry = &model.entries[index];
            Neighbor {
                index,
                distance: d2.sqrt(),
                hour: entry.hour,
                minute_bucket: entry.minute_bucket,
            }
        })
        .collect()
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Majority label among `neighbors`; ties go to the label met first.
fn vote(neighbors: &[Neighbor]) -> Option<((u8, u8), usize)> {
    let mut tally: Vec<((u8, u8), usize)> = Vec::new();
    for n in neighbors {
        let label = (n.hour, n.minute_bucket);
        match tally.iter_mut().find(|(l, _)| *l == label) {
            Some((_, votes)) => *votes += 1,
            None => tally.push((label, 1)),
        }
    }

    let mut best: Option<((u8, u8), usize)> = None;
    for (label, votes) in tally {
        if best.is_none_or(|(_, top)| votes > top) {
            best = Some((label, votes));
        }
    }
    best
}

pub fn predict_vector(query: &[f32], model: &ModelArtifact, k: usize) -> Result<Prediction> {
    if model.is_empty() {
        return Err(DialError::PredictionFailed("model has no entries".into()));
    }
    if k == 0 {
        return Err(DialError::PredictionFailed("k must be at least 1".into()));
    }
    if query.len() != model.vector_len() {
        return Err(DialError::PredictionFailed(format!(
            "query has {} features, model expects {}",
            query.len(),
            model.vector_len()
        )));
    }

    // A corpus smaller than k votes with every entry it has, still out of k.
    let neighbors = nearest(query, model, k);
    let ((hour, minute), votes) = vote(&neighbors)
        .ok_or_else(|| DialError::PredictionFailed("no neighbours found".into()))?;

    Ok(Prediction {
        hour,
        minute,
        second: 0,
        confidence: votes as f32 / k as f32,
    })
}

pub fn predict(query: &Image, model: &ModelArtifact, k: usize) -> Result<Prediction> {
    if model.is_empty() {
        return Err(DialError::PredictionFailed("model has no entries".into()));
    }
    let extractor = FeatureExtractor::new(model.feature_size);
    let vector = extractor.extract(query)?;
    let prediction = predict_vector(&vector, model, k)?;
    log::debug!(
        "predicted {}:{:02} with confidence {:.2}",
        prediction.hour,
        prediction.minute,
        prediction.confidence
    );
    Ok(prediction)
}

/// Loads the artifact at `model_path` and classifies `query` against it.
pub fn predict_path(query: &Image, model_path: &Path, k: usize) -> Result<Prediction> {
    let model = ModelArtifact::load(model_path)?;
    predict(query, &model, k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample(shade: u8, hour: u8, minute: u8) -> TrainingSample {
        TrainingSample {
            image: Image::filled(16, 16, [shade, shade, shade, 255]),
            hour,
            minute,
            second: 0,
        }
    }

    fn entry(vector: Vec<f32>, hour: u8, minute_bucket: u8) -> LabeledFeature {
        LabeledFeature {
            vector,
            hour,
            minute_bucket,
        }
    }

    fn tiny_model(entries: Vec<LabeledFeature>) -> ModelArtifact {
        let mut model = ModelArtifact::new(1, 5);
        model.entries = entries;
        model
    }

    #[test]
    fn buckets_use_lower_bound() {
        assert_eq!(minute_bucket(0, 5), 0);
        assert_eq!(minute_bucket(4, 5), 0);
        assert_eq!(minute_bucket(5, 5), 5);
        assert_eq!(minute_bucket(59, 5), 55);
        assert_eq!(minute_bucket(59, 15), 45);
    }

    #[test]
    fn two_label_corpus_predicts_exact_match() {
        let mut samples = Vec::new();
        for _ in 0..10 {
            samples.push(sample(40, 3, 0));
        }
        for _ in 0..10 {
            samples.push(sample(220, 9, 0));
        }
        let classifier = Classifier::new(32, 5);
        let model = classifier.train(&samples).unwrap();
        assert_eq!(model.len(), 20);

        let prediction = predict(&samples[0].image, &model, 5).unwrap();
        assert_eq!(prediction.hour, 3);
        assert_eq!(prediction.minute, 0);
        assert_eq!(prediction.second, 0);
        assert_eq!(prediction.confidence, 1.0);
    }

    #[test]
    fn training_buckets_minutes() {
        let samples = vec![sample(10, 14, 7), sample(10, 2, 59)];
        let model = Classifier::new(4, 5).train(&samples).unwrap();
        assert_eq!(model.entries[0].hour, 2);
        assert_eq!(model.entries[0].minute_bucket, 5);
        assert_eq!(model.entries[1].minute_bucket, 55);
    }

    #[test]
    fn confidence_is_votes_over_k() {
        let model = tiny_model(vec![
            entry(vec![0.0], 1, 0),
            entry(vec![0.1], 1, 0),
            entry(vec![0.2], 2, 0),
            entry(vec![0.3], 1, 0),
            entry(vec![0.4], 2, 0),
            entry(vec![5.0], 7, 30),
        ]);
        let p = predict_vector(&[0.0], &model, 5).unwrap();
        assert_eq!((p.hour, p.minute), (1, 0));
        assert!((p.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn vote_ties_go_to_first_label_in_distance_order() {
        let model = tiny_model(vec![
            entry(vec![0.3], 4, 10),
            entry(vec![0.1], 6, 20),
            entry(vec![0.2], 4, 10),
            entry(vec![0.05], 6, 20),
        ]);
        let p = predict_vector(&[0.0], &model, 4).unwrap();
        assert_eq!((p.hour, p.minute), (6, 20));
        assert!((p.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn equal_distances_keep_storage_order() {
        let model = tiny_model(vec![
            entry(vec![1.0], 8, 0),
            entry(vec![-1.0], 9, 0),
            entry(vec![1.0], 10, 0),
        ]);
        let neighbors = nearest(&[0.0], &model, 3);
        let order: Vec<usize> = neighbors.iter().map(|n| n.index).collect();
        assert_eq!(order, vec![0, 1, 2]);

        let p = predict_vector(&[0.0], &model, 1).unwrap();
        assert_eq!(p.hour, 8);
        assert_eq!(p.confidence, 1.0);
    }

    #[test]
    fn prediction_is_deterministic() {
        let samples: Vec<_> = (0..12u8).map(|h| sample(h * 20, h, h * 5)).collect();
        let model = Classifier::new(8, 5).train(&samples).unwrap();
        let query = Image::filled(16, 16, [95, 95, 95, 255]);
        assert_eq!(
            predict(&query, &model, 3).unwrap(),
            predict(&query, &model, 3).unwrap()
        );
    }

    #[test]
    fn empty_model_fails_prediction() {
        let model = ModelArtifact::new(32, 5);
        let err = predict(&Image::filled(4, 4, [0; 4]), &model, 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PredictionFailed);
    }

    #[test]
    fn small_corpus_still_divides_by_k() {
        let model = tiny_model(vec![entry(vec![0.0], 5, 15), entry(vec![0.1], 5, 15)]);
        let p = predict_vector(&[0.0], &model, 5).unwrap();
        assert_eq!((p.hour, p.minute), (5, 15));
        assert_eq!(p.confidence, 2.0 / 5.0);
    }

    #[test]
    fn missing_model_path_is_not_found() {
        let err = predict_path(
            &Image::filled(4, 4, [0; 4]),
            Path::new("/no/such/dir/model.json"),
            5,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
    }
}
