use rand::Rng;

use super::{
    CancelToken,
    augment::augment,
    compositor::{self, HandLayer},
    inpaint::{self, DialPlate},
};
use crate::{
    config::{AugmentConfig, TrainingConfig},
    error::{DialError, Result},
    geometry::HandRotations,
    imaging,
    types::{Image, Mask, PivotPoint, ReferenceTime, TrainingSample},
};

/// Grid and rendering parameters for one corpus run.
#[derive(Clone, Debug)]
pub struct CorpusSpec {
    pub pivot: PivotPoint,
    pub reference_time: ReferenceTime,
    pub samples_per_hour: u32,
    pub output_size: (u32, u32),
    pub include_seconds: bool,
    pub augmentation: Option<AugmentConfig>,
}

impl CorpusSpec {
    pub fn from_config(
        pivot: PivotPoint,
        reference_time: ReferenceTime,
        config: &TrainingConfig,
    ) -> Self {
        Self {
            pivot,
            reference_time,
            samples_per_hour: config.samples_per_hour,
            output_size: config.output_size,
            include_seconds: config.include_seconds,
            augmentation: config.augment.then(|| config.augmentation.clone()),
        }
    }

    pub fn total(&self) -> usize {
        12 * self.samples_per_hour as usize
    }

    /// Minute for the `index`-th sample of an hour: uniform in time, integer
    /// division, no jitter.
    pub fn minute_for(&self, index: u32) -> u8 {
        ((index as u64 * 60) / self.samples_per_hour.max(1) as u64).min(59) as u8
    }
}

#[derive(Clone, Debug, Default)]
pub struct Corpus {
    pub samples: Vec<TrainingSample>,
    /// Samples that failed to composite or resize and were skipped.
    pub dropped: usize,
}

/// Inpaints the reference photo and renders the full grid of clock readings
/// against the resulting plate. Grid, output size and augmentation all come
/// from `config`.
#[allow(clippy::too_many_arguments)]
pub fn generate<R: Rng + ?Sized>(
    dial: &Image,
    hour_mask: &Mask,
    minute_mask: &Mask,
    second_mask: Option<&Mask>,
    pivot: PivotPoint,
    reference_time: ReferenceTime,
    config: &TrainingConfig,
    rng: &mut R,
    cancel: &CancelToken,
) -> Result<Vec<TrainingSample>> {
    config.validate()?;
    let spec = CorpusSpec::from_config(pivot, reference_time, config);
    let plate = inpaint::inpaint(
        dial,
        hour_mask,
        minute_mask,
        second_mask,
        config.working_max_side,
        config.inpaint_max_radius,
    )?;
    let corpus = generate_from_plate(&plate, &spec, rng, cancel, |_, _| {})?;
    if corpus.samples.is_empty() {
        return Err(DialError::NoTrainingSamplesGenerated);
    }
    Ok(corpus.samples)
}

/// Renders every (hour, minute, second) of the grid onto an existing plate.
/// `progress` receives (done, total) after each attempted sample.
pub fn generate_from_plate<R, F>(
    plate: &DialPlate,
    spec: &CorpusSpec,
    rng: &mut R,
    cancel: &CancelToken,
    mut progress: F,
) -> Result<Corpus>
where
    R: Rng + ?Sized,
    F: FnMut(usize, usize),
{
    let hour_layer = layer(plate, &plate.hour_mask, "hour")?;
    let minute_layer = layer(plate, &plate.minute_mask, "minute")?;
    let second_layer = plate
        .second_mask
        .as_ref()
        .map(|mask| layer(plate, mask, "second"))
        .transpose()?;

    let total = spec.total();
    let mut corpus = Corpus {
        samples: Vec::with_capacity(total),
        dropped: 0,
    };

    let mut done = 0;
    for hour in 0..12u8 {
        for index in 0..spec.samples_per_hour {
            if cancel.is_cancelled() {
                return Err(DialError::Cancelled);
            }

            let minute = spec.minute_for(index);
            let second = if spec.include_seconds {
                rng.gen_range(0..60u8)
            } else {
                0
            };

            let rotations = HandRotations::between(&spec.reference_time, hour, minute, second);
            let rendered = compositor::composite(
                &plate.plate,
                &hour_layer,
                &minute_layer,
                second_layer.as_ref(),
                spec.pivot,
                rotations,
            )
            .map_err(|err| err.to_string())
            .and_then(|image| {
                let image = match &spec.augmentation {
                    Some(config) => augment(&image, config, rng),
                    None => image,
                };
                imaging::resize(&image, spec.output_size.0, spec.output_size.1)
                    .map_err(|err| err.to_string())
            });

            match rendered {
                Ok(image) => corpus.samples.push(TrainingSample {
                    image,
                    hour,
                    minute,
                    second,
                }),
                Err(err) => {
                    log::debug!("dropping sample {hour}:{minute:02}:{second:02}: {err}");
                    corpus.dropped += 1;
                }
            }

            done += 1;
            progress(done, total);
        }
    }

    if corpus.dropped > 0 {
        log::warn!(
            "corpus generation dropped {} of {} samples",
            corpus.dropped,
            total
        );
    }
    Ok(corpus)
}

fn layer(plate: &DialPlate, mask: &Mask, what: &str) -> Result<HandLayer> {
    HandLayer::cutout(&plate.reference, mask).ok_or_else(|| {
        DialError::InpaintingFailed(format!(
            "{what} mask does not match the working reference size"
        ))
    })
}
