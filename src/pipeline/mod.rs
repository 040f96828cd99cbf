//! Training pipeline: inpaint, render the corpus, extract features, persist.
//!
//! Each stage reads its input and hands a new buffer to the next, so nothing
//! is shared between threads except the cancellation flag and the progress
//! channel.

pub mod augment;
pub mod compositor;
pub mod corpus;
pub mod inpaint;

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use crossbeam_channel::{Receiver, Sender};
use rand::{SeedableRng, rngs::StdRng};

use self::corpus::CorpusSpec;
use crate::{
    config::TrainingConfig,
    error::{DialError, Result},
    imaging::{self, ImagingError},
    recognizer::Classifier,
    types::{Image, Mask, PivotPoint, ReferenceTime},
};

/// Cooperative cancellation flag, checked between samples and stages.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainingProgress {
    /// Monotonically non-decreasing, within 0..=1.
    pub fraction: f32,
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingReport {
    pub samples: usize,
    pub dropped: usize,
    pub entries: usize,
    pub model_path: PathBuf,
}

/// Everything the setup flow collects before training.
#[derive(Clone, Debug)]
pub struct TrainingInputs {
    pub reference: Image,
    pub hour_mask: Mask,
    pub minute_mask: Mask,
    pub second_mask: Option<Mask>,
    pub pivot: PivotPoint,
    pub reference_time: ReferenceTime,
}

impl TrainingInputs {
    pub fn load(
        reference: &Path,
        hour_mask: &Path,
        minute_mask: &Path,
        second_mask: Option<&Path>,
        pivot: PivotPoint,
        reference_time: ReferenceTime,
    ) -> Result<Self> {
        let reference = open_asset(reference, "reference photo")?;
        let hour_mask = Mask::from_image(&open_asset(hour_mask, "hour mask")?);
        let minute_mask = Mask::from_image(&open_asset(minute_mask, "minute mask")?);
        let second_mask = second_mask
            .map(|path| open_asset(path, "second mask").map(|img| Mask::from_image(&img)))
            .transpose()?;

        Ok(Self {
            reference,
            hour_mask,
            minute_mask,
            second_mask,
            pivot,
            reference_time,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.reference.is_empty() {
            return Err(DialError::MissingInputData("reference photo is empty".into()));
        }
        let masks = [
            ("hour mask", Some(&self.hour_mask)),
            ("minute mask", Some(&self.minute_mask)),
            ("second mask", self.second_mask.as_ref()),
        ];
        for (name, mask) in masks {
            if let Some(mask) = mask {
                if mask.width == 0 || mask.height == 0 {
                    return Err(DialError::MissingInputData(format!("{name} is empty")));
                }
            }
        }
        Ok(())
    }
}

fn open_asset(path: &Path, what: &str) -> Result<Image> {
    if !path.exists() {
        return Err(DialError::MissingInputData(format!(
            "{what} not found at {}",
            path.display()
        )));
    }
    imaging::open(path).map_err(|err| match err {
        ImagingError::Empty => {
            DialError::MissingInputData(format!("{what} at {} is empty", path.display()))
        }
        other => DialError::InpaintingFailed(format!(
            "could not decode {what} at {}: {other}",
            path.display()
        )),
    })
}

// Share of the progress bar each stage owns.
const INPAINT_END: f32 = 0.10;
const CORPUS_END: f32 = 0.70;
const FEATURES_END: f32 = 0.95;

struct ProgressReporter<F: FnMut(TrainingProgress)> {
    sink: F,
    last: f32,
}

impl<F: FnMut(TrainingProgress)> ProgressReporter<F> {
    fn new(sink: F) -> Self {
        Self { sink, last: 0.0 }
    }

    fn report(&mut self, fraction: f32, status: impl Into<String>) {
        let fraction = fraction.clamp(0.0, 1.0).max(self.last);
        self.last = fraction;
        (self.sink)(TrainingProgress {
            fraction,
            status: status.into(),
        });
    }

    fn span(&mut self, start: f32, end: f32, done: usize, total: usize, status: &str) {
        let t = if total == 0 {
            1.0
        } else {
            done as f32 / total as f32
        };
        self.report(start + (end - start) * t, format!("{status} ({done}/{total})"));
    }
}

/// Runs the whole training pipeline on the calling thread and atomically
/// replaces the model at `model_path` on success.
pub fn run_training<F>(
    inputs: &TrainingInputs,
    config: &TrainingConfig,
    model_path: &Path,
    cancel: &CancelToken,
    progress: F,
) -> Result<TrainingReport>
where
    F: FnMut(TrainingProgress),
{
    config.validate()?;
    inputs.validate()?;
    let mut progress = ProgressReporter::new(progress);

    progress.report(0.0, "Removing hands from the dial");
    let plate = inpaint::inpaint(
        &inputs.reference,
        &inputs.hour_mask,
        &inputs.minute_mask,
        inputs.second_mask.as_ref(),
        config.working_max_side,
        config.inpaint_max_radius,
    )?;
    if plate.unfilled > 0 {
        log::warn!(
            "{} masked pixels had no unmasked neighbour within {} px",
            plate.unfilled,
            config.inpaint_max_radius
        );
    }
    progress.report(INPAINT_END, "Dial plate ready");
    if cancel.is_cancelled() {
        return Err(DialError::Cancelled);
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let spec = CorpusSpec::from_config(inputs.pivot, inputs.reference_time, config);
    let corpus = corpus::generate_from_plate(&plate, &spec, &mut rng, cancel, |done, total| {
        progress.span(INPAINT_END, CORPUS_END, done, total, "Generating samples")
    })?;
    drop(plate);

    if corpus.samples.is_empty() {
        return Err(DialError::NoTrainingSamplesGenerated);
    }
    log::info!(
        "generated {} training samples ({} dropped)",
        corpus.samples.len(),
        corpus.dropped
    );

    let classifier = Classifier::from_config(config);
    let model = classifier.train_with_progress(&corpus.samples, cancel, |done, total| {
        progress.span(CORPUS_END, FEATURES_END, done, total, "Extracting features")
    })?;
    let (samples, dropped) = (corpus.samples.len(), corpus.dropped);
    drop(corpus);

    if cancel.is_cancelled() {
        return Err(DialError::Cancelled);
    }
    progress.report(FEATURES_END, "Saving model");
    model.save(model_path)?;
    progress.report(1.0, "Training complete");

    Ok(TrainingReport {
        samples,
        dropped,
        entries: model.len(),
        model_path: model_path.to_path_buf(),
    })
}

/// Background training job. Dropping the handle cancels the job and waits for
/// the worker to stop.
#[derive(Debug)]
pub struct TrainingHandle {
    cancel: CancelToken,
    events: Receiver<TrainingProgress>,
    handle: Option<thread::JoinHandle<Result<TrainingReport>>>,
}

impl TrainingHandle {
    pub fn events(&self) -> &Receiver<TrainingProgress> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    pub fn join(mut self) -> Result<TrainingReport> {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("training worker panicked");
                Err(DialError::Cancelled)
            }),
            None => Err(DialError::Cancelled),
        }
    }
}

impl Drop for TrainingHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.cancel.cancel();
            let _ = handle.join();
        }
    }
}

pub fn start_training(
    inputs: TrainingInputs,
    config: TrainingConfig,
    model_path: PathBuf,
) -> TrainingHandle {
    let (tx, rx) = crossbeam_channel::unbounded();
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();

    let handle =
        thread::spawn(move || training_worker(inputs, config, model_path, worker_cancel, tx));

    TrainingHandle {
        cancel,
        events: rx,
        handle: Some(handle),
    }
}

fn training_worker(
    inputs: TrainingInputs,
    config: TrainingConfig,
    model_path: PathBuf,
    cancel: CancelToken,
    tx: Sender<TrainingProgress>,
) -> Result<TrainingReport> {
    log::info!("starting training job for {}", model_path.display());
    let result = run_training(&inputs, &config, &model_path, &cancel, |event| {
        let _ = tx.send(event);
    });
    match &result {
        Ok(report) => log::info!(
            "training finished: {} entries written to {}",
            report.entries,
            report.model_path.display()
        ),
        Err(DialError::Cancelled) => log::info!("training cancelled"),
        Err(err) => log::error!("training failed: {err}"),
    }
    result
}
