use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use dialsense::{
    PivotPoint, PredictConfig, ReferenceTime, TrainingConfig, TrainingInputs, imaging, predict,
    recognizer::model::ModelArtifact, start_training,
};
use indicatif::{ProgressBar, ProgressStyle};

const USAGE: &str = "usage: train_and_predict <reference> <hour-mask> <minute-mask> <hh:mm[:ss]> \
                     <pivot-x> <pivot-y> <query> [second-mask]";

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 7 {
        bail!(USAGE);
    }

    let reference_time = parse_time(&args[3])?;
    let pivot = PivotPoint::new(
        args[4].parse().context("pivot-x must be a number in 0..1")?,
        args[5].parse().context("pivot-y must be a number in 0..1")?,
    );
    let second_mask = args.get(7).map(PathBuf::from);

    let config = match std::env::var_os("DIALSENSE_CONFIG") {
        Some(path) => TrainingConfig::load(&PathBuf::from(path))?,
        None => TrainingConfig::default(),
    };
    let model_path = std::env::var_os("DIALSENSE_MODEL")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("target/dialsense/model.json"));

    let inputs = TrainingInputs::load(
        &PathBuf::from(&args[0]),
        &PathBuf::from(&args[1]),
        &PathBuf::from(&args[2]),
        second_mask.as_deref(),
        pivot,
        reference_time,
    )?;

    println!(
        "Training on {} with {} samples per hour -> {}",
        args[0],
        config.samples_per_hour,
        model_path.display()
    );

    let bar = ProgressBar::new(1_000);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {percent:>3}% {msg}")?
            .progress_chars("=> "),
    );

    let job = start_training(inputs, config, model_path.clone());
    for event in job.events().iter() {
        bar.set_position((event.fraction * 1_000.0) as u64);
        bar.set_message(event.status);
    }
    let report = job.join()?;
    bar.finish_with_message("done");

    println!(
        "Model has {} entries ({} samples dropped)",
        report.entries, report.dropped
    );

    let model = ModelArtifact::load(&model_path)?;
    let query_path = PathBuf::from(&args[6]);
    let query = imaging::open(&query_path)
        .with_context(|| format!("failed to read query {}", query_path.display()))?;
    let prediction = predict(&query, &model, PredictConfig::default().k)?;

    println!("{} -> {}", query_path.display(), prediction.display_text());
    Ok(())
}

fn parse_time(text: &str) -> Result<ReferenceTime> {
    let parts: Vec<u8> = text
        .split(':')
        .map(|p| p.parse::<u8>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid time {text}"))?;
    let (hour, minute, second) = match parts.as_slice() {
        [h, m] => (*h, *m, 0),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(anyhow!("expected hh:mm or hh:mm:ss, got {text}")),
    };
    Ok(ReferenceTime::new(hour, minute, second)?)
}
