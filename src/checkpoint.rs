use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    data::dataloader::DataLoader,
    prelude::*,
    record::CompactRecorder,
    train::{
        checkpoint::MetricCheckpointingStrategy,
        metric::{
            store::{Aggregate, Direction, Split},
            AccuracyMetric,
        },
    },
};
use tracing::info;

use crate::{
    data::ProfessionBatch,
    error::{Error, Result},
    evaluation::evaluate,
    model::Vgg16Config,
};

/// Subdirectory where burn's file checkpointer writes `model-<epoch>.mpk`.
pub const CHECKPOINT_DIR: &str = "checkpoint";

/// Weights after the last training epoch.
pub const FINAL_MODEL_FILE: &str = "model.mpk";

/// Save a checkpoint only for epochs that improve validation accuracy.
pub fn best_only<B: Backend>() -> MetricCheckpointingStrategy {
    MetricCheckpointingStrategy::new::<AccuracyMetric<B>>(
        Aggregate::Mean,
        Direction::Highest,
        Split::Valid,
    )
}

pub fn checkpoint_name(epoch: usize, accuracy: f64) -> String {
    format!("vgg16_model_{epoch:03}-{accuracy:.3}.mpk")
}

/// Highest epoch with a saved model checkpoint.
///
/// Under [`best_only`] later checkpoints are always better, so this is the
/// best epoch of the run.
pub fn best_checkpoint_epoch(artifact_dir: &Path) -> Result<Option<usize>> {
    let dir = artifact_dir.join(CHECKPOINT_DIR);
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut best = None;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let epoch = name
            .to_str()
            .and_then(|name| name.strip_prefix("model-"))
            .and_then(|name| name.strip_suffix(".mpk"))
            .and_then(|epoch| epoch.parse::<usize>().ok());

        best = best.max(epoch);
    }

    Ok(best)
}

/// Re-scores the best checkpoint and copies it next to the artifacts as
/// `vgg16_model_<epoch>-<accuracy>.mpk`.
pub fn export_best<B: Backend>(
    artifact_dir: &Path,
    config: &Vgg16Config,
    dataloader: &dyn DataLoader<ProfessionBatch<B>>,
    device: &B::Device,
) -> Result<PathBuf> {
    let epoch = best_checkpoint_epoch(artifact_dir)?
        .ok_or_else(|| Error::MissingCheckpoint(artifact_dir.join(CHECKPOINT_DIR)))?;

    let model = config.init::<B>(device).load_file(
        artifact_dir
            .join(CHECKPOINT_DIR)
            .join(format!("model-{epoch}.mpk")),
        &CompactRecorder::new(),
        device,
    )?;

    let evaluation = evaluate(&model, dataloader);
    let path = artifact_dir.join(checkpoint_name(epoch, evaluation.accuracy()));
    model.save_file(path.clone(), &CompactRecorder::new())?;

    info!(epoch, %evaluation, path = %path.display(), "exported best checkpoint");

    Ok(path)
}
