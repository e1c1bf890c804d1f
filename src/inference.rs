use std::path::{Path, PathBuf};

use burn::{data::dataloader::DataLoaderBuilder, prelude::*, record::CompactRecorder};
use tracing::debug;

use crate::{
    checkpoint::FINAL_MODEL_FILE,
    classes::ClassDictionary,
    data::{load_image, ProfessionBatcher, ProfessionDataset},
    decode::{decode_batch, RankedPrediction},
    error::{Error, Result},
    evaluation::{evaluate, Evaluation},
    model::Vgg16,
    training::{TrainingConfig, CLASSES_FILE},
};

/// Ranked labels for one input image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePrediction<'a> {
    pub path: PathBuf,
    pub ranked: Vec<RankedPrediction<'a>>,
}

pub struct Predictor<B: Backend> {
    model: Vgg16<B>,
    classes: ClassDictionary,
    batcher: ProfessionBatcher<B>,
    image_dim: usize,
}

impl<B: Backend> Predictor<B> {
    pub fn new(
        model: Vgg16<B>,
        classes: ClassDictionary,
        image_dim: usize,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            classes,
            batcher: ProfessionBatcher::new(device, image_dim),
            image_dim,
        }
    }

    /// Restores a trained classifier from an artifact directory.
    ///
    /// `weights` defaults to the final-epoch weights written by training; pass
    /// an exported `vgg16_model_*.mpk` to use the best checkpoint instead.
    pub fn load(artifact_dir: &Path, weights: Option<&Path>, device: B::Device) -> Result<Self> {
        let config = TrainingConfig::load_from(artifact_dir)?;
        config.model.validate()?;
        let classes = ClassDictionary::load(&artifact_dir.join(CLASSES_FILE))?;

        if config.model.classes != classes.len() {
            return Err(Error::ClassDictionary(format!(
                "weights were trained for {} classes but the dictionary holds {}",
                config.model.classes,
                classes.len()
            )));
        }

        let weights = weights
            .map(Path::to_path_buf)
            .unwrap_or_else(|| artifact_dir.join(FINAL_MODEL_FILE));
        debug!(weights = %weights.display(), "loading model weights");

        let model = config
            .model
            .init::<B>(&device)
            .load_file(weights, &CompactRecorder::new(), &device)?;

        Ok(Self::new(model, classes, config.model.image_dim, device))
    }

    /// Softmax rows, one per image, flattened row-major.
    pub fn probabilities(&self, paths: &[PathBuf]) -> Result<Vec<f32>> {
        let images = paths
            .iter()
            .map(|path| load_image(path, self.image_dim))
            .collect::<Result<Vec<_>>>()?;

        self.model
            .predict(self.batcher.images(images))
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|err| Error::TensorData(format!("{err:?}")))
    }

    pub fn predict_images(
        &self,
        paths: &[PathBuf],
        top: usize,
    ) -> Result<Vec<ImagePrediction<'_>>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let probabilities = self.probabilities(paths)?;
        let rows = decode_batch(&probabilities, &self.classes, top)?;

        Ok(paths
            .iter()
            .zip(rows)
            .map(|(path, ranked)| ImagePrediction {
                path: path.clone(),
                ranked,
            })
            .collect())
    }

    pub fn predict_image(&self, path: &Path, top: usize) -> Result<Vec<RankedPrediction<'_>>> {
        let mut predictions = self.predict_images(&[path.to_path_buf()], top)?;

        Ok(predictions.pop().map(|prediction| prediction.ranked).unwrap_or_default())
    }

    /// Top-1 accuracy over a `<data_dir>/<label>/<file>` tree.
    pub fn evaluate(&self, data_dir: &Path, batch_size: usize) -> Result<Evaluation> {
        if batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".to_string()));
        }

        let dataset = ProfessionDataset::load(data_dir, &self.classes, self.image_dim)?;
        let dataloader = DataLoaderBuilder::new(self.batcher.clone())
            .batch_size(batch_size)
            .build(dataset);

        Ok(evaluate(&self.model, dataloader.as_ref()))
    }
}
