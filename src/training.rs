use std::{
    fs,
    path::{Path, PathBuf},
};

use burn::{
    config::Config,
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::Module,
    optim::SgdConfig,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
    train::{
        metric::{AccuracyMetric, LearningRateMetric, LossMetric},
        LearnerBuilder,
    },
};
use tracing::info;

use crate::{
    checkpoint::{self, CHECKPOINT_DIR, FINAL_MODEL_FILE},
    classes::ClassDictionary,
    data::{ProfessionBatcher, ProfessionDataset},
    error::Error,
    model::{Vgg16, Vgg16Config},
    schedule::{iterations_per_epoch, StepDecayScheduleConfig},
};

pub const CONFIG_FILE: &str = "config.json";
pub const CLASSES_FILE: &str = "classes.json";

#[derive(Config)]
pub struct TrainingConfig {
    pub model: Vgg16Config,

    pub optimizer: SgdConfig,

    #[config(default = 100)]
    pub epoch_count: usize,

    #[config(default = 16)]
    pub batch_size: usize,

    #[config(default = 42)]
    pub seed: u64,

    /// Randomly mirror training images; validation images are never flipped.
    #[config(default = true)]
    pub horizontal_flip: bool,

    #[config(default = 4)]
    pub worker_count: usize,
}

impl TrainingConfig {
    /// Rejects settings that would leave the learner without batches or features.
    ///
    /// A `worker_count` of zero is valid and batches on the training thread.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.model.validate()?;

        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be positive".to_string()));
        }
        if self.epoch_count == 0 {
            return Err(Error::InvalidConfig("epoch_count must be positive".to_string()));
        }

        Ok(())
    }

    fn batchers<B: AutodiffBackend>(
        &self,
        device: &B::Device,
    ) -> (ProfessionBatcher<B>, ProfessionBatcher<B::InnerBackend>) {
        let image_dim = self.model.image_dim;

        (
            ProfessionBatcher::new(device.clone(), image_dim)
                .with_horizontal_flip(self.horizontal_flip),
            ProfessionBatcher::new(device.clone(), image_dim),
        )
    }

    pub fn load_from(artifact_dir: &Path) -> crate::error::Result<Self> {
        let path = artifact_dir.join(CONFIG_FILE);

        Self::load(&path).map_err(|err| Error::Config {
            path,
            reason: format!("{err:?}"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DatasetPaths {
    pub train_dir: PathBuf,
    pub test_dir: PathBuf,
}

impl Default for DatasetPaths {
    fn default() -> Self {
        Self {
            train_dir: PathBuf::from("idenprof/train"),
            test_dir: PathBuf::from("idenprof/test"),
        }
    }
}

// Checkpoints of an earlier run would otherwise compete with this run's best.
fn prepare_artifact_dir(artifact_dir: &Path) -> crate::error::Result<()> {
    let checkpoint_dir = artifact_dir.join(CHECKPOINT_DIR);
    if checkpoint_dir.exists() {
        fs::remove_dir_all(&checkpoint_dir)?;
    }
    fs::create_dir_all(artifact_dir)?;

    Ok(())
}

pub fn train<B: AutodiffBackend>(
    artifact_dir: &Path,
    config: TrainingConfig,
    paths: &DatasetPaths,
    classes: &ClassDictionary,
    device: B::Device,
) -> crate::error::Result<Vgg16<B>> {
    config.validate()?;

    if config.model.classes != classes.len() {
        return Err(Error::ClassDictionary(format!(
            "model expects {} classes but the dictionary holds {}",
            config.model.classes,
            classes.len()
        )));
    }

    prepare_artifact_dir(artifact_dir)?;

    config.save(artifact_dir.join(CONFIG_FILE))?;
    classes.save(&artifact_dir.join(CLASSES_FILE))?;

    B::seed(config.seed);

    let image_dim = config.model.image_dim;
    let train = ProfessionDataset::load(&paths.train_dir, classes, image_dim)?;
    let test = ProfessionDataset::load(&paths.test_dir, classes, image_dim)?;
    info!(
        train = train.len(),
        test = test.len(),
        classes = classes.len(),
        "loaded datasets"
    );

    let iterations = iterations_per_epoch(train.len(), config.batch_size, config.worker_count);
    let scheduler = StepDecayScheduleConfig::new(config.epoch_count, iterations).init();

    let (batcher_train, batcher_valid) = config.batchers::<B>(&device);

    let mut builder_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(config.batch_size)
        .shuffle(config.seed);
    let mut builder_valid = DataLoaderBuilder::new(batcher_valid).batch_size(config.batch_size);
    if config.worker_count > 0 {
        builder_train = builder_train.num_workers(config.worker_count);
        builder_valid = builder_valid.num_workers(config.worker_count);
    }
    let dataloader_train = builder_train.build(train);
    let dataloader_valid = builder_valid.build(test);

    let model = config.model.init::<B>(&device);
    info!("model summary\n{}", model.summary());

    let learner = LearnerBuilder::new(artifact_dir)
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(LearningRateMetric::new())
        .with_file_checkpointer(CompactRecorder::new())
        .with_checkpointing_strategy(checkpoint::best_only::<B>())
        .with_application_logger(None)
        .devices(vec![device.clone()])
        .num_epochs(config.epoch_count)
        .summary()
        .build(model, config.optimizer.init(), scheduler);

    info!(
        epochs = config.epoch_count,
        batch_size = config.batch_size,
        iterations_per_epoch = iterations,
        "starting training"
    );
    let model_trained = learner.fit(dataloader_train, dataloader_valid.clone());

    model_trained
        .clone()
        .save_file(artifact_dir.join(FINAL_MODEL_FILE), &CompactRecorder::new())?;

    checkpoint::export_best::<B::InnerBackend>(
        artifact_dir,
        &config.model,
        dataloader_valid.as_ref(),
        &device,
    )?;

    Ok(model_trained)
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestBackend = burn::backend::Autodiff<burn::backend::NdArray<f32>>;

    #[test]
    fn defaults_match_the_reference_run() {
        let config = TrainingConfig::new(Vgg16Config::new(10), SgdConfig::new());

        assert_eq!(config.epoch_count, 100);
        assert_eq!(config.batch_size, 16);
        assert!(config.horizontal_flip);
        assert_eq!(config.model.image_dim, 224);
        assert_eq!(config.model.hidden_units, 4096);
    }

    #[test]
    fn config_round_trips_through_the_artifact_dir() {
        let artifact_dir = tempfile::tempdir().unwrap();
        let config = TrainingConfig::new(Vgg16Config::new(3).with_image_dim(64), SgdConfig::new())
            .with_epoch_count(7)
            .with_horizontal_flip(false);

        config.save(artifact_dir.path().join(CONFIG_FILE)).unwrap();
        let loaded = TrainingConfig::load_from(artifact_dir.path()).unwrap();

        assert_eq!(loaded.epoch_count, 7);
        assert!(!loaded.horizontal_flip);
        assert_eq!(loaded.model.classes, 3);
        assert_eq!(loaded.model.image_dim, 64);
    }

    #[test]
    fn missing_config_is_reported_with_its_path() {
        let artifact_dir = tempfile::tempdir().unwrap();

        match TrainingConfig::load_from(artifact_dir.path()) {
            Err(Error::Config { path, .. }) => assert!(path.ends_with(CONFIG_FILE)),
            other => panic!("expected a config error, got {:?}", other.err()),
        }
    }

    #[test]
    fn class_count_mismatch_stops_before_touching_disk() {
        let artifact_dir = tempfile::tempdir().unwrap();
        let artifact_dir = artifact_dir.path().join("run");

        let result = train::<TestBackend>(
            &artifact_dir,
            TrainingConfig::new(Vgg16Config::new(3), SgdConfig::new()),
            &DatasetPaths::default(),
            &ClassDictionary::idenprof(),
            Default::default(),
        );

        assert!(matches!(result, Err(Error::ClassDictionary(_))));
        assert!(!artifact_dir.exists());
    }

    #[test]
    fn missing_dataset_is_reported_before_training() {
        let artifact_dir = tempfile::tempdir().unwrap();
        let paths = DatasetPaths {
            train_dir: artifact_dir.path().join("absent/train"),
            test_dir: artifact_dir.path().join("absent/test"),
        };

        let result = train::<TestBackend>(
            artifact_dir.path(),
            TrainingConfig::new(Vgg16Config::new(10), SgdConfig::new()),
            &paths,
            &ClassDictionary::idenprof(),
            Default::default(),
        );

        assert!(matches!(result, Err(Error::MissingDirectory(path)) if path == paths.train_dir));
        assert!(artifact_dir.path().join(CONFIG_FILE).exists());
        assert!(artifact_dir.path().join(CLASSES_FILE).exists());
    }

    #[test]
    fn undersized_images_are_rejected_before_touching_disk() {
        let artifact_dir = tempfile::tempdir().unwrap();
        let artifact_dir = artifact_dir.path().join("run");

        let result = train::<TestBackend>(
            &artifact_dir,
            TrainingConfig::new(Vgg16Config::new(10).with_image_dim(16), SgdConfig::new()),
            &DatasetPaths::default(),
            &ClassDictionary::idenprof(),
            Default::default(),
        );

        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        assert!(!artifact_dir.exists());
    }

    #[test]
    fn batch_size_must_be_positive() {
        let config = TrainingConfig::new(Vgg16Config::new(10), SgdConfig::new());

        assert!(matches!(
            config.clone().with_batch_size(0).validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            config.clone().with_epoch_count(0).validate(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(config.with_worker_count(0).validate().is_ok());
    }

    #[test]
    fn only_the_training_batcher_flips() {
        let device = Default::default();
        let config = TrainingConfig::new(Vgg16Config::new(10), SgdConfig::new());

        let (batcher_train, batcher_valid) = config.batchers::<TestBackend>(&device);
        assert_eq!(batcher_train.flip_probability(), 0.5);
        assert_eq!(batcher_valid.flip_probability(), 0.0);

        let (batcher_train, batcher_valid) = config
            .with_horizontal_flip(false)
            .batchers::<TestBackend>(&device);
        assert_eq!(batcher_train.flip_probability(), 0.0);
        assert_eq!(batcher_valid.flip_probability(), 0.0);
    }
}
