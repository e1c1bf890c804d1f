use burn::{
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
    train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep},
};
use nn::{loss::CrossEntropyLossConfig, Dropout, DropoutConfig, Linear, LinearConfig, Relu};

use crate::{
    data::ProfessionBatch,
    error::Error,
    module::conv_stage::{ConvStage, ConvStageConfig},
};

pub const INPUT_CHANNELS: usize = 3;

// Conv widths of each stage; every stage ends in a 2x2 max-pool.
const VGG16_STAGES: [&[usize]; 5] = [
    &[64, 64],
    &[128, 128],
    &[256, 256, 256],
    &[512, 512, 512],
    &[512, 512, 512],
];

/// Smallest input side that survives every stage's max-pool.
pub const MIN_IMAGE_DIM: usize = 1 << VGG16_STAGES.len();

#[derive(Module, Debug)]
struct Classifier<B: Backend> {
    hidden: Vec<Linear<B>>,
    dropout: Dropout,
    activation: Relu,
    output: Linear<B>,
}

impl<B: Backend> Classifier<B> {
    fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.hidden.iter().fold(x, |x, linear| {
            let x = self.activation.forward(linear.forward(x));
            self.dropout.forward(x)
        });

        self.output.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct Vgg16<B: Backend> {
    stages: Vec<ConvStage<B>>,
    classifier: Classifier<B>,
}

impl<B: Backend> Vgg16<B> {
    /// Class logits for a `[batch, 3, image_dim, image_dim]` batch.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.stages.iter().fold(x, |x, stage| stage.forward(x));
        let x = x.flatten(1, 3);

        self.classifier.forward(x)
    }

    /// Layer tree with parameter counts, followed by the total.
    pub fn summary(&self) -> String {
        format!("{self}\ntotal parameters: {}", self.num_params())
    }

    /// Per-class probabilities; each row sums to one.
    pub fn predict(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);

        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }
}

impl<B: AutodiffBackend> TrainStep<ProfessionBatch<B>, ClassificationOutput<B>> for Vgg16<B> {
    fn step(&self, batch: ProfessionBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);

        TrainOutput::new(self, item.loss.backward(), item)
    }
}

impl<B: Backend> ValidStep<ProfessionBatch<B>, ClassificationOutput<B>> for Vgg16<B> {
    fn step(&self, batch: ProfessionBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

#[derive(Config, Debug)]
pub struct Vgg16Config {
    pub classes: usize,

    #[config(default = 224)]
    pub image_dim: usize,

    #[config(default = 4096)]
    pub hidden_units: usize,

    #[config(default = 0.0)]
    pub dropout: f64,
}

impl Vgg16Config {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.classes == 0 {
            return Err(Error::InvalidConfig("model needs at least one class".to_string()));
        }
        if self.image_dim < MIN_IMAGE_DIM {
            return Err(Error::InvalidConfig(format!(
                "image_dim {} is below the minimum of {MIN_IMAGE_DIM}",
                self.image_dim
            )));
        }
        if self.hidden_units == 0 {
            return Err(Error::InvalidConfig("hidden_units must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidConfig(format!(
                "dropout {} is outside [0, 1)",
                self.dropout
            )));
        }

        Ok(())
    }

    fn stage_configs(&self) -> Vec<ConvStageConfig> {
        let mut input_channels = INPUT_CHANNELS;

        VGG16_STAGES
            .iter()
            .map(|widths| {
                let config = ConvStageConfig::new(input_channels, widths.to_vec());
                input_channels = config.output_channels();
                config
            })
            .collect()
    }

    /// Length of the flattened feature map fed to the dense layers.
    pub fn feature_dim(&self) -> usize {
        let side = VGG16_STAGES.iter().fold(self.image_dim, |side, _| side / 2);
        let channels = self.stage_configs().last().map_or(INPUT_CHANNELS, |stage| {
            stage.output_channels()
        });

        channels * side * side
    }

    /// Builds the network. Call [`Vgg16Config::validate`] first; an
    /// `image_dim` below [`MIN_IMAGE_DIM`] leaves no features for the dense layers.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16<B> {
        let stages = self
            .stage_configs()
            .iter()
            .map(|stage| stage.init(device))
            .collect();

        let classifier = Classifier {
            hidden: vec![
                LinearConfig::new(self.feature_dim(), self.hidden_units).init(device),
                LinearConfig::new(self.hidden_units, self.hidden_units).init(device),
            ],
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
            output: LinearConfig::new(self.hidden_units, self.classes).init(device),
        };

        Vgg16 { stages, classifier }
    }
}
