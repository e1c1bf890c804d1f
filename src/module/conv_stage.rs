use burn::prelude::*;
use nn::pool::{MaxPool2d, MaxPool2dConfig};

use super::conv2d_relu::{Conv2dRelu, Conv2dReluConfig};

/// A run of conv+ReLU layers closed by a 2x2 max-pool that halves the
/// spatial size.
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    convs: Vec<Conv2dRelu<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> ConvStage<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.convs.iter().fold(x, |x, conv| conv.forward(x));

        self.pool.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct ConvStageConfig {
    pub input_channels: usize,
    pub widths: Vec<usize>,
}

impl ConvStageConfig {
    pub fn output_channels(&self) -> usize {
        self.widths.last().copied().unwrap_or(self.input_channels)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvStage<B> {
        let mut channels = self.input_channels;
        let mut convs = Vec::with_capacity(self.widths.len());

        for &width in &self.widths {
            convs.push(Conv2dReluConfig::new([channels, width]).init(device));
            channels = width;
        }

        ConvStage {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }
}
