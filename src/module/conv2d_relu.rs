use burn::{module::Module, nn::conv::Conv2d, prelude::*};
use nn::{conv::Conv2dConfig, PaddingConfig2d, Relu};

/// 3x3 "same" convolution followed by ReLU.
#[derive(Module, Debug)]
pub struct Conv2dRelu<B: Backend> {
    conv: Conv2d<B>,
    activation: Relu,
}

impl<B: Backend> Conv2dRelu<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);

        self.activation.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct Conv2dReluConfig {
    channels: [usize; 2],

    #[config(default = "[3, 3]")]
    kernel_size: [usize; 2],
}

impl Conv2dReluConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Conv2dRelu<B> {
        Conv2dRelu {
            conv: Conv2dConfig::new(self.channels, self.kernel_size)
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            activation: Relu::new(),
        }
    }
}
