use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PRelu, PReluConfig, PaddingConfig2d,
    },
    prelude::*,
};

use super::blocks::{ResidualBlock, ResidualBlockConfig, UpsamplingBlock, UpsamplingBlockConfig};
use crate::visual::Upscaler;
use crate::SCALE_FACTOR;

/// Configuration to create a [Generator](Generator).
#[derive(Config, Debug)]
pub struct GeneratorConfig {
    /// Image channels of the input and the output.
    #[config(default = 3)]
    pub channels: usize,
    /// Width of the feature maps between the input and output convolutions.
    #[config(default = 64)]
    pub num_features: usize,
    /// Number of residual blocks under the long skip connection.
    #[config(default = 16)]
    pub num_residual_blocks: usize,
    /// Momentum of every batch-norm running statistic.
    #[config(default = 0.1)]
    pub momentum: f64,
}

/// SRGAN generator: upscales its input by [SCALE_FACTOR](crate::SCALE_FACTOR).
///
/// The output lives in the same normalized space as the input and is not clamped.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    input: Conv2d<B>,
    input_activation: PRelu<B>,
    residuals: Vec<ResidualBlock<B>>,
    trunk: Conv2d<B>,
    trunk_norm: BatchNorm<B, 2>,
    upsampling: Vec<UpsamplingBlock<B>>,
    output: Conv2d<B>,
}

impl GeneratorConfig {
    /// Initialize a new [generator](Generator).
    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        let residual = ResidualBlockConfig::new(self.num_features).with_momentum(self.momentum);
        let residuals = (0..self.num_residual_blocks)
            .map(|_| residual.init(device))
            .collect();

        // Each upsampling block doubles the resolution.
        let upsampling = (0..SCALE_FACTOR.ilog2())
            .map(|_| UpsamplingBlockConfig::new(self.num_features).init(device))
            .collect();

        Generator {
            input: Conv2dConfig::new([self.channels, self.num_features], [9, 9])
                .with_padding(PaddingConfig2d::Explicit(4, 4))
                .init(device),
            input_activation: PReluConfig::new().init(device),
            residuals,
            trunk: Conv2dConfig::new([self.num_features, self.num_features], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            trunk_norm: BatchNormConfig::new(self.num_features)
                .with_momentum(self.momentum)
                .init(device),
            upsampling,
            output: Conv2dConfig::new([self.num_features, self.channels], [9, 9])
                .with_padding(PaddingConfig2d::Explicit(4, 4))
                .init(device),
        }
    }
}

impl<B: Backend> Generator<B> {
    /// # Shapes
    ///
    /// - input: `[batch_size, channels, height, width]`
    /// - output: `[batch_size, channels, height * 4, width * 4]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let features = self.input.forward(input);
        let features = self.input_activation.forward(features);

        let mut x = features.clone();
        for block in self.residuals.iter() {
            x = block.forward(x);
        }
        let x = self.trunk.forward(x);
        let mut x = self.trunk_norm.forward(x).add(features);

        for block in self.upsampling.iter() {
            x = block.forward(x);
        }

        self.output.forward(x)
    }
}

impl<B: Backend> Upscaler<B> for Generator<B> {
    fn upscale(&self, low_res: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward(low_res)
    }
}
