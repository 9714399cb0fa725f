use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, LeakyRelu, LeakyReluConfig, PRelu, PReluConfig,
        PaddingConfig2d,
    },
    prelude::*,
};

/// Configuration to create a [ResidualBlock](ResidualBlock).
#[derive(Config, Debug)]
pub struct ResidualBlockConfig {
    /// Channels of the input and the output.
    pub channels: usize,
    /// Momentum of the batch-norm running statistics.
    #[config(default = 0.1)]
    pub momentum: f64,
}

/// Two convolution + batch-norm stages with a PReLU in between and an additive skip.
///
/// Preserves spatial size and channel count.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    norm1: BatchNorm<B, 2>,
    activation: PRelu<B>,
    conv2: Conv2d<B>,
    norm2: BatchNorm<B, 2>,
}

impl ResidualBlockConfig {
    /// Initialize a new [residual block](ResidualBlock).
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResidualBlock<B> {
        let conv = || {
            Conv2dConfig::new([self.channels, self.channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        let norm = || {
            BatchNormConfig::new(self.channels)
                .with_momentum(self.momentum)
                .init(device)
        };

        ResidualBlock {
            conv1: conv(),
            norm1: norm(),
            activation: PReluConfig::new().init(device),
            conv2: conv(),
            norm2: norm(),
        }
    }
}

impl<B: Backend> ResidualBlock<B> {
    /// # Shapes
    ///
    /// - input: `[batch_size, channels, height, width]`
    /// - output: `[batch_size, channels, height, width]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(input.clone());
        let x = self.norm1.forward(x);
        let x = self.activation.forward(x);
        let x = self.conv2.forward(x);
        let x = self.norm2.forward(x);

        x.add(input)
    }
}

/// Sub-pixel rearrangement: `[N, C·r², H, W]` becomes `[N, C, H·r, W·r]`.
///
/// Output pixel `(c, h·r + i, w·r + j)` is read from input channel `c·r² + i·r + j`
/// at `(h, w)`.
#[derive(Module, Clone, Debug)]
pub struct PixelShuffle {
    upscale_factor: usize,
}

impl PixelShuffle {
    /// Create the rearrangement for the given factor.
    pub fn new(upscale_factor: usize) -> Self {
        Self { upscale_factor }
    }

    /// # Panics
    ///
    /// Panics if the channel count is not divisible by the squared factor.
    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [batch_size, channels, height, width] = input.dims();
        let factor = self.upscale_factor;

        assert_eq!(
            channels % (factor * factor),
            0,
            "PixelShuffle needs channels divisible by {}, received {channels}",
            factor * factor
        );
        let out_channels = channels / (factor * factor);

        input
            .reshape([batch_size, out_channels, factor, factor, height, width])
            .permute([0, 1, 4, 2, 5, 3])
            .reshape([batch_size, out_channels, height * factor, width * factor])
    }
}

/// Configuration to create an [UpsamplingBlock](UpsamplingBlock).
#[derive(Config, Debug)]
pub struct UpsamplingBlockConfig {
    /// Channels of the input and the output.
    pub channels: usize,
}

/// Convolution to 4x the channels, sub-pixel rearrangement by 2, then PReLU.
#[derive(Module, Debug)]
pub struct UpsamplingBlock<B: Backend> {
    conv: Conv2d<B>,
    shuffle: PixelShuffle,
    activation: PRelu<B>,
}

impl UpsamplingBlockConfig {
    /// Initialize a new [upsampling block](UpsamplingBlock).
    pub fn init<B: Backend>(&self, device: &B::Device) -> UpsamplingBlock<B> {
        UpsamplingBlock {
            conv: Conv2dConfig::new([self.channels, self.channels * 4], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            shuffle: PixelShuffle::new(2),
            activation: PReluConfig::new().init(device),
        }
    }
}

impl<B: Backend> UpsamplingBlock<B> {
    /// # Shapes
    ///
    /// - input: `[batch_size, channels, height, width]`
    /// - output: `[batch_size, channels, height * 2, width * 2]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.shuffle.forward(x);
        self.activation.forward(x)
    }
}

/// Configuration to create a [DiscriminatorBlock](DiscriminatorBlock).
#[derive(Config, Debug)]
pub struct DiscriminatorBlockConfig {
    /// Input and output channels.
    pub channels: [usize; 2],
    /// Convolution stride, 1 or 2.
    #[config(default = 1)]
    pub stride: usize,
    /// Whether batch-norm follows the convolution.
    #[config(default = true)]
    pub normalize: bool,
    /// Momentum of the batch-norm running statistics.
    #[config(default = 0.1)]
    pub momentum: f64,
}

/// 3x3 convolution, optional batch-norm, leaky ReLU (slope 0.2).
#[derive(Module, Debug)]
pub struct DiscriminatorBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: Option<BatchNorm<B, 2>>,
    activation: LeakyRelu,
}

impl DiscriminatorBlockConfig {
    /// Initialize a new [discriminator block](DiscriminatorBlock).
    pub fn init<B: Backend>(&self, device: &B::Device) -> DiscriminatorBlock<B> {
        let conv = Conv2dConfig::new(self.channels, [3, 3])
            .with_stride([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let norm = self.normalize.then(|| {
            BatchNormConfig::new(self.channels[1])
                .with_momentum(self.momentum)
                .init(device)
        });

        DiscriminatorBlock {
            conv,
            norm,
            activation: LeakyReluConfig::new().with_negative_slope(0.2).init(),
        }
    }
}

impl<B: Backend> DiscriminatorBlock<B> {
    /// # Shapes
    ///
    /// - input: `[batch_size, channels_in, height, width]`
    /// - output: `[batch_size, channels_out, ceil(height / stride), ceil(width / stride)]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = match &self.norm {
            Some(norm) => norm.forward(x),
            None => x,
        };
        self.activation.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn pixel_shuffle_interleaves_channels_into_space() {
        let device = Default::default();
        let input = Tensor::<TestBackend, 1>::from_floats([0.0, 1.0, 2.0, 3.0], &device)
            .reshape([1, 4, 1, 1]);

        let output = PixelShuffle::new(2).forward(input);

        assert_eq!(output.dims(), [1, 1, 2, 2]);
        output
            .reshape([2, 2])
            .to_data()
            .assert_approx_eq(&TensorData::from([[0.0, 1.0], [2.0, 3.0]]), 3);
    }

    #[test]
    fn pixel_shuffle_keeps_each_pixel_block_together() {
        let device = Default::default();
        // Two spatial positions, four channels each.
        let input = Tensor::<TestBackend, 1>::from_floats(
            [0.0, 10.0, 1.0, 11.0, 2.0, 12.0, 3.0, 13.0],
            &device,
        )
        .reshape([1, 4, 1, 2]);

        let output = PixelShuffle::new(2).forward(input);

        assert_eq!(output.dims(), [1, 1, 2, 4]);
        output.reshape([2, 4]).to_data().assert_approx_eq(
            &TensorData::from([[0.0, 1.0, 10.0, 11.0], [2.0, 3.0, 12.0, 13.0]]),
            3,
        );
    }

    #[test]
    fn residual_block_preserves_shape() {
        let device = Default::default();
        let block = ResidualBlockConfig::new(8).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random([2, 8, 6, 5], Distribution::Default, &device);

        assert_eq!(block.forward(input).dims(), [2, 8, 6, 5]);
    }

    #[test]
    fn upsampling_block_doubles_spatial_size() {
        let device = Default::default();
        let block = UpsamplingBlockConfig::new(8).init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random([1, 8, 5, 7], Distribution::Default, &device);

        assert_eq!(block.forward(input).dims(), [1, 8, 10, 14]);
    }

    #[test]
    fn strided_discriminator_block_halves_rounding_up() {
        let device = Default::default();
        let block = DiscriminatorBlockConfig::new([3, 8])
            .with_stride(2)
            .init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random([1, 3, 9, 8], Distribution::Default, &device);

        assert_eq!(block.forward(input).dims(), [1, 8, 5, 4]);
    }
}
