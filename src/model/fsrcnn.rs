use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        PRelu, PReluConfig, PaddingConfig2d,
    },
    prelude::*,
};

use crate::visual::Upscaler;
use crate::SCALE_FACTOR;

/// Kernel of the final transposed convolution.
const DECONV_KERNEL: usize = 9;

/// Configuration to create a [Fsrcnn](Fsrcnn) model.
#[derive(Config, Debug)]
pub struct FsrcnnConfig {
    /// Image channels of the input and the output.
    #[config(default = 3)]
    pub channels: usize,
    /// Feature width `d` around the mapping layers.
    #[config(default = 56)]
    pub features: usize,
    /// Shrunk width `s` of the mapping layers.
    #[config(default = 12)]
    pub shrunk: usize,
    /// Number `m` of mapping layers.
    #[config(default = 4)]
    pub mapping_layers: usize,
}

/// Convolution followed by its own PReLU.
#[derive(Module, Debug)]
pub struct ConvActivation<B: Backend> {
    conv: Conv2d<B>,
    activation: PRelu<B>,
}

impl<B: Backend> ConvActivation<B> {
    fn new(channels: [usize; 2], kernel: usize, device: &B::Device) -> Self {
        let padding = kernel / 2;
        Self {
            conv: Conv2dConfig::new(channels, [kernel, kernel])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .init(device),
            activation: PReluConfig::new().init(device),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.activation.forward(self.conv.forward(input))
    }
}

/// Compact super-resolution regressor.
///
/// Feature extraction, shrinking, same-resolution mapping and expansion all run at
/// the input resolution; one transposed convolution performs the whole 4x upscale.
#[derive(Module, Debug)]
pub struct Fsrcnn<B: Backend> {
    extraction: ConvActivation<B>,
    shrinking: ConvActivation<B>,
    mapping: Vec<ConvActivation<B>>,
    expanding: ConvActivation<B>,
    deconv: ConvTranspose2d<B>,
}

impl FsrcnnConfig {
    /// Initialize a new [FSRCNN](Fsrcnn) model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Fsrcnn<B> {
        // (h - 1)·s - 2p + k + (s - 1) = h·s when k = 2p + 1.
        let padding = DECONV_KERNEL / 2;
        let deconv = ConvTranspose2dConfig::new(
            [self.features, self.channels],
            [DECONV_KERNEL, DECONV_KERNEL],
        )
        .with_stride([SCALE_FACTOR, SCALE_FACTOR])
        .with_padding([padding, padding])
        .with_padding_out([SCALE_FACTOR - 1, SCALE_FACTOR - 1])
        .init(device);

        Fsrcnn {
            extraction: ConvActivation::new([self.channels, self.features], 5, device),
            shrinking: ConvActivation::new([self.features, self.shrunk], 1, device),
            mapping: (0..self.mapping_layers)
                .map(|_| ConvActivation::new([self.shrunk, self.shrunk], 3, device))
                .collect(),
            expanding: ConvActivation::new([self.shrunk, self.features], 1, device),
            deconv,
        }
    }
}

impl<B: Backend> Fsrcnn<B> {
    /// # Shapes
    ///
    /// - input: `[batch_size, channels, height, width]`
    /// - output: `[batch_size, channels, height * 4, width * 4]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.extraction.forward(input);
        let mut x = self.shrinking.forward(x);
        for layer in self.mapping.iter() {
            x = layer.forward(x);
        }
        let x = self.expanding.forward(x);

        self.deconv.forward(x)
    }
}

impl<B: Backend> Upscaler<B> for Fsrcnn<B> {
    fn upscale(&self, low_res: Tensor<B, 4>) -> Tensor<B, 4> {
        self.forward(low_res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn output_is_exactly_four_times_the_input() {
        let device = Default::default();
        let model = FsrcnnConfig::new().init::<TestBackend>(&device);

        for [height, width] in [[8, 8], [5, 7], [1, 1]] {
            let input = Tensor::<TestBackend, 4>::random(
                [2, 3, height, width],
                Distribution::Default,
                &device,
            );
            assert_eq!(model.forward(input).dims(), [2, 3, height * 4, width * 4]);
        }
    }

    #[test]
    fn mapping_depth_follows_config() {
        let device = Default::default();
        let model = FsrcnnConfig::new()
            .with_mapping_layers(2)
            .init::<TestBackend>(&device);

        assert_eq!(model.mapping.len(), 2);
    }
}
