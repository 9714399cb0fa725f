use burn::{
    nn::{LeakyRelu, LeakyReluConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::sigmoid,
};

use super::blocks::{DiscriminatorBlock, DiscriminatorBlockConfig};
use crate::SrError;

/// Number of stride-2 blocks; each halves the extent, rounding up.
const NUM_DOWNSAMPLING: usize = 4;

/// Configuration to create a [Discriminator](Discriminator).
#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    /// Image channels of the input.
    #[config(default = 3)]
    pub channels: usize,
    /// Width of the first block; later blocks go up to 8x this.
    #[config(default = 64)]
    pub base_channels: usize,
    /// Height and width of the images the classifier head is sized for.
    #[config(default = 128)]
    pub hr_size: usize,
    /// Width of the hidden fully-connected layer.
    #[config(default = 1024)]
    pub hidden_features: usize,
    /// Momentum of every batch-norm running statistic.
    #[config(default = 0.1)]
    pub momentum: f64,
}

/// Real/fake classifier over square images of one fixed size.
///
/// The fully-connected head is sized for [`DiscriminatorConfig::hr_size`]; it is not a
/// general classifier. Use [`Discriminator::check_input`] before feeding data of
/// unknown extent.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    blocks: Vec<DiscriminatorBlock<B>>,
    hidden: Linear<B>,
    activation: LeakyRelu,
    output: Linear<B>,
    hr_size: usize,
}

impl DiscriminatorConfig {
    /// Initialize a new [discriminator](Discriminator).
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        let base = self.base_channels;
        let block = |channels: [usize; 2], stride: usize| {
            DiscriminatorBlockConfig::new(channels)
                .with_stride(stride)
                .with_momentum(self.momentum)
        };

        // No normalization on the raw pixels.
        let mut layout = vec![block([self.channels, base], 1).with_normalize(false)];
        layout.extend([
            block([base, base], 2),
            block([base, base * 2], 1),
            block([base * 2, base * 2], 2),
            block([base * 2, base * 4], 1),
            block([base * 4, base * 4], 2),
            block([base * 4, base * 8], 1),
            block([base * 8, base * 8], 2),
        ]);
        let blocks = layout.iter().map(|config| config.init(device)).collect();

        let extent = self.feature_extent();
        let flattened = base * 8 * extent * extent;

        Discriminator {
            blocks,
            hidden: LinearConfig::new(flattened, self.hidden_features).init(device),
            activation: LeakyReluConfig::new().with_negative_slope(0.2).init(),
            output: LinearConfig::new(self.hidden_features, 1).init(device),
            hr_size: self.hr_size,
        }
    }

    /// Spatial extent of the last feature map for `hr_size` inputs.
    pub fn feature_extent(&self) -> usize {
        (0..NUM_DOWNSAMPLING).fold(self.hr_size, |extent, _| extent.div_ceil(2))
    }
}

impl<B: Backend> Discriminator<B> {
    /// Probability that each image is real.
    ///
    /// # Shapes
    ///
    /// - input: `[batch_size, channels, hr_size, hr_size]`
    /// - output: `[batch_size, 1]`, values in `[0, 1]`
    ///
    /// # Panics
    ///
    /// Panics when the spatial extent differs from the configured `hr_size`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = input;
        for block in self.blocks.iter() {
            x = block.forward(x);
        }

        let x = x.flatten::<2>(1, 3);
        let x = self.hidden.forward(x);
        let x = self.activation.forward(x);
        let x = self.output.forward(x);

        sigmoid(x)
    }

    /// Height and width this discriminator accepts.
    pub fn input_size(&self) -> usize {
        self.hr_size
    }

    /// Fail with [SrError::ShapeMismatch] unless `dims` is `[_, _, hr_size, hr_size]`.
    pub fn check_input(&self, dims: [usize; 4]) -> Result<(), SrError> {
        let [_, _, height, width] = dims;
        if height != self.hr_size || width != self.hr_size {
            return Err(SrError::ShapeMismatch(format!(
                "discriminator expects {size}x{size} images, received {height}x{width}",
                size = self.hr_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::Distribution;

    fn small_config() -> DiscriminatorConfig {
        DiscriminatorConfig::new()
            .with_base_channels(4)
            .with_hr_size(32)
            .with_hidden_features(16)
    }

    #[test]
    fn outputs_one_probability_per_image() {
        let device = Default::default();
        let discriminator = small_config().init::<TestBackend>(&device);
        let input =
            Tensor::<TestBackend, 4>::random([3, 3, 32, 32], Distribution::Normal(0.0, 3.0), &device);

        let output = discriminator.forward(input);

        assert_eq!(output.dims(), [3, 1]);
        let values = output.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn head_is_sized_for_non_multiple_of_sixteen() {
        let device = Default::default();
        let config = small_config().with_hr_size(40);
        assert_eq!(config.feature_extent(), 3);

        let discriminator = config.init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 4>::random([1, 3, 40, 40], Distribution::Default, &device);

        assert_eq!(discriminator.forward(input).dims(), [1, 1]);
    }

    #[test]
    fn default_head_matches_training_resolution() {
        assert_eq!(DiscriminatorConfig::new().feature_extent(), 8);
    }

    #[test]
    fn rejects_other_resolutions() {
        let device = Default::default();
        let discriminator = small_config().init::<TestBackend>(&device);

        assert!(discriminator.check_input([1, 3, 32, 32]).is_ok());
        assert!(matches!(
            discriminator.check_input([1, 3, 64, 64]),
            Err(SrError::ShapeMismatch(_))
        ));
    }
}
