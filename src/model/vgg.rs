use std::path::Path;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    record::{FullPrecisionSettings, Recorder},
    tensor::{activation::relu, backend::AutodiffBackend},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

use crate::SrError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layer {
    Conv(usize, usize),
    Relu,
    Pool,
}

use Layer::{Conv, Pool, Relu};

/// `vgg19.features` as a flat layer sequence.
#[rustfmt::skip]
const VGG19_FEATURES: [Layer; 37] = [
    Conv(3, 64), Relu, Conv(64, 64), Relu, Pool,
    Conv(64, 128), Relu, Conv(128, 128), Relu, Pool,
    Conv(128, 256), Relu, Conv(256, 256), Relu, Conv(256, 256), Relu, Conv(256, 256), Relu, Pool,
    Conv(256, 512), Relu, Conv(512, 512), Relu, Conv(512, 512), Relu, Conv(512, 512), Relu, Pool,
    Conv(512, 512), Relu, Conv(512, 512), Relu, Conv(512, 512), Relu, Conv(512, 512), Relu, Pool,
];

/// Configuration to create a [FeatureExtractor](FeatureExtractor).
#[derive(Config, Debug)]
pub struct FeatureExtractorConfig {
    /// Number of leading `vgg19.features` layers to keep.
    #[config(default = 11)]
    pub depth: usize,
}

/// Truncated VGG19 used to compare images in feature space.
///
/// The default depth stops after the first convolution of the third stage: shallow
/// edge and texture features rather than semantic ones. Build it with
/// [`FeatureExtractorConfig::init_frozen`] or [`FeatureExtractorConfig::load_pretrained`]
/// so no gradient is ever computed for its weights.
#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
    depth: usize,
}

impl FeatureExtractorConfig {
    /// Initialize a randomly weighted extractor with trainable parameters.
    ///
    /// # Panics
    ///
    /// Panics if `depth` is zero or exceeds the 37 layers of `vgg19.features`.
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureExtractor<B> {
        assert!(
            (1..=VGG19_FEATURES.len()).contains(&self.depth),
            "Feature extractor depth must be in 1..={}, received {}",
            VGG19_FEATURES.len(),
            self.depth
        );

        let convs = self
            .layers()
            .iter()
            .filter_map(|layer| match layer {
                Conv(channels_in, channels_out) => Some(
                    Conv2dConfig::new([*channels_in, *channels_out], [3, 3])
                        .with_padding(PaddingConfig2d::Explicit(1, 1))
                        .init(device),
                ),
                _ => None,
            })
            .collect();

        FeatureExtractor {
            convs,
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            depth: self.depth,
        }
    }

    /// Initialize a randomly weighted extractor whose parameters never require gradients.
    pub fn init_frozen<B: AutodiffBackend>(&self, device: &B::Device) -> FeatureExtractor<B> {
        self.init(device).no_grad()
    }

    /// Load torchvision `vgg19` weights from a PyTorch state dict and freeze them.
    pub fn load_pretrained<B: AutodiffBackend>(
        &self,
        path: &Path,
        device: &B::Device,
    ) -> Result<FeatureExtractor<B>, SrError> {
        let mut args = LoadArgs::new(path.to_path_buf());
        let conv_indices = self
            .layers()
            .iter()
            .enumerate()
            .filter(|(_, layer)| matches!(layer, Conv(..)))
            .map(|(index, _)| index);
        for (position, index) in conv_indices.enumerate() {
            args = args.with_key_remap(
                &format!(r"^features\.{index}\.(.+)$"),
                &format!("convs.{position}.$1"),
            );
        }

        let record = PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(args, device)
            .map_err(|err| SrError::Checkpoint(format!("{err:?}")))?;

        log::info!(
            "Loaded pretrained VGG19 features (depth {}) from {}",
            self.depth,
            path.display()
        );

        Ok(self.init::<B>(device).load_record(record).no_grad())
    }

    fn layers(&self) -> &'static [Layer] {
        &VGG19_FEATURES[..self.depth.min(VGG19_FEATURES.len())]
    }
}

impl<B: Backend> FeatureExtractor<B> {
    /// # Shapes
    ///
    /// - input: `[batch_size, 3, height, width]`
    /// - output: `[batch_size, channels, height / 2^pools, width / 2^pools]`
    pub fn extract(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut convs = self.convs.iter();
        let mut x = images;

        for layer in &VGG19_FEATURES[..self.depth] {
            x = match layer {
                Conv(..) => match convs.next() {
                    Some(conv) => conv.forward(x),
                    None => x,
                },
                Relu => relu(x),
                Pool => self.pool.forward(x),
            };
        }

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{training::ParamDigest, TestAutodiffBackend, TestBackend};
    use burn::{optim::GradientsParams, tensor::Distribution};

    #[test]
    fn default_depth_stops_at_the_third_stage() {
        let device = Default::default();
        let extractor = FeatureExtractorConfig::new().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random([2, 3, 16, 16], Distribution::Default, &device);

        assert_eq!(extractor.convs.len(), 5);
        assert_eq!(extractor.extract(images).dims(), [2, 256, 4, 4]);
    }

    #[test]
    fn identical_inputs_give_identical_features() {
        let device = Default::default();
        let extractor = FeatureExtractorConfig::new().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::random([1, 3, 8, 8], Distribution::Default, &device);

        let first = extractor.extract(images.clone()).into_data();
        let second = extractor.extract(images).into_data();

        first.assert_approx_eq(&second, 6);
    }

    #[test]
    fn frozen_extractor_receives_no_gradients() {
        let device = Default::default();
        let extractor = FeatureExtractorConfig::new().init_frozen::<TestAutodiffBackend>(&device);
        let images =
            Tensor::<TestAutodiffBackend, 4>::random([1, 3, 8, 8], Distribution::Default, &device)
                .require_grad();
        let before = ParamDigest::of(&extractor);

        let loss = extractor.extract(images.clone()).powf_scalar(2.0).mean();
        let grads = loss.backward();

        assert!(images.grad(&grads).is_some());
        let grads = GradientsParams::from_grads(grads, &extractor);
        assert!(grads.is_empty());
        assert_eq!(before, ParamDigest::of(&extractor));
    }

    #[test]
    #[should_panic]
    fn depth_beyond_vgg19_is_rejected() {
        let device = Default::default();
        FeatureExtractorConfig::new()
            .with_depth(38)
            .init::<TestBackend>(&device);
    }
}
