use burn::{
    nn::loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig, MseLoss, Reduction},
    prelude::*,
};

use crate::frozen::Frozen;
use crate::model::{Discriminator, FeatureExtractor};

/// Probabilities are kept this far from 0 and 1 before taking logarithms.
const PROBABILITY_EPSILON: f64 = 1e-7;

/// Configuration to create an [AdversarialLoss](AdversarialLoss).
#[derive(Config, Debug)]
pub struct AdversarialLossConfig {
    /// Weight λ of the adversarial term in `content + λ·adversarial`.
    #[config(default = 1e-3)]
    pub adversarial_weight: f64,
}

/// Generator loss terms of one batch.
#[derive(Clone, Debug)]
pub struct GeneratorLoss<B: Backend> {
    /// BCE between the discriminator's verdict on generated images and "real".
    pub adversarial: Tensor<B, 1>,
    /// MSE between extractor features of generated and ground-truth images.
    pub content: Tensor<B, 1>,
    /// `content + λ·adversarial`.
    pub total: Tensor<B, 1>,
}

/// Discriminator loss terms of one batch.
#[derive(Clone, Debug)]
pub struct DiscriminatorLoss<B: Backend> {
    /// BCE between the verdict on ground-truth images and "real".
    pub real: Tensor<B, 1>,
    /// BCE between the verdict on generated images and "fake".
    pub fake: Tensor<B, 1>,
    /// `(real + fake) / 2`.
    pub total: Tensor<B, 1>,
}

/// Loss composition for the adversarial training loop.
#[derive(Debug)]
pub struct AdversarialLoss<B: Backend> {
    bce: BinaryCrossEntropyLoss<B>,
    mse: MseLoss,
    adversarial_weight: f64,
}

impl AdversarialLossConfig {
    /// Initialize the [adversarial loss](AdversarialLoss).
    pub fn init<B: Backend>(&self, device: &B::Device) -> AdversarialLoss<B> {
        AdversarialLoss {
            bce: BinaryCrossEntropyLossConfig::new().init(device),
            mse: MseLoss::new(),
            adversarial_weight: self.adversarial_weight,
        }
    }
}

impl<B: Backend> AdversarialLoss<B> {
    /// Loss of the generator for `generated`, which must still be attached to the
    /// generator's graph.
    ///
    /// Ground-truth features are frozen before the distance is taken, so only the
    /// generated side carries gradient.
    pub fn generator(
        &self,
        discriminator: &Discriminator<B>,
        extractor: &FeatureExtractor<B>,
        generated: Tensor<B, 4>,
        high_res: Tensor<B, 4>,
    ) -> GeneratorLoss<B> {
        let verdict = discriminator.forward(generated.clone());
        let adversarial = self.bce(verdict, true);

        let generated_features = extractor.extract(generated);
        let real_features = Frozen::new(extractor.extract(high_res));
        let content = self.content(generated_features, &real_features);

        self.combine(content, adversarial)
    }

    /// Loss of the discriminator on ground truth and a frozen generator output.
    pub fn discriminator(
        &self,
        discriminator: &Discriminator<B>,
        high_res: Tensor<B, 4>,
        generated: &Frozen<B, 4>,
    ) -> DiscriminatorLoss<B> {
        let real = self.bce(discriminator.forward(high_res), true);
        let fake = self.bce(discriminator.forward(generated.tensor()), false);
        let total = real.clone().add(fake.clone()).div_scalar(2.0);

        DiscriminatorLoss { real, fake, total }
    }

    /// Feature-space mean squared error against a frozen target.
    pub fn content(
        &self,
        generated_features: Tensor<B, 4>,
        real_features: &Frozen<B, 4>,
    ) -> Tensor<B, 1> {
        self.mse
            .forward(generated_features, real_features.tensor(), Reduction::Mean)
    }

    /// `content + λ·adversarial`.
    pub fn combine(&self, content: Tensor<B, 1>, adversarial: Tensor<B, 1>) -> GeneratorLoss<B> {
        let total = content
            .clone()
            .add(adversarial.clone().mul_scalar(self.adversarial_weight));

        GeneratorLoss {
            adversarial,
            content,
            total,
        }
    }

    /// The weight λ of the adversarial term.
    pub fn adversarial_weight(&self) -> f64 {
        self.adversarial_weight
    }

    /// Binary cross-entropy of `[batch_size, 1]` probabilities against an all-real
    /// or all-fake target.
    pub fn bce(&self, probabilities: Tensor<B, 2>, real: bool) -> Tensor<B, 1> {
        let device = probabilities.device();
        let [batch_size, _] = probabilities.dims();
        let probabilities = probabilities
            .reshape([batch_size])
            .clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
        let targets = match real {
            true => Tensor::<B, 1, Int>::ones([batch_size], &device),
            false => Tensor::<B, 1, Int>::zeros([batch_size], &device),
        };

        self.bce.forward(probabilities, targets)
    }
}

/// Pixel-space mean squared error, the only objective of the regression loop.
pub fn pixel_loss<B: Backend>(predicted: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    MseLoss::new().forward(predicted, target, Reduction::Mean)
}
