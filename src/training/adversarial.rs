use burn::{
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use super::{check_finite, scalar, BatchLosses, BatchPosition, BatchRecord, EpochSummary, TrainingHistory};
use crate::data::{PairLoader, SrBatch};
use crate::frozen::Frozen;
use crate::loss::{AdversarialLoss, AdversarialLossConfig};
use crate::model::{
    Discriminator, DiscriminatorConfig, FeatureExtractor, FeatureExtractorConfig, Generator,
    GeneratorConfig,
};
use crate::visual::{comparison_grid, to_rgb_image, ArtifactSink};
use crate::{SrError, SCALE_FACTOR};

/// Configuration of an adversarial training run.
#[derive(Config)]
pub struct SrganTrainingConfig {
    /// Generator architecture.
    #[config(default = "GeneratorConfig::new()")]
    pub generator: GeneratorConfig,
    /// Discriminator architecture; its `hr_size` must match the data.
    #[config(default = "DiscriminatorConfig::new()")]
    pub discriminator: DiscriminatorConfig,
    /// Truncation of the perceptual feature extractor.
    #[config(default = "FeatureExtractorConfig::new()")]
    pub feature_extractor: FeatureExtractorConfig,
    /// Loss weighting.
    #[config(default = "AdversarialLossConfig::new()")]
    pub loss: AdversarialLossConfig,
    /// Generator optimizer.
    #[config(default = "AdamConfig::new().with_epsilon(1e-8)")]
    pub optimizer_gen: AdamConfig,
    /// Discriminator optimizer.
    #[config(default = "AdamConfig::new().with_epsilon(1e-8)")]
    pub optimizer_disc: AdamConfig,
    /// Generator learning rate.
    #[config(default = 1e-4)]
    pub generator_learning_rate: f64,
    /// Discriminator learning rate.
    #[config(default = 1e-4)]
    pub discriminator_learning_rate: f64,
    /// Number of passes over the training split.
    #[config(default = 15)]
    pub num_epochs: usize,
    /// Images per batch.
    #[config(default = 1)]
    pub batch_size: usize,
    /// Seed of the backend, the split and the shuffling.
    #[config(default = 42)]
    pub seed: u64,
    /// Fraction of the images held out for evaluation.
    #[config(default = 0.05)]
    pub test_split: f64,
    /// Cap on the number of training images.
    pub max_samples: Option<usize>,
    /// Abort the run on a NaN or infinite loss instead of logging a warning.
    #[config(default = true)]
    pub halt_on_non_finite: bool,
    /// Comparison images written by the final evaluation.
    #[config(default = 5)]
    pub num_eval_samples: usize,
}

impl SrganTrainingConfig {
    /// Initialize both trainable networks and their optimizers around `extractor`.
    pub fn init<B: AutodiffBackend>(
        &self,
        extractor: FeatureExtractor<B>,
        device: &B::Device,
    ) -> SrganTrainer<
        B,
        impl Optimizer<Generator<B>, B>,
        impl Optimizer<Discriminator<B>, B>,
    > {
        SrganTrainer::new(
            self.generator.init(device),
            self.discriminator.init(device),
            extractor,
            self.optimizer_gen.init::<B, Generator<B>>(),
            self.optimizer_disc.init::<B, Discriminator<B>>(),
            self.loss.init(device),
        )
        .with_learning_rates(self.generator_learning_rate, self.discriminator_learning_rate)
        .with_halt_on_non_finite(self.halt_on_non_finite)
    }
}

/// Outcome of a generator update.
#[derive(Clone, Debug)]
pub struct GeneratorStep<B: Backend> {
    /// Adversarial term.
    pub adversarial: f32,
    /// Content term.
    pub content: f32,
    /// Combined loss the generator was stepped on.
    pub total: f32,
    /// Output of the generator before its update, cut from the graph.
    pub generated: Frozen<B, 4>,
}

/// Outcome of a discriminator update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiscriminatorStep {
    /// Loss on ground-truth images.
    pub real: f32,
    /// Loss on generated images.
    pub fake: f32,
    /// Combined loss the discriminator was stepped on.
    pub total: f32,
}

/// Alternating generator/discriminator optimization with a frozen feature extractor.
///
/// Each network owns its optimizer. A step only applies the gradients of the network
/// it updates, so the other network and the extractor never move.
pub struct SrganTrainer<B, OG, OD>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    generator: Generator<B>,
    discriminator: Discriminator<B>,
    extractor: FeatureExtractor<B>,
    optim_gen: OG,
    optim_disc: OD,
    loss: AdversarialLoss<B>,
    generator_lr: f64,
    discriminator_lr: f64,
    halt_on_non_finite: bool,
}

impl<B, OG, OD> SrganTrainer<B, OG, OD>
where
    B: AutodiffBackend,
    OG: Optimizer<Generator<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
{
    /// Create a trainer with learning rates of `1e-4` that halts on non-finite losses.
    pub fn new(
        generator: Generator<B>,
        discriminator: Discriminator<B>,
        extractor: FeatureExtractor<B>,
        optim_gen: OG,
        optim_disc: OD,
        loss: AdversarialLoss<B>,
    ) -> Self {
        Self {
            generator,
            discriminator,
            extractor,
            optim_gen,
            optim_disc,
            loss,
            generator_lr: 1e-4,
            discriminator_lr: 1e-4,
            halt_on_non_finite: true,
        }
    }

    /// Set the generator and discriminator learning rates.
    pub fn with_learning_rates(mut self, generator: f64, discriminator: f64) -> Self {
        self.generator_lr = generator;
        self.discriminator_lr = discriminator;
        self
    }

    /// Whether a NaN or infinite loss aborts the run.
    pub fn with_halt_on_non_finite(mut self, halt: bool) -> Self {
        self.halt_on_non_finite = halt;
        self
    }

    /// Generate from the low-resolution side and step the generator on
    /// `content + λ·adversarial`.
    ///
    /// The adversarial term is taken on the live output so its gradient reaches the
    /// generator through the discriminator; only the generator's gradients are applied.
    pub fn generator_step(
        &mut self,
        position: BatchPosition,
        batch: &SrBatch<B>,
    ) -> Result<GeneratorStep<B>, SrError> {
        let generated = self.generator.forward(batch.low_res.clone());
        let frozen = Frozen::new(generated.clone());

        let loss = self.loss.generator(
            &self.discriminator,
            &self.extractor,
            generated,
            batch.high_res.clone(),
        );
        let total = scalar(&loss.total);
        check_finite(position, "generator", total, self.halt_on_non_finite)?;

        let grads = loss.total.backward();
        let grads = GradientsParams::from_grads(grads, &self.generator);
        self.generator = self
            .optim_gen
            .step(self.generator_lr, self.generator.clone(), grads);

        Ok(GeneratorStep {
            adversarial: scalar(&loss.adversarial),
            content: scalar(&loss.content),
            total,
            generated: frozen,
        })
    }

    /// Step the discriminator on ground truth against frozen generated images.
    pub fn discriminator_step(
        &mut self,
        position: BatchPosition,
        high_res: Tensor<B, 4>,
        generated: &Frozen<B, 4>,
    ) -> Result<DiscriminatorStep, SrError> {
        let loss = self.loss.discriminator(&self.discriminator, high_res, generated);
        let total = scalar(&loss.total);
        check_finite(position, "discriminator", total, self.halt_on_non_finite)?;

        let grads = loss.total.backward();
        let grads = GradientsParams::from_grads(grads, &self.discriminator);
        self.discriminator =
            self.optim_disc
                .step(self.discriminator_lr, self.discriminator.clone(), grads);

        Ok(DiscriminatorStep {
            real: scalar(&loss.real),
            fake: scalar(&loss.fake),
            total,
        })
    }

    /// Validate `batch`, then run the generator step followed by the discriminator step.
    pub fn train_batch(
        &mut self,
        position: BatchPosition,
        batch: &SrBatch<B>,
    ) -> Result<(BatchLosses, Frozen<B, 4>), SrError> {
        batch.validate(SCALE_FACTOR)?;
        self.discriminator.check_input(batch.high_res.dims())?;

        let gen = self.generator_step(position, batch)?;
        let disc = self.discriminator_step(position, batch.high_res.clone(), &gen.generated)?;

        let losses = BatchLosses {
            gen_adversarial: gen.adversarial,
            gen_content: gen.content,
            gen_total: gen.total,
            disc_real: disc.real,
            disc_fake: disc.fake,
            disc_total: disc.total,
        };
        Ok((losses, gen.generated))
    }

    /// Train for `num_epochs` over `loader`.
    ///
    /// After every epoch a comparison of the last batch is written to `sink` as
    /// `epoch_{n}`, built from the generator output already computed for that batch.
    /// The first error ends the run.
    pub fn fit(
        &mut self,
        loader: &PairLoader<B>,
        num_epochs: usize,
        mut sink: Option<&mut dyn ArtifactSink>,
    ) -> Result<TrainingHistory, SrError> {
        let mut history = TrainingHistory::default();
        let num_batches = loader.num_batches();

        for epoch in 0..num_epochs {
            let epoch_start = history.batches.len();
            let mut last = None;

            for (index, batch) in loader.iter(epoch).enumerate() {
                let batch = batch?;
                let position = BatchPosition {
                    epoch,
                    batch: index,
                };
                let (losses, generated) = self.train_batch(position, &batch)?;

                log::info!(
                    "[Epoch {epoch}/{num_epochs}] [Batch {index}/{num_batches}] [D loss: {}] [G loss: {}]",
                    losses.disc_total,
                    losses.gen_total
                );
                history.batches.push(BatchRecord { position, losses });
                last = Some((batch, generated));
            }

            if let (Some(sink), Some((batch, generated))) = (sink.as_deref_mut(), last) {
                let grid = comparison_grid(
                    batch.low_res.inner(),
                    generated.into_tensor().inner(),
                    batch.high_res.inner(),
                );
                sink.write(&format!("epoch_{epoch}"), &to_rgb_image(grid)?)?;
            }

            if let Some(summary) = EpochSummary::from_records(epoch, &history.batches[epoch_start..]) {
                log::info!(
                    "Epoch {epoch} done: mean G loss {:.5}, mean D loss {:.5}",
                    summary.mean_gen_loss,
                    summary.mean_disc_loss
                );
                history.epochs.push(summary);
            }
        }

        Ok(history)
    }

    /// The generator being trained.
    pub fn generator(&self) -> &Generator<B> {
        &self.generator
    }

    /// The discriminator being trained.
    pub fn discriminator(&self) -> &Discriminator<B> {
        &self.discriminator
    }

    /// The frozen feature extractor.
    pub fn extractor(&self) -> &FeatureExtractor<B> {
        &self.extractor
    }

    /// Take the trained generator and discriminator.
    pub fn into_models(self) -> (Generator<B>, Discriminator<B>) {
        (self.generator, self.discriminator)
    }
}
