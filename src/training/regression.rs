use std::marker::PhantomData;

use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use super::{check_finite, scalar, BatchPosition};
use crate::data::{PairLoader, SrBatch};
use crate::loss::pixel_loss;
use crate::model::{Fsrcnn, FsrcnnConfig};
use crate::visual::{comparison_grid, to_rgb_image, ArtifactSink, Upscaler};
use crate::{SrError, SCALE_FACTOR};

/// Configuration of a pixel-loss training run.
#[derive(Config)]
pub struct FsrcnnTrainingConfig {
    /// Network architecture.
    #[config(default = "FsrcnnConfig::new()")]
    pub model: FsrcnnConfig,
    /// Optimizer.
    #[config(default = "AdamConfig::new().with_epsilon(1e-8)")]
    pub optimizer: AdamConfig,
    /// Learning rate.
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// Number of passes over the training split.
    #[config(default = 15)]
    pub num_epochs: usize,
    /// Images per batch.
    #[config(default = 1)]
    pub batch_size: usize,
    /// Height and width of the high-resolution images.
    #[config(default = 128)]
    pub hr_size: usize,
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

impl FsrcnnTrainingConfig {
    /// Initialize the network and its optimizer.
    pub fn init<B: AutodiffBackend>(
        &self,
        device: &B::Device,
    ) -> RegressionTrainer<B, Fsrcnn<B>, impl Optimizer<Fsrcnn<B>, B>> {
        RegressionTrainer::new(
            self.model.init(device),
            self.optimizer.init::<B, Fsrcnn<B>>(),
            self.learning_rate,
        )
        .with_halt_on_non_finite(self.halt_on_non_finite)
    }
}

/// Pixel loss of one batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegressionRecord {
    /// Position of the batch.
    pub position: BatchPosition,
    /// Mean squared error against the high-resolution target.
    pub loss: f32,
}

/// Per-epoch aggregate of the pixel-loss loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegressionEpoch {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Loss of the last batch.
    pub last_loss: f32,
    /// Mean loss over the epoch.
    pub mean_loss: f32,
}

/// Everything the pixel-loss loop reported.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegressionHistory {
    /// Every trained batch, in order.
    pub batches: Vec<RegressionRecord>,
    /// One entry per epoch that trained at least one batch.
    pub epochs: Vec<RegressionEpoch>,
}

/// Single-objective loop: one forward, backward and step per batch on the pixel loss.
pub struct RegressionTrainer<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Upscaler<B>,
    O: Optimizer<M, B>,
{
    model: M,
    optim: O,
    learning_rate: f64,
    halt_on_non_finite: bool,
    backend: PhantomData<B>,
}

impl<B, M, O> RegressionTrainer<B, M, O>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Upscaler<B>,
    O: Optimizer<M, B>,
{
    /// Create a trainer that halts on non-finite losses.
    pub fn new(model: M, optim: O, learning_rate: f64) -> Self {
        Self {
            model,
            optim,
            learning_rate,
            halt_on_non_finite: true,
            backend: PhantomData,
        }
    }

    /// Whether a NaN or infinite loss aborts the run.
    pub fn with_halt_on_non_finite(mut self, halt: bool) -> Self {
        self.halt_on_non_finite = halt;
        self
    }

    /// Validate `batch` and step the model on its pixel loss. Returns the loss and
    /// the prediction made before the step.
    pub fn train_batch(
        &mut self,
        position: BatchPosition,
        batch: &SrBatch<B>,
    ) -> Result<(f32, Tensor<B::InnerBackend, 4>), SrError> {
        batch.validate(SCALE_FACTOR)?;

        let predicted = self.model.upscale(batch.low_res.clone());
        let loss = pixel_loss(predicted.clone(), batch.high_res.clone());
        let value = scalar(&loss);
        check_finite(position, "pixel", value, self.halt_on_non_finite)?;

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(self.learning_rate, self.model.clone(), grads);

        Ok((value, predicted.inner()))
    }

    /// Train for `num_epochs` over `loader`, writing `epoch_{n}` to `sink` after every
    /// epoch from the last batch's prediction.
    pub fn fit(
        &mut self,
        loader: &PairLoader<B>,
        num_epochs: usize,
        mut sink: Option<&mut dyn ArtifactSink>,
    ) -> Result<RegressionHistory, SrError> {
        let mut history = RegressionHistory::default();

        for epoch in 0..num_epochs {
            let mut sum = 0.0;
            let mut count = 0;
            let mut last = None;

            for (index, batch) in loader.iter(epoch).enumerate() {
                let batch = batch?;
                let position = BatchPosition {
                    epoch,
                    batch: index,
                };
                let (loss, predicted) = self.train_batch(position, &batch)?;

                sum += loss;
                count += 1;
                history.batches.push(RegressionRecord { position, loss });
                last = Some((batch, predicted, loss));
            }

            let Some((batch, predicted, last_loss)) = last else {
                continue;
            };

            if let Some(sink) = sink.as_deref_mut() {
                let grid = comparison_grid(batch.low_res.inner(), predicted, batch.high_res.inner());
                sink.write(&format!("epoch_{epoch}"), &to_rgb_image(grid)?)?;
            }

            let summary = RegressionEpoch {
                epoch,
                last_loss,
                mean_loss: sum / count as f32,
            };
            log::info!(
                "Epoch [{}/{num_epochs}], Loss: {:.4} (mean {:.4})",
                epoch + 1,
                summary.last_loss,
                summary.mean_loss
            );
            history.epochs.push(summary);
        }

        Ok(history)
    }

    /// The model being trained.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Take the trained model.
    pub fn into_model(self) -> M {
        self.model
    }
}
