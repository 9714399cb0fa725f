mod adversarial;
mod params;
mod regression;

pub use adversarial::*;
pub use params::*;
pub use regression::*;

use burn::prelude::*;

use crate::SrError;

/// Where in a run a batch is trained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPosition {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Zero-based batch index within the epoch.
    pub batch: usize,
}

/// Scalar losses of one adversarial batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchLosses {
    /// BCE of the discriminator verdict on generated images against "real".
    pub gen_adversarial: f32,
    /// Feature-space MSE between generated and ground-truth images.
    pub gen_content: f32,
    /// `gen_content + λ·gen_adversarial`, the loss the generator is stepped on.
    pub gen_total: f32,
    /// BCE of the verdict on ground-truth images against "real".
    pub disc_real: f32,
    /// BCE of the verdict on frozen generated images against "fake".
    pub disc_fake: f32,
    /// `(disc_real + disc_fake) / 2`, the loss the discriminator is stepped on.
    pub disc_total: f32,
}

/// Losses of one batch of a run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchRecord {
    /// Position of the batch.
    pub position: BatchPosition,
    /// Its losses.
    pub losses: BatchLosses,
}

/// Per-epoch aggregate of the adversarial loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpochSummary {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Number of batches trained.
    pub num_batches: usize,
    /// Mean combined generator loss over the epoch.
    pub mean_gen_loss: f32,
    /// Mean combined discriminator loss over the epoch.
    pub mean_disc_loss: f32,
    /// Losses of the last batch.
    pub last: BatchLosses,
}

impl EpochSummary {
    fn from_records(epoch: usize, records: &[BatchRecord]) -> Option<Self> {
        let last = records.last()?.losses;
        let count = records.len() as f32;
        let (gen, disc) = records.iter().fold((0.0, 0.0), |(gen, disc), record| {
            (gen + record.losses.gen_total, disc + record.losses.disc_total)
        });

        Some(Self {
            epoch,
            num_batches: records.len(),
            mean_gen_loss: gen / count,
            mean_disc_loss: disc / count,
            last,
        })
    }
}

/// Everything the adversarial loop reported during [fit](SrganTrainer::fit).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingHistory {
    /// Every trained batch, in order.
    pub batches: Vec<BatchRecord>,
    /// One entry per epoch that trained at least one batch.
    pub epochs: Vec<EpochSummary>,
}

impl TrainingHistory {
    /// Combined generator and discriminator losses of every batch, in order.
    pub fn loss_sequence(&self) -> Vec<(f32, f32)> {
        self.batches
            .iter()
            .map(|record| (record.losses.gen_total, record.losses.disc_total))
            .collect()
    }
}

fn scalar<B: Backend>(loss: &Tensor<B, 1>) -> f32 {
    loss.clone().into_scalar().elem::<f32>()
}

/// Fail, or warn and carry on, when a loss is NaN or infinite.
fn check_finite(
    position: BatchPosition,
    loss: &'static str,
    value: f32,
    halt: bool,
) -> Result<(), SrError> {
    if value.is_finite() {
        return Ok(());
    }

    if halt {
        return Err(SrError::NonFiniteLoss {
            epoch: position.epoch,
            batch: position.batch,
            loss,
            value,
        });
    }

    log::warn!(
        "Non-finite {loss} loss {value} at epoch {} batch {}, stepping anyway",
        position.epoch,
        position.batch
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn losses(gen_total: f32, disc_total: f32) -> BatchLosses {
        BatchLosses {
            gen_adversarial: 0.0,
            gen_content: gen_total,
            gen_total,
            disc_real: disc_total,
            disc_fake: disc_total,
            disc_total,
        }
    }

    fn record(batch: usize, gen_total: f32, disc_total: f32) -> BatchRecord {
        BatchRecord {
            position: BatchPosition { epoch: 0, batch },
            losses: losses(gen_total, disc_total),
        }
    }

    #[test]
    fn epoch_summary_keeps_mean_and_last() {
        let records = [record(0, 1.0, 0.5), record(1, 3.0, 0.25)];

        let summary = EpochSummary::from_records(0, &records).unwrap();

        assert_eq!(summary.num_batches, 2);
        assert_eq!(summary.mean_gen_loss, 2.0);
        assert_eq!(summary.mean_disc_loss, 0.375);
        assert_eq!(summary.last, losses(3.0, 0.25));
    }

    #[test]
    fn empty_epoch_has_no_summary() {
        assert!(EpochSummary::from_records(0, &[]).is_none());
    }

    #[test]
    fn non_finite_loss_halts_or_warns() {
        let position = BatchPosition { epoch: 2, batch: 5 };

        assert!(check_finite(position, "generator", 0.3, true).is_ok());
        assert!(check_finite(position, "generator", f32::NAN, false).is_ok());
        assert!(matches!(
            check_finite(position, "discriminator", f32::INFINITY, true),
            Err(SrError::NonFiniteLoss {
                epoch: 2,
                batch: 5,
                loss: "discriminator",
                ..
            })
        ));
    }
}
