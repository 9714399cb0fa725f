use std::path::PathBuf;

use burn::config::Config;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::training::{FsrcnnTrainingConfig, SrganTrainingConfig};
use crate::SrError;

/// Command line of the `srgan` binary.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Action to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available actions.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the adversarial generator/discriminator pair.
    TrainSrgan {
        /// Shared run options.
        #[command(flatten)]
        common: RunArgs,
        /// PyTorch `vgg19` state dict for the perceptual feature extractor.
        #[arg(long)]
        vgg_weights: Option<PathBuf>,
    },
    /// Train the FSRCNN baseline.
    TrainFsrcnn {
        /// Shared run options.
        #[command(flatten)]
        common: RunArgs,
    },
    /// Evaluate a trained model on its held-out split.
    Evaluate {
        /// Which model to load from the artifact directory.
        #[arg(long, value_enum)]
        model: ModelKind,
        /// Directory of training images.
        #[arg(long)]
        data_dir: PathBuf,
        /// Directory holding `config.json` and the checkpoints.
        #[arg(long, default_value = "/tmp/srgan")]
        artifact_dir: PathBuf,
    },
}

/// Trained model families.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    /// SRGAN generator.
    Srgan,
    /// FSRCNN baseline.
    Fsrcnn,
}

/// Options shared by both training commands.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory of training images.
    #[arg(long)]
    pub data_dir: PathBuf,
    /// Where logs, images, checkpoints and `config.json` are written.
    #[arg(long, default_value = "/tmp/srgan")]
    pub artifact_dir: PathBuf,
    /// JSON configuration to start from instead of the defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Number of epochs.
    #[arg(long)]
    pub num_epochs: Option<usize>,
    /// Images per batch.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Random seed.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Cap on the number of training images.
    #[arg(long)]
    pub max_samples: Option<usize>,
    /// Learning rate; both networks for SRGAN.
    #[arg(long)]
    pub learning_rate: Option<f64>,
    /// Log non-finite losses instead of aborting.
    #[arg(long)]
    pub continue_on_non_finite: bool,
}

fn load_or_default<C: Config>(path: Option<&PathBuf>, default: impl FnOnce() -> C) -> Result<C, SrError> {
    match path {
        Some(path) => C::load(path)
            .map_err(|err| SrError::Config(format!("{}: {err:?}", path.display()))),
        None => Ok(default()),
    }
}

impl RunArgs {
    /// Adversarial configuration with the command line overrides applied.
    pub fn srgan_config(&self) -> Result<SrganTrainingConfig, SrError> {
        let mut config = load_or_default(self.config.as_ref(), SrganTrainingConfig::new)?;

        if let Some(num_epochs) = self.num_epochs {
            config.num_epochs = num_epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(lr) = self.learning_rate {
            config.generator_learning_rate = lr;
            config.discriminator_learning_rate = lr;
        }
        if self.max_samples.is_some() {
            config.max_samples = self.max_samples;
        }
        if self.continue_on_non_finite {
            config.halt_on_non_finite = false;
        }

        Ok(config)
    }

    /// Baseline configuration with the command line overrides applied.
    pub fn fsrcnn_config(&self) -> Result<FsrcnnTrainingConfig, SrError> {
        let mut config = load_or_default(self.config.as_ref(), FsrcnnTrainingConfig::new)?;

        if let Some(num_epochs) = self.num_epochs {
            config.num_epochs = num_epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(lr) = self.learning_rate {
            config.learning_rate = lr;
        }
        if self.max_samples.is_some() {
            config.max_samples = self.max_samples;
        }
        if self.continue_on_non_finite {
            config.halt_on_non_finite = false;
        }

        Ok(config)
    }
}
