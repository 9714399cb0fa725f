use thiserror::Error;

/// Error type for training, evaluation and data loading.
///
/// Every variant is fatal for the run that produced it.
#[derive(Error, Debug)]
pub enum SrError {
    /// A tensor does not have the extent a network or the scale factor requires.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A loss became NaN or infinite.
    #[error("non-finite {loss} loss ({value}) at epoch {epoch}, batch {batch}")]
    NonFiniteLoss {
        /// Epoch index.
        epoch: usize,
        /// Batch index inside the epoch.
        batch: usize,
        /// Name of the offending loss.
        loss: &'static str,
        /// Observed value.
        value: f32,
    },

    /// The data source could not produce the sample at this index.
    #[error("sample {index} could not be loaded")]
    MissingSample {
        /// Dataset index.
        index: usize,
    },

    /// Image decoding or encoding error.
    #[error("image error: `{0}`")]
    Image(#[from] image::ImageError),

    /// I/O operation error.
    #[error("I/O error: `{0}`")]
    Io(#[from] std::io::Error),

    /// Model record could not be written or read.
    #[error("checkpoint error: `{0}`")]
    Checkpoint(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: `{0}`")]
    Config(String),
}
