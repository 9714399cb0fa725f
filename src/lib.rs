#![warn(missing_docs)]
#![recursion_limit = "256"]

//! Single-image super-resolution with burn.
//!
//! Two independent models upscale a low-resolution image by a factor of four:
//! an adversarial generator/discriminator pair trained with a perceptual content
//! loss (SRGAN), and a compact convolutional regressor trained with a pixel loss
//! (FSRCNN).

/// Checkpoint persistence for trained networks.
pub mod checkpoint;

/// Command line definition.
pub mod cli;

/// Paired low/high resolution data.
pub mod data;

/// Crate error type.
pub mod error;

/// End-to-end training and evaluation runs.
pub mod experiment;

/// Tensors cut from the autodiff graph.
pub mod frozen;

/// Log installation.
pub mod logging;

/// Loss composition for both training loops.
pub mod loss;

/// Network definitions.
pub mod model;

/// Training loops.
pub mod training;

/// Denormalization, comparison images and evaluation.
pub mod visual;

pub use error::SrError;

/// Spatial upscaling factor shared by every model and dataset.
pub const SCALE_FACTOR: usize = 4;

/// Backend for test cases
#[cfg(test)]
pub type TestBackend = burn::backend::NdArray<f32>;

/// Backend for autodiff test cases
#[cfg(test)]
pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
