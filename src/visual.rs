use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};
use image::RgbImage;

use crate::data::{PairLoader, IMAGENET_MEAN, IMAGENET_STD};
use crate::SrError;

/// A model that maps a normalized low-resolution batch to a high-resolution one.
pub trait Upscaler<B: Backend> {
    /// `[N, C, h, w]` to `[N, C, h * scale, w * scale]`.
    fn upscale(&self, low_res: Tensor<B, 4>) -> Tensor<B, 4>;
}

/// Destination of the comparison images written during training and evaluation.
pub trait ArtifactSink {
    /// Store `image` under `name`.
    fn write(&mut self, name: &str, image: &RgbImage) -> Result<(), SrError>;
}

/// Writes each artifact as `<dir>/<name>.png`.
#[derive(Clone, Debug)]
pub struct ImageDirSink {
    dir: PathBuf,
}

impl ImageDirSink {
    /// Create the sink, creating `dir` if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, SrError> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }
}

impl ArtifactSink for ImageDirSink {
    fn write(&mut self, name: &str, image: &RgbImage) -> Result<(), SrError> {
        let path = self.dir.join(format!("{name}.png"));
        image.save(&path)?;
        log::info!("Saved {}", path.display());
        Ok(())
    }
}

/// Undo the per-channel normalization: `x * std + mean`.
pub fn denormalize<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = images.device();
    let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
    let std = Tensor::<B, 1>::from_floats(IMAGENET_STD, &device).reshape([1, 3, 1, 1]);

    images.mul(std).add(mean)
}

/// Nearest-neighbor upsampled input, generated image and ground truth side by side,
/// denormalized and clamped to `[0, 1]`.
///
/// # Shapes
///
/// - low_res: `[N, 3, h, w]`
/// - generated, high_res: `[N, 3, h * scale, w * scale]`
/// - output: `[N, 3, h * scale, 3 * w * scale]`
pub fn comparison_grid<B: Backend>(
    low_res: Tensor<B, 4>,
    generated: Tensor<B, 4>,
    high_res: Tensor<B, 4>,
) -> Tensor<B, 4> {
    let [_, _, height, width] = high_res.dims();
    let upsampled = interpolate(
        low_res,
        [height, width],
        InterpolateOptions::new(InterpolateMode::Nearest),
    );

    let grid = Tensor::cat(vec![upsampled, generated, high_res], 3);
    denormalize(grid).clamp(0.0, 1.0)
}

/// Lay out a `[N, 3, H, W]` batch in display range as one image, one row per item.
pub fn to_rgb_image<B: Backend>(images: Tensor<B, 4>) -> Result<RgbImage, SrError> {
    let [batch_size, channels, height, width] = images.dims();
    if channels != 3 {
        return Err(SrError::ShapeMismatch(format!(
            "RGB images need 3 channels, received {channels}"
        )));
    }

    let pixels = images
        .swap_dims(0, 1)
        .reshape([3, batch_size * height, width])
        .permute([1, 2, 0])
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| SrError::ShapeMismatch(format!("{err:?}")))?
        .into_iter()
        .map(|value| (value.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();

    RgbImage::from_raw(width as u32, (batch_size * height) as u32, pixels).ok_or_else(|| {
        SrError::ShapeMismatch("pixel buffer does not match the image size".to_string())
    })
}

/// Peak signal-to-noise ratio in dB between two batches in display range.
pub fn psnr<B: Backend>(predicted: Tensor<B, 4>, target: Tensor<B, 4>) -> f64 {
    let mse = predicted
        .sub(target)
        .powf_scalar(2.0)
        .mean()
        .into_scalar()
        .elem::<f64>();

    -10.0 * mse.log10()
}

/// Result of an evaluation pass.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationReport {
    /// Number of pairs evaluated.
    pub num_items: usize,
    /// Mean PSNR per batch, in dB, on denormalized and clamped images.
    pub mean_psnr: f64,
    /// Number of comparison images written.
    pub samples_written: usize,
}

/// Run `model` over every batch of `loader` in order, writing a comparison image for
/// the first `num_samples` batches.
///
/// The model should already be in inference mode, e.g. obtained with
/// [`AutodiffModule::valid`](burn::module::AutodiffModule::valid).
pub fn evaluate<B: Backend, M: Upscaler<B>>(
    model: &M,
    loader: &PairLoader<B>,
    num_samples: usize,
    mut sink: Option<&mut dyn ArtifactSink>,
) -> Result<EvaluationReport, SrError> {
    let mut psnr_sum = 0.0;
    let mut num_batches = 0;
    let mut num_items = 0;
    let mut samples_written = 0;

    for batch in loader.iter(0) {
        let batch = batch?;
        batch.validate(crate::SCALE_FACTOR)?;
        let generated = model.upscale(batch.low_res.clone());

        psnr_sum += psnr(
            denormalize(generated.clone()).clamp(0.0, 1.0),
            denormalize(batch.high_res.clone()).clamp(0.0, 1.0),
        );
        num_batches += 1;
        num_items += batch.len();

        if let Some(sink) = sink.as_deref_mut() {
            if samples_written < num_samples {
                let grid = comparison_grid(batch.low_res, generated, batch.high_res);
                sink.write(&format!("sample_{samples_written}"), &to_rgb_image(grid)?)?;
                samples_written += 1;
            }
        }
    }

    let mean_psnr = match num_batches {
        0 => 0.0,
        n => psnr_sum / n as f64,
    };
    log::info!("Evaluated {num_items} images, mean PSNR {mean_psnr:.3} dB");

    Ok(EvaluationReport {
        num_items,
        mean_psnr,
        samples_written,
    })
}

/// Collects artifacts in memory.
#[derive(Default, Debug)]
pub struct MemorySink {
    /// Written artifacts, in order.
    pub images: Vec<(String, RgbImage)>,
}

impl ArtifactSink for MemorySink {
    fn write(&mut self, name: &str, image: &RgbImage) -> Result<(), SrError> {
        self.images.push((name.to_string(), image.clone()));
        Ok(())
    }
}
