mod batcher;
mod folder;
mod loader;

pub use batcher::*;
pub use folder::*;
pub use loader::*;

use burn::tensor::TensorData;
use image::RgbImage;

/// Per-channel mean of the normalization applied to every image.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel standard deviation of the normalization applied to every image.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// A low-resolution image and its high-resolution ground truth.
///
/// Both are `[3, height, width]`, normalized with [IMAGENET_MEAN] and [IMAGENET_STD],
/// and the high-resolution extent is the low-resolution one times the scale factor.
#[derive(Clone, Debug)]
pub struct ImagePair {
    /// Normalized low-resolution input.
    pub low_res: TensorData,
    /// Normalized high-resolution target.
    pub high_res: TensorData,
}

impl ImagePair {
    /// Pair two already normalized `[3, h, w]` tensors.
    pub fn new(low_res: TensorData, high_res: TensorData) -> Self {
        Self { low_res, high_res }
    }

    /// Pair two RGB images, normalizing both.
    pub fn from_images(low_res: &RgbImage, high_res: &RgbImage) -> Self {
        Self::new(normalized_chw(low_res), normalized_chw(high_res))
    }
}

/// Convert an RGB image to normalized `[3, height, width]` data.
pub fn normalized_chw(image: &RgbImage) -> TensorData {
    let (width, height) = image.dimensions();
    let (width, height) = (width as usize, height as usize);
    let mut values = vec![0.0f32; 3 * height * width];

    for (x, y, pixel) in image.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for channel in 0..3 {
            let value = pixel.0[channel] as f32 / 255.0;
            values[channel * height * width + y * width + x] =
                (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel];
        }
    }

    TensorData::new(values, [3, height, width])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn normalization_uses_channel_statistics() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(1, 0, Rgb([255, 0, 128]));

        let data = normalized_chw(&image);
        let values = data.to_vec::<f32>().unwrap();

        assert_eq!(data.shape, vec![3, 1, 2]);
        assert!((values[0] - (-0.485 / 0.229)).abs() < 1e-5);
        assert!((values[1] - (1.0 - 0.485) / 0.229).abs() < 1e-5);
        assert!((values[3] - (-0.456 / 0.224)).abs() < 1e-5);
        assert!((values[5] - (128.0 / 255.0 - 0.406) / 0.225).abs() < 1e-5);
    }
}
