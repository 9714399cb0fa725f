use burn::{data::dataloader::batcher::Batcher, prelude::*};

use super::ImagePair;
use crate::SrError;

/// Stacked image pairs.
#[derive(Clone, Debug)]
pub struct SrBatch<B: Backend> {
    /// `[batch_size, 3, h, w]`
    pub low_res: Tensor<B, 4>,
    /// `[batch_size, 3, h * scale, w * scale]`
    pub high_res: Tensor<B, 4>,
}

impl<B: Backend> SrBatch<B> {
    /// Number of pairs in the batch.
    pub fn len(&self) -> usize {
        self.low_res.dims()[0]
    }

    /// Whether the batch holds no pair.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check that the high-resolution side is exactly `scale` times the low-resolution one.
    pub fn validate(&self, scale: usize) -> Result<(), SrError> {
        let [batch, channels, height, width] = self.low_res.dims();
        let expected = [batch, channels, height * scale, width * scale];
        let actual = self.high_res.dims();

        if actual != expected {
            return Err(SrError::ShapeMismatch(format!(
                "low resolution {:?} needs high resolution {expected:?} at scale {scale}, received {actual:?}",
                self.low_res.dims()
            )));
        }
        Ok(())
    }
}

/// Stacks [image pairs](ImagePair) onto a device.
#[derive(Clone, Debug)]
pub struct SrBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> SrBatcher<B> {
    /// Create a batcher that places its tensors on `device`.
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<ImagePair, SrBatch<B>> for SrBatcher<B> {
    fn batch(&self, items: Vec<ImagePair>) -> SrBatch<B> {
        let (low_res, high_res): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|pair| {
                (
                    Tensor::<B, 3>::from_data(pair.low_res.convert::<B::FloatElem>(), &self.device),
                    Tensor::<B, 3>::from_data(pair.high_res.convert::<B::FloatElem>(), &self.device),
                )
            })
            .unzip();

        SrBatch {
            low_res: Tensor::stack(low_res, 0),
            high_res: Tensor::stack(high_res, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;
    use burn::tensor::TensorData;

    fn pair(low: usize, high: usize) -> ImagePair {
        ImagePair::new(
            TensorData::new(vec![0.5f32; 3 * low * low], [3, low, low]),
            TensorData::new(vec![0.25f32; 3 * high * high], [3, high, high]),
        )
    }

    #[test]
    fn stacks_pairs_along_the_batch_dimension() {
        let batcher = SrBatcher::<TestBackend>::new(Default::default());

        let batch = batcher.batch(vec![pair(4, 16), pair(4, 16)]);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.low_res.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.high_res.dims(), [2, 3, 16, 16]);
        assert!(batch.validate(4).is_ok());
    }

    #[test]
    fn wrong_scale_is_a_shape_mismatch() {
        let batcher = SrBatcher::<TestBackend>::new(Default::default());

        let batch = batcher.batch(vec![pair(4, 8)]);

        assert!(matches!(batch.validate(4), Err(SrError::ShapeMismatch(_))));
    }
}
