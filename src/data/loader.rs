use std::sync::Arc;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use super::{ImagePair, SrBatch, SrBatcher};
use crate::SrError;

/// Sequential batch iteration over a dataset of [image pairs](ImagePair).
///
/// With [`PairLoader::shuffle`] every epoch visits the items in a different order
/// derived from the seed and the epoch index; without it items come in dataset order.
/// A sample the dataset cannot produce ends the epoch with [SrError::MissingSample].
pub struct PairLoader<B: Backend> {
    dataset: Arc<dyn Dataset<ImagePair>>,
    batcher: SrBatcher<B>,
    batch_size: usize,
    seed: Option<u64>,
}

impl<B: Backend> PairLoader<B> {
    /// Create a sequential loader.
    ///
    /// # Panics
    ///
    /// Panics if `batch_size` is zero.
    pub fn new(dataset: Arc<dyn Dataset<ImagePair>>, batcher: SrBatcher<B>, batch_size: usize) -> Self {
        assert!(batch_size > 0, "Batch size must be positive");
        Self {
            dataset,
            batcher,
            batch_size,
            seed: None,
        }
    }

    /// Reshuffle the items every epoch.
    pub fn shuffle(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of items per epoch.
    pub fn num_items(&self) -> usize {
        self.dataset.len()
    }

    /// Number of batches per epoch; the last one may be smaller.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Iterate over the batches of `epoch`.
    pub fn iter(&self, epoch: usize) -> PairLoaderIterator<'_, B> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if let Some(seed) = self.seed {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
            indices.shuffle(&mut rng);
        }

        PairLoaderIterator {
            loader: self,
            indices,
            position: 0,
        }
    }
}

/// Iterator over the batches of one epoch.
pub struct PairLoaderIterator<'a, B: Backend> {
    loader: &'a PairLoader<B>,
    indices: Vec<usize>,
    position: usize,
}

impl<B: Backend> PairLoaderIterator<'_, B> {
    /// Dataset indices of this epoch, in visiting order.
    pub fn order(&self) -> &[usize] {
        &self.indices
    }
}

impl<B: Backend> Iterator for PairLoaderIterator<'_, B> {
    type Item = Result<SrBatch<B>, SrError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.indices.len() {
            return None;
        }

        let end = (self.position + self.loader.batch_size).min(self.indices.len());
        let mut items = Vec::with_capacity(end - self.position);
        for &index in &self.indices[self.position..end] {
            match self.loader.dataset.get(index) {
                Some(item) => items.push(item),
                None => {
                    self.position = self.indices.len();
                    return Some(Err(SrError::MissingSample { index }));
                }
            }
        }
        self.position = end;

        Some(Ok(self.loader.batcher.batch(items)))
    }
}
