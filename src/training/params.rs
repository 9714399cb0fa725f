use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use burn::{
    module::{ModuleVisitor, ParamId},
    prelude::*,
};

/// Fingerprint of every float tensor a module holds.
///
/// Two digests are equal when the modules hold bit-identical values in the same
/// order. Pending running-statistic updates are synced first, so batch-norm
/// statistics gathered during training forwards are covered as well.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParamDigest {
    hash: u64,
    num_values: usize,
}

impl ParamDigest {
    /// Digest of `module`.
    pub fn of<B: Backend, M: Module<B>>(module: &M) -> Self {
        // `into_record` syncs running states into their shared value.
        let synced = module.clone().load_record(module.clone().into_record());
        let mut visitor = DigestVisitor {
            hasher: DefaultHasher::new(),
            num_values: 0,
        };
        synced.visit(&mut visitor);

        Self {
            hash: visitor.hasher.finish(),
            num_values: visitor.num_values,
        }
    }

    /// Number of scalars covered.
    pub fn num_values(&self) -> usize {
        self.num_values
    }
}

struct DigestVisitor {
    hasher: DefaultHasher,
    num_values: usize,
}

impl<B: Backend> ModuleVisitor<B> for DigestVisitor {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        let data = tensor.to_data().convert::<f32>();
        if let Ok(values) = data.to_vec::<f32>() {
            self.num_values += values.len();
            for value in values {
                value.to_bits().hash(&mut self.hasher);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TestAutodiffBackend, TestBackend};
    use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig};

    #[test]
    fn digest_tracks_values() {
        let device = Default::default();
        let layer: Linear<TestBackend> = LinearConfig::new(4, 2).init(&device);
        let same = layer.clone();
        let other: Linear<TestBackend> = LinearConfig::new(4, 2)
            .with_initializer(burn::nn::Initializer::Constant { value: 0.5 })
            .init(&device);

        let digest = ParamDigest::of(&layer);

        assert_eq!(digest.num_values(), 4 * 2 + 2);
        assert_eq!(digest, ParamDigest::of(&same));
        assert_ne!(digest, ParamDigest::of(&other));
    }

    #[test]
    fn digest_covers_running_statistics() {
        let device = Default::default();
        let norm: BatchNorm<TestAutodiffBackend, 2> = BatchNormConfig::new(3).init(&device);
        let before = ParamDigest::of(&norm);
        let input = Tensor::<TestAutodiffBackend, 4>::ones([2, 3, 4, 4], &device) * 3.0;

        let _ = norm.forward(input);

        assert_eq!(before.num_values(), ParamDigest::of(&norm).num_values());
        assert_ne!(before, ParamDigest::of(&norm));
    }
}
