use burn::prelude::*;

/// A tensor detached from the autodiff graph.
///
/// Plain [`Tensor`] values stay differentiable; a `Frozen` value behaves as a
/// constant in every loss it takes part in, so no gradient reaches whatever
/// produced it.
#[derive(Clone, Debug)]
pub struct Frozen<B: Backend, const D: usize> {
    tensor: Tensor<B, D>,
}

impl<B: Backend, const D: usize> Frozen<B, D> {
    /// Detach `tensor` and keep it as a constant.
    pub fn new(tensor: Tensor<B, D>) -> Self {
        Self {
            tensor: tensor.detach(),
        }
    }

    /// The constant value.
    pub fn tensor(&self) -> Tensor<B, D> {
        self.tensor.clone()
    }

    /// Consume the snapshot and return the constant value.
    pub fn into_tensor(self) -> Tensor<B, D> {
        self.tensor
    }

    /// Shape of the snapshot.
    pub fn dims(&self) -> [usize; D] {
        self.tensor.dims()
    }
}
