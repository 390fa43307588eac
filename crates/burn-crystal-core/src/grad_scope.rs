//! Scoped gradient tracking
//!
//! Guidance needs the gradient of a property prediction with respect to the
//! sampler state, while the state itself lives outside the autodiff graph.
//! [`Tracked`] lifts a tensor into the graph with gradients required, hands out
//! tracked copies for the forward computation, and on release returns the
//! tensor with its previous require-grad flag restored.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// A tensor whose gradient is tracked for the lifetime of the value
#[derive(Debug)]
pub struct Tracked<B: AutodiffBackend, const D: usize> {
    tensor: Tensor<B, D>,
    prior: bool,
}

impl<B: AutodiffBackend, const D: usize> Tracked<B, D> {
    /// Starts tracking an autodiff tensor, remembering its current flag
    pub fn track(tensor: Tensor<B, D>) -> Self {
        let prior = tensor.is_require_grad();
        Self {
            tensor: tensor.set_require_grad(true),
            prior,
        }
    }

    /// Lifts an inner-backend tensor into the graph as a fresh leaf
    pub fn lift(inner: Tensor<B::InnerBackend, D>) -> Self {
        Self::track(Tensor::from_inner(inner))
    }

    /// Tracked copy for building the forward computation
    pub fn tensor(&self) -> Tensor<B, D> {
        self.tensor.clone()
    }

    /// Gradient of the tracked tensor, if it took part in the graph
    pub fn grad(&self, grads: &B::Gradients) -> Option<Tensor<B::InnerBackend, D>> {
        self.tensor.grad(grads)
    }

    /// Gradient, or zeros when the tensor did not reach the differentiated output
    pub fn grad_or_zeros(&self, grads: &B::Gradients) -> Tensor<B::InnerBackend, D> {
        self.grad(grads)
            .unwrap_or_else(|| self.tensor.clone().inner().zeros_like())
    }

    /// Ends tracking and restores the previous require-grad flag
    pub fn release(self) -> Tensor<B, D> {
        self.tensor.set_require_grad(self.prior)
    }
}
