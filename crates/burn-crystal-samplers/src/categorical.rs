//! Categorical posterior over atom types
//!
//! The one-hot type simplex is treated as a categorical diffusion whose
//! posterior `q(a_{t-1} | a_t, a_0)` mixes the noised state with a prediction
//! of the clean types.

use burn::prelude::*;
use burn::tensor::activation::softmax;

const EPS: f64 = 1e-8;

/// Normalized posterior `θ ∝ (α a_t + (1−α)/K) ⊙ (ᾱ_{t−1} p_0 + (1−ᾱ_{t−1})/K)`
///
/// `alpha` and `alpha_bar_prev` are per-atom columns `[N, 1]`; `noised` and
/// `probs_0` are `[N, K]`.
pub fn categorical_posterior<B: Backend>(
    noised: Tensor<B, 2>,
    probs_0: Tensor<B, 2>,
    alpha: Tensor<B, 2>,
    alpha_bar_prev: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let [_, k] = noised.dims();
    let uniform = 1.0 / k as f64;

    let from_noised = noised * alpha.clone() + (alpha.neg() + 1.0).mul_scalar(uniform);
    let from_clean = probs_0 * alpha_bar_prev.clone() + (alpha_bar_prev.neg() + 1.0).mul_scalar(uniform);

    let theta = from_noised * from_clean;
    let total = theta.clone().sum_dim(1) + EPS;
    theta / total
}

/// Posterior with `p_0 = softmax(logits)`
pub fn posterior_from_logits<B: Backend>(
    noised: Tensor<B, 2>,
    logits: Tensor<B, 2>,
    alpha: Tensor<B, 2>,
    alpha_bar_prev: Tensor<B, 2>,
) -> Tensor<B, 2> {
    categorical_posterior(noised, softmax(logits, 1), alpha, alpha_bar_prev)
}

/// `KL(θ_true ‖ θ_pred)` summed over classes and averaged over rows
///
/// Classes where `θ_true` is zero contribute nothing; `θ_pred` is logged as
/// `ln(θ_pred + 1e-8)`.
pub fn categorical_kl<B: Backend>(theta_true: Tensor<B, 2>, theta_pred: Tensor<B, 2>) -> Tensor<B, 1> {
    let log_true = theta_true.clone().clamp_min(1e-30).log();
    let log_pred = (theta_pred + EPS).log();
    (theta_true * (log_true - log_pred)).sum_dim(1).mean()
}
