//! Predictor-corrector update rules
//!
//! One reverse step from `t` to `t - 1` is a Langevin corrector on the
//! coordinates followed by a predictor on every component: annealed Langevin
//! for the coordinates, the DDPM posterior mean for lattices and atom types.
//! Guidance gradients are subtracted with the predictor's noise variance.

use burn::prelude::*;
use burn::tensor::Distribution;

use crate::scheduler::{BetaScheduler, SigmaScheduler};

/// Standard normal noise shaped like `x`, or zeros when disabled
fn noise_like<B: Backend, const D: usize>(x: &Tensor<B, D>, enabled: bool) -> Tensor<B, D> {
    if enabled {
        x.random_like(Distribution::Normal(0.0, 1.0))
    } else {
        x.zeros_like()
    }
}

/// Langevin corrector on the coordinates at timestep `t`
///
/// `s = step_lr · (σ_t / σ_begin)²`, noise std `√(2s)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectorStep {
    pub step_size: f64,
    pub noise_std: f64,
    /// `√σnorm_t`, the scale the network's normalized score is multiplied by
    pub score_scale: f64,
    /// Noise is injected for every step but the last
    pub add_noise: bool,
}

impl CorrectorStep {
    pub fn new(sigma: &SigmaScheduler, t: usize, step_lr: f64) -> Self {
        let step_size = step_lr * (sigma.sigmas[t] / sigma.sigma_begin).powi(2);
        Self {
            step_size,
            noise_std: (2.0 * step_size).sqrt(),
            score_scale: sigma.sigmas_norm[t].sqrt(),
            add_noise: t > 1,
        }
    }

    /// `x − s·√σnorm·score + √(2s)·ε`
    pub fn coords<B: Backend>(&self, x: Tensor<B, 2>, score: Tensor<B, 2>) -> Tensor<B, 2> {
        let noise = noise_like(&x, self.add_noise);
        x - score.mul_scalar(self.step_size * self.score_scale) + noise.mul_scalar(self.noise_std)
    }
}

/// Predictor coefficients at timestep `t`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictorStep {
    /// `σ_t² − σ_{t−1}²`
    pub step_size: f64,
    /// `√(σ_{t−1}² · step / σ_t²)`
    pub coords_std: f64,
    /// `√σnorm_t`
    pub score_scale: f64,
    /// `1 / √α_t`
    pub c0: f64,
    /// `(1 − α_t) / √(1 − ᾱ_t)`
    pub c1: f64,
    /// Posterior std of the VP process, `beta.sigmas[t]`
    pub vp_std: f64,
    pub add_noise: bool,
}

impl PredictorStep {
    pub fn new(beta: &BetaScheduler, sigma: &SigmaScheduler, t: usize) -> Self {
        let sigma_t = sigma.sigmas[t];
        let sigma_prev = sigma.sigmas[t - 1];
        let step_size = sigma_t * sigma_t - sigma_prev * sigma_prev;
        let alpha = beta.alphas[t];
        let alpha_bar = beta.alphas_cumprod[t];

        Self {
            step_size,
            coords_std: (sigma_prev * sigma_prev * step_size / (sigma_t * sigma_t)).sqrt(),
            score_scale: sigma.sigmas_norm[t].sqrt(),
            c0: 1.0 / alpha.sqrt(),
            c1: (1.0 - alpha) / (1.0 - alpha_bar).sqrt(),
            vp_std: beta.sigmas[t],
            add_noise: t > 1,
        }
    }

    /// `x − s·√σnorm·score − std²·aug·g + std·ε`
    pub fn coords<B: Backend>(
        &self,
        x: Tensor<B, 2>,
        score: Tensor<B, 2>,
        guidance: Tensor<B, 2>,
        aug: f64,
    ) -> Tensor<B, 2> {
        let noise = noise_like(&x, self.add_noise);
        x - score.mul_scalar(self.step_size * self.score_scale)
            - guidance.mul_scalar(self.coords_std * self.coords_std * aug)
            + noise.mul_scalar(self.coords_std)
    }

    /// `c0·(v − c1·score) − σ̂²·aug·g + σ̂·ε` for lattices and atom types
    ///
    /// Passing `None` for `guidance` leaves the guidance term out.
    pub fn variance_preserving<B: Backend, const D: usize>(
        &self,
        v: Tensor<B, D>,
        score: Tensor<B, D>,
        guidance: Option<Tensor<B, D>>,
        aug: f64,
    ) -> Tensor<B, D> {
        let noise = noise_like(&v, self.add_noise);
        let mean = (v - score.mul_scalar(self.c1)).mul_scalar(self.c0);
        let guided = match guidance {
            Some(g) => mean - g.mul_scalar(self.vp_std * self.vp_std * aug),
            None => mean,
        };
        guided + noise.mul_scalar(self.vp_std)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{BetaSchedulerConfig, SigmaSchedulerConfig};
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn schedules(t: usize) -> (BetaScheduler, SigmaScheduler) {
        (
            BetaScheduler::new(t, &BetaSchedulerConfig::default()).unwrap(),
            SigmaScheduler::new(t, &SigmaSchedulerConfig::default()).unwrap(),
        )
    }

    #[test]
    fn test_coefficients() {
        let (beta, sigma) = schedules(10);
        let corrector = CorrectorStep::new(&sigma, 1, 1e-5);
        // σ_1 = σ_begin
        assert!((corrector.step_size - 1e-5).abs() < 1e-15);
        assert!(!corrector.add_noise);

        let predictor = PredictorStep::new(&beta, &sigma, 1);
        // σ_0 = 0: the whole variance is removed and no noise is left
        assert!((predictor.step_size - 0.005f64.powi(2)).abs() < 1e-15);
        assert_eq!(predictor.coords_std, 0.0);
        assert_eq!(predictor.vp_std, 0.0);

        let predictor = PredictorStep::new(&beta, &sigma, 5);
        assert!(predictor.add_noise);
        assert!(predictor.c0 > 1.0);
        assert!(predictor.coords_std > 0.0);
    }

    #[test]
    fn test_last_step_deterministic() {
        let (beta, sigma) = schedules(10);
        let device = Default::default();
        let predictor = PredictorStep::new(&beta, &sigma, 1);

        let v = Tensor::<TestBackend, 3>::ones([2, 3, 3], &device);
        let score = Tensor::<TestBackend, 3>::ones([2, 3, 3], &device);
        let out = predictor.variance_preserving(v.clone(), score.clone(), None, 1.0);
        let again = predictor.variance_preserving(v, score, None, 1.0);

        let expected = ((1.0 - predictor.c1) * predictor.c0) as f32;
        let a: Vec<f32> = out.into_data().iter::<f32>().collect();
        let b: Vec<f32> = again.into_data().iter::<f32>().collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|v| (v - expected).abs() < 1e-5));
    }

    #[test]
    fn test_guidance_term_sign() {
        let (beta, sigma) = schedules(10);
        let device = Default::default();
        let mut predictor = PredictorStep::new(&beta, &sigma, 5);
        predictor.add_noise = false;

        let x = Tensor::<TestBackend, 2>::zeros([1, 3], &device);
        let zero = Tensor::<TestBackend, 2>::zeros([1, 3], &device);
        let g = Tensor::<TestBackend, 2>::ones([1, 3], &device);
        let out: Vec<f32> = predictor
            .coords(x, zero, g, 2.0)
            .into_data()
            .iter::<f32>()
            .collect();
        let expected = -(predictor.coords_std.powi(2) * 2.0) as f32;
        assert!(out.iter().all(|v| (v - expected).abs() < 1e-7));
    }
}
