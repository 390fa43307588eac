//! Noise schedules for crystal diffusion
//!
//! Two independent schedules drive the forward process:
//!
//! - [`BetaScheduler`] - variance preserving noise for lattices and atom types
//! - [`SigmaScheduler`] - variance exploding wrapped-normal noise for fractional
//!   coordinates on the unit torus
//!
//! All tables are host-side and indexed `0..=T`, with index 0 the clean state.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Periodic images summed on each side when evaluating wrapped normals
pub const WRAPPED_NORMAL_IMAGES: i32 = 10;

/// Midpoints used for the score norm quadrature over `[0, 1)`
const NORM_QUADRATURE_POINTS: usize = 4096;

// ============================================================================
// Errors
// ============================================================================

/// Invalid schedule hyperparameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    #[error("Number of timesteps must be at least 1")]
    ZeroTimesteps,

    #[error("Invalid beta range: start {start} must be positive, finite and not above end {end}")]
    InvalidBetaRange { start: f64, end: f64 },

    #[error("Invalid sigma range: begin {begin} must be positive, finite and below end {end}")]
    InvalidSigmaRange { begin: f64, end: f64 },

    #[error("Schedule produced a non-finite value at t={t}")]
    NonFinite { t: usize },
}

// ============================================================================
// Beta (VP) schedule
// ============================================================================

/// Shape of the beta schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaSchedule {
    Linear,
    /// Offset cosine on `ᾱ` with `s = 0.008`
    #[default]
    Cosine,
    Quadratic,
    Sigmoid,
}

/// Beta schedule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BetaSchedulerConfig {
    pub schedule: BetaSchedule,
    /// Used by the linear, quadratic and sigmoid schedules
    pub beta_start: f64,
    /// Used by the linear, quadratic and sigmoid schedules
    pub beta_end: f64,
}

impl Default for BetaSchedulerConfig {
    fn default() -> Self {
        Self {
            schedule: BetaSchedule::Cosine,
            beta_start: 0.0001,
            beta_end: 0.02,
        }
    }
}

impl BetaSchedulerConfig {
    pub fn with_schedule(mut self, schedule: BetaSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_range(mut self, beta_start: f64, beta_end: f64) -> Self {
        self.beta_start = beta_start;
        self.beta_end = beta_end;
        self
    }
}

/// Precomputed variance preserving schedule
#[derive(Debug, Clone, PartialEq)]
pub struct BetaScheduler {
    pub timesteps: usize,
    /// `β_t`, with `β_0 = 0`
    pub betas: Vec<f64>,
    /// `α_t = 1 - β_t`
    pub alphas: Vec<f64>,
    /// `ᾱ_t = Π_{s ≤ t} α_s`
    pub alphas_cumprod: Vec<f64>,
    /// Posterior std `sqrt(β_t (1 - ᾱ_{t-1}) / (1 - ᾱ_t))`, with `σ_0 = 0`
    pub sigmas: Vec<f64>,
}

impl BetaScheduler {
    pub fn new(timesteps: usize, config: &BetaSchedulerConfig) -> Result<Self, ScheduleError> {
        if timesteps == 0 {
            return Err(ScheduleError::ZeroTimesteps);
        }
        if config.schedule != BetaSchedule::Cosine {
            let (start, end) = (config.beta_start, config.beta_end);
            if !(start.is_finite() && end.is_finite()) || start <= 0.0 || start > end || end >= 1.0 {
                return Err(ScheduleError::InvalidBetaRange { start, end });
            }
        }

        let mut betas = Vec::with_capacity(timesteps + 1);
        betas.push(0.0);
        betas.extend(match config.schedule {
            BetaSchedule::Linear => linspace(config.beta_start, config.beta_end, timesteps),
            BetaSchedule::Cosine => cosine_betas(timesteps, 0.008),
            BetaSchedule::Quadratic => {
                linspace(config.beta_start.sqrt(), config.beta_end.sqrt(), timesteps)
                    .into_iter()
                    .map(|b| b * b)
                    .collect()
            }
            BetaSchedule::Sigmoid => linspace(-6.0, 6.0, timesteps)
                .into_iter()
                .map(|x| sigmoid(x) * (config.beta_end - config.beta_start) + config.beta_start)
                .collect(),
        });

        let alphas: Vec<f64> = betas.iter().map(|b| 1.0 - b).collect();
        let alphas_cumprod: Vec<f64> = alphas
            .iter()
            .scan(1.0, |acc, &a| {
                *acc *= a;
                Some(*acc)
            })
            .collect();

        let mut sigmas = vec![0.0; timesteps + 1];
        for t in 1..=timesteps {
            sigmas[t] =
                (betas[t] * (1.0 - alphas_cumprod[t - 1]) / (1.0 - alphas_cumprod[t])).sqrt();
        }

        for t in 0..=timesteps {
            if !(betas[t].is_finite() && alphas_cumprod[t].is_finite() && sigmas[t].is_finite()) {
                return Err(ScheduleError::NonFinite { t });
            }
        }

        Ok(Self {
            timesteps,
            betas,
            alphas,
            alphas_cumprod,
            sigmas,
        })
    }

    /// Draws `batch_size` timesteps uniformly from `1..=T`
    pub fn uniform_sample_t<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Vec<usize> {
        (0..batch_size)
            .map(|_| rng.random_range(1..=self.timesteps))
            .collect()
    }
}

fn cosine_betas(timesteps: usize, s: f64) -> Vec<f64> {
    let f = |i: usize| {
        let x = i as f64 / timesteps as f64;
        ((x + s) / (1.0 + s) * std::f64::consts::FRAC_PI_2).cos().powi(2)
    };
    let f0 = f(0);
    (1..=timesteps)
        .map(|i| (1.0 - (f(i) / f0) / (f(i - 1) / f0)).clamp(0.0001, 0.9999))
        .collect()
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![start];
    }
    (0..n)
        .map(|i| start + (end - start) * i as f64 / (n - 1) as f64)
        .collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// ============================================================================
// Sigma (VE) schedule
// ============================================================================

/// Sigma schedule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmaSchedulerConfig {
    /// Noise scale at `t = 1`
    pub sigma_begin: f64,
    /// Noise scale at `t = T`
    pub sigma_end: f64,
}

impl Default for SigmaSchedulerConfig {
    fn default() -> Self {
        Self {
            sigma_begin: 0.005,
            sigma_end: 0.5,
        }
    }
}

/// Precomputed variance exploding schedule for coordinates on the torus
#[derive(Debug, Clone, PartialEq)]
pub struct SigmaScheduler {
    pub timesteps: usize,
    pub sigma_begin: f64,
    pub sigma_end: f64,
    /// Geometric from `sigma_begin` (t = 1) to `sigma_end` (t = T), `σ_0 = 0`
    pub sigmas: Vec<f64>,
    /// `E[‖∇ log p_wn(x; σ_t)‖²]`, with `1` at t = 0
    pub sigmas_norm: Vec<f64>,
}

impl SigmaScheduler {
    pub fn new(timesteps: usize, config: &SigmaSchedulerConfig) -> Result<Self, ScheduleError> {
        if timesteps == 0 {
            return Err(ScheduleError::ZeroTimesteps);
        }
        let (begin, end) = (config.sigma_begin, config.sigma_end);
        if !(begin.is_finite() && end.is_finite()) || begin <= 0.0 || begin >= end {
            return Err(ScheduleError::InvalidSigmaRange { begin, end });
        }

        let mut sigmas = Vec::with_capacity(timesteps + 1);
        sigmas.push(0.0);
        sigmas.extend(
            linspace(begin.ln(), end.ln(), timesteps)
                .into_iter()
                .map(f64::exp),
        );

        let mut sigmas_norm = Vec::with_capacity(timesteps + 1);
        sigmas_norm.push(1.0);
        for (t, &sigma) in sigmas.iter().enumerate().skip(1) {
            let norm = wrapped_normal_score_norm(sigma);
            if !norm.is_finite() {
                return Err(ScheduleError::NonFinite { t });
            }
            sigmas_norm.push(norm);
        }

        Ok(Self {
            timesteps,
            sigma_begin: begin,
            sigma_end: end,
            sigmas,
            sigmas_norm,
        })
    }
}

// ============================================================================
// Wrapped normal on the unit torus
// ============================================================================

/// Unnormalized-exponent terms `-(x + k)² / 2σ²` for the periodic images
fn image_exponents(x: f64, sigma: f64) -> impl Iterator<Item = (f64, f64)> {
    (-WRAPPED_NORMAL_IMAGES..=WRAPPED_NORMAL_IMAGES).map(move |k| {
        let shifted = x + k as f64;
        (shifted, -shifted * shifted / (2.0 * sigma * sigma))
    })
}

/// Density of the wrapped normal with scale `sigma` at `x`
pub fn p_wrapped_normal(x: f64, sigma: f64) -> f64 {
    let norm = (2.0 * std::f64::consts::PI).sqrt() * sigma;
    image_exponents(x, sigma).map(|(_, e)| e.exp()).sum::<f64>() / norm
}

/// `-d/dx log p_wn(x; σ)`
///
/// Evaluated with the largest exponent factored out, so it stays finite where
/// the density itself underflows.
pub fn d_log_p_wrapped_normal(x: f64, sigma: f64) -> f64 {
    let max = image_exponents(x, sigma)
        .map(|(_, e)| e)
        .fold(f64::NEG_INFINITY, f64::max);

    let (mut num, mut den) = (0.0, 0.0);
    for (shifted, e) in image_exponents(x, sigma) {
        let w = (e - max).exp();
        num += shifted / (sigma * sigma) * w;
        den += w;
    }
    num / den
}

/// `E_{x ~ p_wn(σ)}[(∂ log p_wn)²]` by midpoint quadrature over `[0, 1)`
pub fn wrapped_normal_score_norm(sigma: f64) -> f64 {
    let h = 1.0 / NORM_QUADRATURE_POINTS as f64;
    (0..NORM_QUADRATURE_POINTS)
        .map(|i| {
            let x = (i as f64 + 0.5) * h;
            let score = d_log_p_wrapped_normal(x, sigma);
            p_wrapped_normal(x, sigma) * score * score * h
        })
        .sum()
}


// Host-side value carried by a module as a constant (no parameters, empty record)
macro_rules! constant_module {
    ($($type:ty),+) => {$(
        impl<B: burn::tensor::backend::Backend> burn::module::Module<B> for $type {
            type Record = burn::module::ConstantRecord;

            fn visit<V: burn::module::ModuleVisitor<B>>(&self, _visitor: &mut V) {}

            fn map<M: burn::module::ModuleMapper<B>>(self, _mapper: &mut M) -> Self {
                self
            }

            fn load_record(self, _record: Self::Record) -> Self {
                self
            }

            fn into_record(self) -> Self::Record {
                burn::module::ConstantRecord::new()
            }

            fn to_device(self, _: &B::Device) -> Self {
                self
            }

            fn fork(self, _: &B::Device) -> Self {
                self
            }

            fn collect_devices(&self, devices: burn::module::Devices<B>) -> burn::module::Devices<B> {
                devices
            }
        }

        impl<B: burn::tensor::backend::AutodiffBackend> burn::module::AutodiffModule<B> for $type {
            type InnerModule = $type;

            fn valid(&self) -> Self::InnerModule {
                self.clone()
            }
        }

        impl burn::module::ModuleDisplayDefault for $type {
            fn content(&self, content: burn::module::Content) -> Option<burn::module::Content> {
                content.add_formatted(&format!("{:?}", self)).optional()
            }
        }

        impl burn::module::ModuleDisplay for $type {}
    )+};
}

constant_module!(BetaScheduler, SigmaScheduler);
