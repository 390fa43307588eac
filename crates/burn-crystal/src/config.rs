//! Diffusion and sampling configuration

use burn_crystal_net::{CspNetConfig, PropertyHead};
use burn_crystal_samplers::{BetaSchedulerConfig, SigmaSchedulerConfig};
use serde::{Deserialize, Serialize};

/// Configuration of the property-guided diffusion module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffusionConfig {
    /// Number of diffusion steps `T`
    pub timesteps: usize,
    /// Width of the sinusoidal time embedding
    pub time_dim: usize,
    /// Width of an extra sampler latent; sampling requires 0
    pub latent_dim: usize,
    /// Train and infer on clean structures with a zero time embedding
    pub time_independent: bool,
    pub beta_scheduler: BetaSchedulerConfig,
    pub sigma_scheduler: SigmaSchedulerConfig,
    pub model: CspNetConfig,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            timesteps: 1000,
            time_dim: 256,
            latent_dim: 0,
            time_independent: false,
            beta_scheduler: BetaSchedulerConfig::default(),
            sigma_scheduler: SigmaSchedulerConfig::default(),
            model: CspNetConfig::default()
                .with_smooth(true)
                .with_property(PropertyHead::GraphLevel(1)),
        }
    }
}

impl DiffusionConfig {
    pub fn with_timesteps(mut self, timesteps: usize) -> Self {
        self.timesteps = timesteps;
        self
    }

    /// Sets the time embedding width on both the module and its network
    pub fn with_time_dim(mut self, time_dim: usize) -> Self {
        self.time_dim = time_dim;
        self.model.latent_dim = time_dim;
        self
    }

    pub fn with_time_independent(mut self, time_independent: bool) -> Self {
        self.time_independent = time_independent;
        self
    }

    pub fn with_model(mut self, model: CspNetConfig) -> Self {
        self.model = model;
        self
    }
}

/// Debug flags for sampler diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Log per-step state statistics at debug level
    pub sampler: bool,
    /// Abort sampling with an error on NaN/Inf state values
    pub nan: bool,
}

/// Options for guided sampling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleOptions {
    /// Fraction of the schedule to run; below 1 the batch is corrupted to
    /// `floor(T · ratio)` and denoised from there
    pub diffusion_ratio: f64,
    /// Langevin corrector step scale
    pub step_lr: f64,
    /// Guidance strength
    pub aug: f64,
    pub show_progress: bool,
    pub debug: DebugConfig,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            diffusion_ratio: 1.0,
            step_lr: 1e-5,
            aug: 1.0,
            show_progress: false,
            debug: DebugConfig::default(),
        }
    }
}

impl SampleOptions {
    pub fn with_diffusion_ratio(mut self, diffusion_ratio: f64) -> Self {
        self.diffusion_ratio = diffusion_ratio;
        self
    }

    pub fn with_step_lr(mut self, step_lr: f64) -> Self {
        self.step_lr = step_lr;
        self
    }

    pub fn with_aug(mut self, aug: f64) -> Self {
        self.aug = aug;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn with_debug(mut self, debug: DebugConfig) -> Self {
        self.debug = debug;
        self
    }
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

constant_module!(DiffusionConfig);
