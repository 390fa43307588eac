//! burn-crystal: Property-Guided Crystal Diffusion in Pure Rust
//!
//! A property predictor over periodic crystal graphs, trained on noised
//! structures and used to steer a predictor-corrector sampler towards target
//! property values, built on the Burn deep learning framework.
//!
//! # Crates
//!
//! - [`core`] - batches, lattices, periodic graphs, embeddings, assignment
//! - [`net`] - the CSPNet message-passing denoiser and its property heads
//! - [`samplers`] - noise schedules and reverse-step update rules
//!
//! # Backend Selection
//!
//! Choose a backend via feature flags:
//! - `ndarray`: CPU backend (no GPU required)
//! - `tch`: PyTorch backend via libtorch (CUDA, MPS support)
//! - `wgpu`: WebGPU backend (cross-platform GPU)
//! - `cuda`: Native CUDA backend (NVIDIA only)
//!
//! # Example
//!
//! ```toml
//! [dependencies]
//! burn-crystal = { version = "0.1", features = ["wgpu"] }
//! ```
//!
//! ```ignore
//! use burn_crystal::backends::{default_device, DefaultAutodiffBackend};
//! use burn_crystal::{CrystalDiffusion, DiffusionConfig, SampleOptions};
//!
//! let device = default_device();
//! let model = CrystalDiffusion::<DefaultAutodiffBackend>::new(DiffusionConfig::default(), &device)?;
//!
//! // `uncond` is any ScoreModel that predicts type scores, e.g. a CspNet
//! let output = model.sample(&batch, &uncond, &SampleOptions::default().with_aug(2.0))?;
//! let species = output.structure.species();
//! ```

pub use burn_crystal_core as core;
pub use burn_crystal_net as net;
pub use burn_crystal_samplers as samplers;

pub mod backends;
pub mod config;
mod debug;
pub mod diffusion;
pub mod error;
pub mod sampling;
pub mod trajectory;

pub use config::{DebugConfig, DiffusionConfig, SampleOptions};
pub use diffusion::{CrystalDiffusion, DiffusionOutput, NoisedState, StepStats};
pub use error::{DiffusionError, Result};
pub use sampling::SampleOutput;
pub use trajectory::{Snapshot, Structure, Trajectory, TrajectoryStack};

pub use burn_crystal_core::{CrystalBatch, StructureIndex, MAX_ATOMIC_NUM};
pub use burn_crystal_net::{CspNet, CspNetConfig, PropertyHead, ScoreModel};
