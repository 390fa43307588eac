//! Errors raised by the diffusion module

use burn_crystal_core::CrystalError;
use burn_crystal_net::NetError;
use burn_crystal_samplers::ScheduleError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiffusionError {
    #[error("Invalid diffusion configuration: {0}")]
    Config(String),

    #[error("Batch has no property target")]
    MissingTarget,

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Sampling is not supported for time-independent models; use infer()")]
    TimeIndependentSampling,

    #[error("Sampling with a latent of width {latent_dim} is not supported")]
    LatentSampling { latent_dim: usize },

    #[error("The unconditional model does not predict atom type scores")]
    MissingTypeScores,

    #[error("Diffusion ratio must lie in (0, 1], got {0}")]
    InvalidRatio(f64),

    #[error("Mask has {got} entries, expected one per atom ({expected})")]
    MaskLength { expected: usize, got: usize },

    #[error("Non-finite values in {what} at t={t}")]
    NonFinite { what: &'static str, t: usize },

    #[error("Timestep {0} recorded twice in the trajectory")]
    DuplicateTimestep(usize),

    #[error("Trajectory is empty")]
    EmptyTrajectory,

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Crystal(#[from] CrystalError),
}

pub type Result<T> = std::result::Result<T, DiffusionError>;
