//! Errors for building and running the denoising network

use burn_crystal_core::CrystalError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetError {
    #[error("Invalid network configuration: {0}")]
    Config(String),

    #[error("Conditional guidance requested without a property target")]
    MissingTarget,

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error(transparent)]
    Crystal(#[from] CrystalError),
}

pub type Result<T> = std::result::Result<T, NetError>;
