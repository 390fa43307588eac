//! Error types shared by the crystal building blocks

use thiserror::Error;

/// Errors raised while assembling batches, lattices and graphs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CrystalError {
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Shape mismatch: {0}")]
    Shape(String),

    #[error("Invalid species id {id} (expected 1..={max})")]
    InvalidSpecies { id: i64, max: usize },

    #[error("Invalid cutoff graph parameters: {0}")]
    InvalidCutoff(String),

    #[error("Assignment problem is not square: {rows}x{cols}")]
    NonSquareAssignment { rows: usize, cols: usize },
}

pub type Result<T> = std::result::Result<T, CrystalError>;
