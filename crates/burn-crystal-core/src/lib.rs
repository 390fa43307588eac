//! Core Building Blocks for Crystal Diffusion
//!
//! Shared components used by the crystal denoising backbone and the diffusion
//! module in the burn-crystal workspace.
//!
//! # Modules
//!
//! ## Batching
//!
//! - [`batch`] - Flat per-atom batches of structures and the atom ownership index
//! - [`segment`] - Mean/sum reductions keyed by host-side segment ids
//!
//! ## Geometry
//!
//! - [`lattice`] - Lattice parameter conversion and fractional/cartesian maps
//! - [`torus`] - Wrapping of fractional coordinates to `[0, 1)`
//! - [`graph`] - Fully connected and cutoff edge construction with periodic images
//!
//! ## Embeddings
//!
//! - [`embedding`] - Sinusoidal time embeddings and Fourier displacement features
//!
//! ## Utilities
//!
//! - [`grad_scope`] - Scoped gradient tracking for guidance gradients
//! - [`assignment`] - Minimum-cost linear assignment (Hungarian method)
//!
//! # Example
//!
//! ```ignore
//! use burn_crystal_core::batch::{CrystalBatch, StructureIndex};
//! use burn_crystal_core::graph::{build_edges, EdgeStyle, PbcRadiusSearch};
//!
//! let index = StructureIndex::from_num_atoms(&[2, 3])?;
//! let batch = CrystalBatch::new(index, frac_coords, lattices, atom_types)?;
//! let edges = build_edges(
//!     &EdgeStyle::FullyConnected,
//!     &batch.index,
//!     batch.frac_coords.clone(),
//!     batch.lattices.clone(),
//!     &PbcRadiusSearch,
//! )?;
//! ```

pub mod assignment;
pub mod batch;
pub mod embedding;
pub mod error;
pub mod grad_scope;
pub mod graph;
pub mod lattice;
pub mod segment;
pub mod torus;

/// Number of chemical species representable by the model (ids `1..=100`)
pub const MAX_ATOMIC_NUM: usize = 100;

pub use assignment::solve_assignment;
pub use batch::{index_tensor, species_one_hot, CrystalBatch, StructureIndex};
pub use embedding::{sinusoidal_time_embedding, sinusoids_dim, sinusoids_embedding};
pub use error::{CrystalError, Result};
pub use grad_scope::Tracked;
pub use graph::{build_edges, EdgeSet, EdgeStyle, NeighborSearch, Neighbors, PbcRadiusSearch};
pub use lattice::{frac_to_cart, lattice_gram, lattice_params_to_matrix, lattices_to_host};
pub use segment::{segment_mean, segment_sum};
pub use torus::wrap_unit;
