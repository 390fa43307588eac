//! CSPNet: message-passing denoiser for periodic crystal graphs
//!
//! Predicts coordinate, lattice and (optionally) atom type scores, plus an
//! optional graph- or node-level property used for guidance.
//!
//! # Example
//!
//! ```ignore
//! use burn_crystal_net::{CspNetConfig, CspNetInput, AtomTypes, GuidanceMode, PropertyHead};
//!
//! let net = CspNetConfig::default()
//!     .with_smooth(true)
//!     .with_property(PropertyHead::GraphLevel(1))
//!     .init::<B>(&device)?;
//!
//! let out = net.forward(
//!     CspNetInput {
//!         time_emb,
//!         atom_types: AtomTypes::Probs(types),
//!         frac_coords,
//!         lattices,
//!         index: &batch.index,
//!         y: None,
//!     },
//!     GuidanceMode::None,
//! )?;
//! ```

pub mod config;
pub mod cspnet;
pub mod error;
pub mod layer;
pub mod score;

pub use config::{ClassifierFreeConfig, CspNetConfig, DistanceEmbedding, PropertyHead};
pub use cspnet::{AtomTypes, CspNet, CspNetInput, CspNetOutput, GuidanceMode};
pub use error::NetError;
pub use layer::{CspLayer, EdgeFeatures, Mlp};
pub use score::{ScoreModel, Scores};
