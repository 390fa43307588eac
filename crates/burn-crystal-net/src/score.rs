//! Score model seam used by the samplers

use burn::prelude::*;
use burn_crystal_core::StructureIndex;

use crate::cspnet::{AtomTypes, CspNet, CspNetInput, GuidanceMode};
use crate::error::Result;

/// Denoising scores for one reverse step
#[derive(Debug, Clone)]
pub struct Scores<B: Backend> {
    /// `[N, 3]`
    pub coords: Tensor<B, 2>,
    /// `[S, 3, 3]`
    pub lattice: Tensor<B, 3>,
    /// Type logits `[N, MAX_ATOMIC_NUM]`, if the model predicts them
    pub types: Option<Tensor<B, 2>>,
}

/// A model that scores a noised crystal state
///
/// `atom_types` are soft type vectors `[N, MAX_ATOMIC_NUM]`.
pub trait ScoreModel<B: Backend> {
    fn scores(
        &self,
        time_emb: Tensor<B, 2>,
        atom_types: Tensor<B, 2>,
        frac_coords: Tensor<B, 2>,
        lattices: Tensor<B, 3>,
        index: &StructureIndex,
    ) -> Result<Scores<B>>;

    /// Whether [`Scores::types`] is populated
    fn predicts_types(&self) -> bool;
}

impl<B: Backend> ScoreModel<B> for CspNet<B> {
    fn scores(
        &self,
        time_emb: Tensor<B, 2>,
        atom_types: Tensor<B, 2>,
        frac_coords: Tensor<B, 2>,
        lattices: Tensor<B, 3>,
        index: &StructureIndex,
    ) -> Result<Scores<B>> {
        let out = self.forward(
            CspNetInput {
                time_emb,
                atom_types: AtomTypes::Probs(atom_types),
                frac_coords,
                lattices,
                index,
                y: None,
            },
            GuidanceMode::Unconditional,
        )?;
        Ok(Scores {
            coords: out.coords,
            lattice: out.lattice,
            types: out.types,
        })
    }

    fn predicts_types(&self) -> bool {
        self.config.pred_type
    }
}
