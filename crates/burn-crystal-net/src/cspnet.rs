//! CSPNet denoising backbone
//!
//! Equivariant-by-construction message passing over the periodic crystal
//! graph. Fractional displacements enter through periodic features and the
//! lattice enters through its Gram matrix, so the scores do not depend on the
//! choice of unit cell origin or on rotations of the cartesian frame.

use burn::nn::{Embedding, LayerNorm, Linear};
use burn::prelude::*;
use burn_crystal_core::graph::{build_edges, EdgeSet, NeighborSearch, PbcRadiusSearch};
use burn_crystal_core::{
    lattice_gram, sinusoids_embedding, species_one_hot, CrystalError, StructureIndex, MAX_ATOMIC_NUM,
};
use rand::Rng;
use tracing::debug;

use crate::config::{CspNetConfig, DistanceEmbedding};
use crate::error::{NetError, Result};
use crate::layer::{CspLayer, EdgeFeatures};

/// How the property target conditions the atom features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuidanceMode {
    /// Training behaviour: with classifier-free conditioning configured, the
    /// condition is dropped with probability `prob`
    #[default]
    None,
    /// Never add the condition
    Unconditional,
    /// Always add the condition; the target must be supplied
    Conditional,
}

/// Atom types fed to the network
#[derive(Debug, Clone)]
pub enum AtomTypes<B: Backend> {
    /// Species ids `[N]`, starting at 1
    Ids(Tensor<B, 1, Int>),
    /// Soft or one-hot type vectors `[N, MAX_ATOMIC_NUM]`
    Probs(Tensor<B, 2>),
}

/// One forward's worth of network inputs
#[derive(Debug, Clone)]
pub struct CspNetInput<'a, B: Backend> {
    /// Time embedding per structure `[S, latent_dim]`
    pub time_emb: Tensor<B, 2>,
    pub atom_types: AtomTypes<B>,
    /// `[N, 3]`
    pub frac_coords: Tensor<B, 2>,
    /// `[S, 3, 3]`
    pub lattices: Tensor<B, 3>,
    pub index: &'a StructureIndex,
    /// Property target, `[S, d]` or `[N, d]`
    pub y: Option<Tensor<B, 2>>,
}

/// Network outputs
#[derive(Debug, Clone)]
pub struct CspNetOutput<B: Backend> {
    /// Coordinate score `[N, 3]`
    pub coords: Tensor<B, 2>,
    /// Lattice score `[S, 3, 3]`
    pub lattice: Tensor<B, 3>,
    /// Type logits `[N, MAX_ATOMIC_NUM]`
    pub types: Option<Tensor<B, 2>>,
    /// Graph-level property `[S, d]`
    pub graph_property: Option<Tensor<B, 2>>,
    /// Node-level property `[N, d]`
    pub node_property: Option<Tensor<B, 2>>,
}

impl<B: Backend> CspNetOutput<B> {
    /// Whichever property head the network carries
    pub fn property(&self) -> Option<Tensor<B, 2>> {
        self.graph_property
            .clone()
            .or_else(|| self.node_property.clone())
    }
}

/// CSPNet
#[derive(Module, Debug)]
pub struct CspNet<B: Backend> {
    /// Species id embedding (hard types)
    pub type_embedding: Option<Embedding<B>>,
    /// Type vector projection (soft types)
    pub type_projection: Option<Linear<B>>,
    /// Projects `[atom features | time embedding]` to the hidden width
    pub atom_latent_emb: Linear<B>,
    pub layers: Vec<CspLayer<B>>,
    pub coord_out: Linear<B>,
    pub lattice_out: Linear<B>,
    pub final_layer_norm: Option<LayerNorm<B>>,
    pub type_out: Option<Linear<B>>,
    pub graph_out: Option<Linear<B>>,
    pub node_out: Option<Linear<B>>,
    /// Property target projection for classifier-free conditioning
    pub y_projection: Option<Linear<B>>,
    #[module(skip)]
    pub config: CspNetConfig,
}

impl<B: Backend> CspNet<B> {
    pub fn config(&self) -> &CspNetConfig {
        &self.config
    }

    /// Forward pass with edges from the brute-force periodic search
    pub fn forward(&self, input: CspNetInput<'_, B>, mode: GuidanceMode) -> Result<CspNetOutput<B>> {
        self.forward_with_search(input, mode, &PbcRadiusSearch)
    }

    /// Forward pass with a caller-provided neighbor search for cutoff graphs
    pub fn forward_with_search<S: NeighborSearch + ?Sized>(
        &self,
        input: CspNetInput<'_, B>,
        mode: GuidanceMode,
        search: &S,
    ) -> Result<CspNetOutput<B>> {
        self.check_shapes(&input.time_emb, &input.frac_coords, &input.lattices, input.index)?;
        let edges = build_edges(
            &self.config.edge_style,
            input.index,
            input.frac_coords.clone(),
            input.lattices.clone(),
            search,
        )?;
        debug!(
            edges = edges.num_edges(),
            structures = input.index.num_structures(),
            "built crystal graph"
        );
        self.forward_with_edges(input, mode, edges)
    }

    /// Forward pass over a prebuilt edge set
    pub fn forward_with_edges(
        &self,
        input: CspNetInput<'_, B>,
        mode: GuidanceMode,
        edges: EdgeSet<B>,
    ) -> Result<CspNetOutput<B>> {
        let CspNetInput {
            time_emb,
            atom_types,
            frac_coords,
            lattices,
            index,
            y,
        } = input;
        self.check_shapes(&time_emb, &frac_coords, &lattices, index)?;
        let n = index.num_nodes();
        let s = index.num_structures();
        let device = frac_coords.device();

        let mut node_features = self.embed_types(atom_types, n, &device)?;

        if self.condition_applies(mode, y.is_some())? {
            if let (Some(projection), Some(y)) = (&self.y_projection, y) {
                node_features = node_features + self.project_target(projection, y, index)?;
            }
        }

        let t_per_atom = index.repeat_interleave(time_emb);
        let mut node_features = self
            .atom_latent_emb
            .forward(Tensor::cat(vec![node_features, t_per_atom], 1));

        let edge_features = self.edge_features(&edges, lattices.clone(), &device);
        for layer in &self.layers {
            node_features = layer.forward(node_features, &edge_features);
        }

        if let Some(norm) = &self.final_layer_norm {
            node_features = norm.forward(node_features);
        }

        let coords = self.coord_out.forward(node_features.clone());
        let node_property = self
            .node_out
            .as_ref()
            .map(|head| head.forward(node_features.clone()));

        let graph_features = index.mean_pool(node_features.clone());
        let graph_property = self
            .graph_out
            .as_ref()
            .map(|head| head.forward(graph_features.clone()));

        let mut lattice = self.lattice_out.forward(graph_features).reshape([s, 3, 3]);
        if self.config.lattice_inner_product {
            lattice = lattice.matmul(lattices);
        }

        let types = self
            .type_out
            .as_ref()
            .map(|head| head.forward(node_features));

        Ok(CspNetOutput {
            coords,
            lattice,
            types,
            graph_property,
            node_property,
        })
    }

    fn check_shapes(
        &self,
        time_emb: &Tensor<B, 2>,
        frac_coords: &Tensor<B, 2>,
        lattices: &Tensor<B, 3>,
        index: &StructureIndex,
    ) -> Result<()> {
        let n = index.num_nodes();
        let s = index.num_structures();
        if time_emb.dims() != [s, self.config.latent_dim] {
            return Err(NetError::Shape(format!(
                "time embedding must be [{s}, {}], got {:?}",
                self.config.latent_dim,
                time_emb.dims()
            )));
        }
        if frac_coords.dims() != [n, 3] || lattices.dims() != [s, 3, 3] {
            return Err(NetError::Shape(format!(
                "coordinates {:?} / lattices {:?} do not match {n} atoms in {s} structures",
                frac_coords.dims(),
                lattices.dims()
            )));
        }
        Ok(())
    }

    fn embed_types(&self, atom_types: AtomTypes<B>, n: usize, device: &B::Device) -> Result<Tensor<B, 2>> {
        let shape_error = |dims: Vec<usize>| {
            NetError::Shape(format!("atom types must describe {n} atoms, got {dims:?}"))
        };

        match (&self.type_projection, &self.type_embedding, atom_types) {
            (Some(projection), _, AtomTypes::Probs(probs)) => {
                if probs.dims() != [n, MAX_ATOMIC_NUM] {
                    return Err(shape_error(probs.dims().to_vec()));
                }
                Ok(projection.forward(probs))
            }
            (Some(projection), _, AtomTypes::Ids(ids)) => {
                let species = checked_species(ids)?;
                if species.len() != n {
                    return Err(shape_error(vec![species.len()]));
                }
                let species: Vec<usize> = species.into_iter().map(|id| id as usize).collect();
                Ok(projection.forward(species_one_hot(&species, device)))
            }
            (None, Some(embedding), atom_types) => {
                let ids = match atom_types {
                    AtomTypes::Ids(ids) => {
                        checked_species(ids.clone())?;
                        ids
                    }
                    AtomTypes::Probs(probs) => {
                        if probs.dims() != [n, MAX_ATOMIC_NUM] {
                            return Err(shape_error(probs.dims().to_vec()));
                        }
                        probs.argmax(1).reshape([n]) + 1
                    }
                };
                if ids.dims() != [n] {
                    return Err(shape_error(ids.dims().to_vec()));
                }
                let embedded = embedding.forward((ids - 1).reshape([1, n]));
                Ok(embedded.reshape([n, self.config.hidden_dim]))
            }
            (None, None, _) => Err(NetError::Config("network has no type embedding".into())),
        }
    }

    /// Whether the property condition is added for this forward
    fn condition_applies(&self, mode: GuidanceMode, has_target: bool) -> Result<bool> {
        match mode {
            GuidanceMode::Unconditional => Ok(false),
            GuidanceMode::Conditional => {
                if self.y_projection.is_none() {
                    return Err(NetError::Config(
                        "conditional forward requires classifier-free conditioning".into(),
                    ));
                }
                if !has_target {
                    return Err(NetError::MissingTarget);
                }
                Ok(true)
            }
            GuidanceMode::None => match &self.config.cfg {
                Some(cfg) if has_target => Ok(rand::rng().random::<f64>() >= cfg.prob),
                _ => Ok(false),
            },
        }
    }

    fn project_target(
        &self,
        projection: &Linear<B>,
        y: Tensor<B, 2>,
        index: &StructureIndex,
    ) -> Result<Tensor<B, 2>> {
        let [rows, dim] = y.dims();
        if Some(dim) != self.config.property.dim() {
            return Err(NetError::Shape(format!(
                "property target width {dim} does not match the head width {:?}",
                self.config.property.dim()
            )));
        }
        let projected = projection.forward(y);
        if rows == index.num_nodes() {
            Ok(projected)
        } else if rows == index.num_structures() {
            Ok(index.repeat_interleave(projected))
        } else {
            Err(NetError::Shape(format!(
                "property target has {rows} rows, expected {} or {}",
                index.num_structures(),
                index.num_nodes()
            )))
        }
    }

    fn edge_features(&self, edges: &EdgeSet<B>, lattices: Tensor<B, 3>, device: &B::Device) -> EdgeFeatures<B> {
        let s = lattices.dims()[0];
        let lattice_features = if self.config.lattice_inner_product {
            lattice_gram(lattices)
        } else {
            lattices
        }
        .reshape([s, 9]);

        let num_edges = edges.num_edges();
        let (lattice, distance) = if edges.is_empty() {
            (
                Tensor::zeros([0, 9], device),
                Tensor::zeros([0, self.config.distance_embedding.dim()], device),
            )
        } else {
            let lattice = lattice_features.select(0, edges.edge2graph_tensor(device));
            let distance = match self.config.distance_embedding {
                DistanceEmbedding::Sinusoidal { num_freqs } => {
                    sinusoids_embedding(edges.frac_diff.clone(), num_freqs)
                }
                DistanceEmbedding::Raw => edges.frac_diff.clone(),
            };
            (lattice, distance)
        };
        debug_assert_eq!(lattice.dims()[0], num_edges);

        EdgeFeatures {
            sources: edges.sources.clone(),
            sources_tensor: edges.sources_tensor(device),
            targets_tensor: edges.targets_tensor(device),
            lattice,
            distance,
        }
    }
}

/// Host copy of 1-indexed species ids, rejecting ids outside `1..=MAX_ATOMIC_NUM`
fn checked_species<B: Backend>(ids: Tensor<B, 1, Int>) -> Result<Vec<i64>> {
    let species: Vec<i64> = ids.into_data().iter::<i64>().collect();
    match species.iter().find(|&&id| id < 1 || id > MAX_ATOMIC_NUM as i64) {
        Some(&id) => Err(NetError::Crystal(CrystalError::InvalidSpecies {
            id,
            max: MAX_ATOMIC_NUM,
        })),
        None => Ok(species),
    }
}
