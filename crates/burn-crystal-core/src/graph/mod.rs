//! Edge construction for periodic crystal graphs
//!
//! Edges connect atoms of the same structure. Each edge carries the fractional
//! displacement from its source to its target, computed from the coordinate
//! tensor so that it stays differentiable with respect to the coordinates.

mod pbc;

pub use pbc::{symmetrize, NeighborSearch, Neighbors, PbcRadiusSearch};

use burn::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::batch::{index_tensor, StructureIndex};
use crate::error::{CrystalError, Result};
use crate::lattice::{frac_to_cart, lattices_to_host};
use crate::torus::wrap_unit;

/// How edges between atoms are chosen
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStyle {
    /// Every ordered pair of distinct atoms within a structure
    #[default]
    FullyConnected,
    /// Periodic neighbors within `cutoff` (Å), at most `max_neighbors` per atom
    Cutoff { cutoff: f64, max_neighbors: usize },
}

/// Edges of one forward pass
#[derive(Debug, Clone)]
pub struct EdgeSet<B: Backend> {
    pub sources: Vec<usize>,
    pub targets: Vec<usize>,
    /// Structure owning each edge (that of its source atom)
    pub edge2graph: Vec<usize>,
    /// Fractional displacement `[E, 3]` from source to target
    pub frac_diff: Tensor<B, 2>,
}

impl<B: Backend> EdgeSet<B> {
    pub fn num_edges(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources_tensor(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        index_tensor(&self.sources, device)
    }

    pub fn targets_tensor(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        index_tensor(&self.targets, device)
    }

    pub fn edge2graph_tensor(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        index_tensor(&self.edge2graph, device)
    }
}

/// Builds the edge set of a batch
///
/// `search` is only consulted for [`EdgeStyle::Cutoff`].
pub fn build_edges<B: Backend, S: NeighborSearch + ?Sized>(
    style: &EdgeStyle,
    index: &StructureIndex,
    frac_coords: Tensor<B, 2>,
    lattices: Tensor<B, 3>,
    search: &S,
) -> Result<EdgeSet<B>> {
    match style {
        EdgeStyle::FullyConnected => Ok(fully_connected(index, frac_coords)),
        EdgeStyle::Cutoff {
            cutoff,
            max_neighbors,
        } => cutoff_edges(index, frac_coords, lattices, *cutoff, *max_neighbors, search),
    }
}

/// All ordered pairs `(i, j)`, `i != j`, within each structure
///
/// Displacements are `(x_j - x_i) mod 1`.
pub fn fully_connected<B: Backend>(index: &StructureIndex, frac_coords: Tensor<B, 2>) -> EdgeSet<B> {
    let mut sources = Vec::new();
    let mut targets = Vec::new();
    let mut edge2graph = Vec::new();

    for (graph, range) in index.ranges().enumerate() {
        for i in range.clone() {
            for j in range.clone() {
                if i != j {
                    sources.push(i);
                    targets.push(j);
                    edge2graph.push(graph);
                }
            }
        }
    }

    let frac_diff = displacements(&frac_coords, &sources, &targets);
    EdgeSet {
        sources,
        targets,
        edge2graph,
        frac_diff: wrap_unit(frac_diff),
    }
}

fn cutoff_edges<B: Backend, S: NeighborSearch + ?Sized>(
    index: &StructureIndex,
    frac_coords: Tensor<B, 2>,
    lattices: Tensor<B, 3>,
    cutoff: f64,
    max_neighbors: usize,
    search: &S,
) -> Result<EdgeSet<B>> {
    if !cutoff.is_finite() || cutoff <= 0.0 {
        return Err(CrystalError::InvalidCutoff(format!(
            "cutoff must be positive, got {cutoff}"
        )));
    }
    if max_neighbors == 0 {
        return Err(CrystalError::InvalidCutoff(
            "max_neighbors must be at least 1".into(),
        ));
    }

    let device = frac_coords.device();
    let host_lattices = lattices_to_host(lattices.clone());
    let lattice_per_atom = lattices.select(0, index_tensor::<B>(index.node2graph(), &device));
    let cart: Vec<[f64; 3]> = frac_to_cart(frac_coords.clone(), lattice_per_atom)
        .into_data()
        .iter::<f64>()
        .collect::<Vec<_>>()
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect();

    let neighbors = search.search(&cart, &host_lattices, index, cutoff, max_neighbors)?;
    let raw_edges = neighbors.sources.len();
    let neighbors = symmetrize(neighbors, index)?;
    debug!(
        raw_edges,
        edges = neighbors.sources.len(),
        cutoff,
        "periodic neighbor search"
    );

    let edge2graph: Vec<usize> = neighbors
        .sources
        .iter()
        .map(|&s| index.node2graph()[s])
        .collect();

    let images: Vec<f32> = neighbors
        .images
        .iter()
        .flat_map(|img| img.iter().map(|&v| v as f32))
        .collect();
    let num_edges = neighbors.sources.len();
    let images = Tensor::<B, 2>::from_data(TensorData::new(images, [num_edges, 3]), &device);

    let frac_diff = displacements(&frac_coords, &neighbors.sources, &neighbors.targets) - images;

    Ok(EdgeSet {
        sources: neighbors.sources,
        targets: neighbors.targets,
        edge2graph,
        frac_diff,
    })
}

/// `x[targets] - x[sources]`, or an empty `[0, 3]` tensor
fn displacements<B: Backend>(
    frac_coords: &Tensor<B, 2>,
    sources: &[usize],
    targets: &[usize],
) -> Tensor<B, 2> {
    let device = frac_coords.device();
    if sources.is_empty() {
        return Tensor::zeros([0, 3], &device);
    }
    let src = frac_coords
        .clone()
        .select(0, index_tensor::<B>(sources, &device));
    let dst = frac_coords
        .clone()
        .select(0, index_tensor::<B>(targets, &device));
    dst - src
}

pub(crate) fn frac_to_cart_host(x: &[f64; 3], lattice: &[[f64; 3]; 3]) -> [f64; 3] {
    let mut out = [0.0; 3];
    for (k, value) in out.iter_mut().enumerate() {
        *value = x[0] * lattice[0][k] + x[1] * lattice[1][k] + x[2] * lattice[2][k];
    }
    out
}
