//! Batches of crystal structures packed into flat per-atom arrays
//!
//! A batch is the disjoint union of `S` structures. Atom-level state is stored
//! contiguously (`[N, ...]`) and the [`StructureIndex`] records which atoms
//! belong to which structure. Every broadcast from structures to atoms and every
//! reduction from atoms to structures goes through the index.

use std::ops::Range;

use burn::prelude::*;
use burn::tensor::Int;

use crate::error::{CrystalError, Result};
use crate::lattice::lattice_params_to_matrix;
use crate::segment::segment_mean;
use crate::MAX_ATOMIC_NUM;

/// Ownership map from atoms to structures
///
/// `node2graph` is always the run-length expansion of `num_atoms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureIndex {
    num_atoms: Vec<usize>,
    node2graph: Vec<usize>,
}

impl StructureIndex {
    /// Builds the index from per-structure atom counts
    pub fn from_num_atoms(num_atoms: &[usize]) -> Result<Self> {
        if num_atoms.is_empty() {
            return Err(CrystalError::InvalidBatch(
                "batch must contain at least one structure".into(),
            ));
        }
        if let Some(pos) = num_atoms.iter().position(|&n| n == 0) {
            return Err(CrystalError::InvalidBatch(format!(
                "structure {pos} has no atoms"
            )));
        }

        let node2graph = num_atoms
            .iter()
            .enumerate()
            .flat_map(|(graph, &n)| std::iter::repeat_n(graph, n))
            .collect();

        Ok(Self {
            num_atoms: num_atoms.to_vec(),
            node2graph,
        })
    }

    /// Builds the index from counts and an explicit atom-to-structure map
    ///
    /// Fails unless `node2graph` is exactly the run-length expansion of `num_atoms`.
    pub fn new(num_atoms: Vec<usize>, node2graph: Vec<usize>) -> Result<Self> {
        let expected = Self::from_num_atoms(&num_atoms)?;
        if expected.node2graph != node2graph {
            let total: usize = num_atoms.iter().sum();
            return Err(CrystalError::InvalidBatch(format!(
                "node2graph (len {}) is not the run-length expansion of num_atoms (sum {})",
                node2graph.len(),
                total
            )));
        }
        Ok(expected)
    }

    pub fn num_atoms(&self) -> &[usize] {
        &self.num_atoms
    }

    pub fn node2graph(&self) -> &[usize] {
        &self.node2graph
    }

    /// Number of structures `S`
    pub fn num_structures(&self) -> usize {
        self.num_atoms.len()
    }

    /// Total number of atoms `N`
    pub fn num_nodes(&self) -> usize {
        self.node2graph.len()
    }

    /// Atom ranges of each structure within the flat arrays
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.num_atoms.iter().scan(0usize, |start, &n| {
            let range = *start..*start + n;
            *start += n;
            Some(range)
        })
    }

    /// The atom-to-structure map as an index tensor
    pub fn node2graph_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 1, Int> {
        index_tensor(&self.node2graph, device)
    }

    /// Broadcasts per-structure rows to their atoms (`[S, ...] -> [N, ...]`)
    pub fn repeat_interleave<B: Backend, const D: usize>(
        &self,
        per_structure: Tensor<B, D>,
    ) -> Tensor<B, D> {
        let device = per_structure.device();
        per_structure.select(0, self.node2graph_tensor::<B>(&device))
    }

    /// Broadcasts one scalar per structure to a `[N, 1]` column
    pub fn repeat_scalars<B: Backend>(&self, values: &[f64], device: &B::Device) -> Tensor<B, 2> {
        let column: Vec<f32> = self
            .node2graph
            .iter()
            .map(|&graph| values[graph] as f32)
            .collect();
        Tensor::from_data(TensorData::new(column, [self.num_nodes(), 1]), device)
    }

    /// Averages atom rows over each structure (`[N, D] -> [S, D]`)
    pub fn mean_pool<B: Backend>(&self, node_values: Tensor<B, 2>) -> Tensor<B, 2> {
        segment_mean(node_values, &self.node2graph, self.num_structures())
    }
}

/// Converts host indices to an `Int` tensor
pub fn index_tensor<B: Backend>(indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
    Tensor::from_data(TensorData::new(data, [indices.len()]), device)
}

/// One-hot encodes 1-indexed species ids into `[N, MAX_ATOMIC_NUM]`
pub fn species_one_hot<B: Backend>(species: &[usize], device: &B::Device) -> Tensor<B, 2> {
    let mut data = vec![0.0f32; species.len() * MAX_ATOMIC_NUM];
    for (row, &id) in species.iter().enumerate() {
        data[row * MAX_ATOMIC_NUM + id - 1] = 1.0;
    }
    Tensor::from_data(TensorData::new(data, [species.len(), MAX_ATOMIC_NUM]), device)
}

/// A batch of crystal structures
#[derive(Debug, Clone)]
pub struct CrystalBatch<B: Backend> {
    /// Atom ownership
    pub index: StructureIndex,
    /// Fractional coordinates `[N, 3]`
    pub frac_coords: Tensor<B, 2>,
    /// Lattice matrices `[S, 3, 3]`, one lattice vector per row
    pub lattices: Tensor<B, 3>,
    /// Species ids `[N]`, starting at 1
    pub atom_types: Tensor<B, 1, Int>,
    /// Property target, `[S, d]` (graph level) or `[N, d]` (node level)
    pub y: Option<Tensor<B, 2>>,
}

impl<B: Backend> CrystalBatch<B> {
    /// Assembles a batch and checks shapes and species ids against the index
    pub fn new(
        index: StructureIndex,
        frac_coords: Tensor<B, 2>,
        lattices: Tensor<B, 3>,
        atom_types: Tensor<B, 1, Int>,
    ) -> Result<Self> {
        let n = index.num_nodes();
        let s = index.num_structures();

        if frac_coords.dims() != [n, 3] {
            return Err(CrystalError::Shape(format!(
                "frac_coords must be [{n}, 3], got {:?}",
                frac_coords.dims()
            )));
        }
        if lattices.dims() != [s, 3, 3] {
            return Err(CrystalError::Shape(format!(
                "lattices must be [{s}, 3, 3], got {:?}",
                lattices.dims()
            )));
        }
        if atom_types.dims() != [n] {
            return Err(CrystalError::Shape(format!(
                "atom_types must be [{n}], got {:?}",
                atom_types.dims()
            )));
        }
        for id in atom_types.to_data().iter::<i64>() {
            if id < 1 || id as usize > MAX_ATOMIC_NUM {
                return Err(CrystalError::InvalidSpecies {
                    id,
                    max: MAX_ATOMIC_NUM,
                });
            }
        }

        Ok(Self {
            index,
            frac_coords,
            lattices,
            atom_types,
            y: None,
        })
    }

    /// Assembles a batch from lattice lengths and angles (degrees), both `[S, 3]`
    pub fn from_lattice_params(
        index: StructureIndex,
        frac_coords: Tensor<B, 2>,
        lengths: Tensor<B, 2>,
        angles: Tensor<B, 2>,
        atom_types: Tensor<B, 1, Int>,
    ) -> Result<Self> {
        let lattices = lattice_params_to_matrix(lengths, angles)?;
        Self::new(index, frac_coords, lattices, atom_types)
    }

    /// Attaches a property target with one row per structure or per atom
    pub fn with_target(mut self, y: Tensor<B, 2>) -> Result<Self> {
        let rows = y.dims()[0];
        if rows != self.num_structures() && rows != self.num_nodes() {
            return Err(CrystalError::Shape(format!(
                "target has {rows} rows, expected {} (graph level) or {} (node level)",
                self.num_structures(),
                self.num_nodes()
            )));
        }
        self.y = Some(y);
        Ok(self)
    }

    pub fn num_structures(&self) -> usize {
        self.index.num_structures()
    }

    pub fn num_nodes(&self) -> usize {
        self.index.num_nodes()
    }

    pub fn device(&self) -> B::Device {
        self.frac_coords.device()
    }

    /// Species ids on the host
    pub fn species(&self) -> Vec<usize> {
        self.atom_types
            .to_data()
            .iter::<i64>()
            .map(|id| id as usize)
            .collect()
    }

    /// One-hot species `[N, MAX_ATOMIC_NUM]`
    pub fn atom_types_one_hot(&self) -> Tensor<B, 2> {
        species_one_hot(&self.species(), &self.device())
    }
}
