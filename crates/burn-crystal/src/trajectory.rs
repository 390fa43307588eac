//! Reverse-process trajectories

use std::collections::BTreeMap;

use burn::prelude::*;

use crate::error::{DiffusionError, Result};

/// Sampler state at one timestep
#[derive(Debug, Clone)]
pub struct Snapshot<B: Backend> {
    pub num_atoms: Vec<usize>,
    /// Soft type vectors `[N, MAX_ATOMIC_NUM]`
    pub atom_types: Tensor<B, 2>,
    /// `[N, 3]`, wrapped to `[0, 1)`
    pub frac_coords: Tensor<B, 2>,
    /// `[S, 3, 3]`
    pub lattices: Tensor<B, 3>,
}

/// A generated batch with hard atom types
#[derive(Debug, Clone)]
pub struct Structure<B: Backend> {
    pub num_atoms: Vec<usize>,
    /// Species ids `[N]`, starting at 1
    pub atom_types: Tensor<B, 1, Int>,
    pub frac_coords: Tensor<B, 2>,
    pub lattices: Tensor<B, 3>,
}

impl<B: Backend> Structure<B> {
    /// Species ids on the host
    pub fn species(&self) -> Vec<usize> {
        self.atom_types
            .to_data()
            .iter::<i64>()
            .map(|id| id as usize)
            .collect()
    }
}

impl<B: Backend> From<Snapshot<B>> for Structure<B> {
    fn from(snapshot: Snapshot<B>) -> Self {
        let [n, _] = snapshot.atom_types.dims();
        Self {
            num_atoms: snapshot.num_atoms,
            atom_types: snapshot.atom_types.argmax(1).reshape([n]) + 1,
            frac_coords: snapshot.frac_coords,
            lattices: snapshot.lattices,
        }
    }
}

/// Every state of the reverse process, stacked from the starting timestep down to 0
#[derive(Debug, Clone)]
pub struct TrajectoryStack<B: Backend> {
    pub num_atoms: Vec<usize>,
    /// Hard species ids `[K, N]`
    pub atom_types: Tensor<B, 2, Int>,
    /// `[K, N, 3]`
    pub all_frac_coords: Tensor<B, 3>,
    /// `[K, S, 3, 3]`
    pub all_lattices: Tensor<B, 4>,
}

/// Append-only map from timestep to sampler state
#[derive(Debug, Clone)]
pub struct Trajectory<B: Backend> {
    entries: BTreeMap<usize, Snapshot<B>>,
}

impl<B: Backend> Default for Trajectory<B> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<B: Backend> Trajectory<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the state at `t`; each timestep can be recorded once
    pub fn record(&mut self, t: usize, snapshot: Snapshot<B>) -> Result<()> {
        if self.entries.contains_key(&t) {
            return Err(DiffusionError::DuplicateTimestep(t));
        }
        self.entries.insert(t, snapshot);
        Ok(())
    }

    pub fn get(&self, t: usize) -> Option<&Snapshot<B>> {
        self.entries.get(&t)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded timesteps, highest first
    pub fn timesteps(&self) -> Vec<usize> {
        self.entries.keys().rev().copied().collect()
    }

    /// Stacks every recorded state, highest timestep first
    pub fn stack(&self) -> Result<TrajectoryStack<B>> {
        let snapshots: Vec<&Snapshot<B>> = self.entries.values().rev().collect();
        let first = snapshots.first().ok_or(DiffusionError::EmptyTrajectory)?;
        let k = snapshots.len();
        let [n, _] = first.atom_types.dims();

        let types = Tensor::stack::<3>(
            snapshots.iter().map(|s| s.atom_types.clone()).collect(),
            0,
        );

        Ok(TrajectoryStack {
            num_atoms: first.num_atoms.clone(),
            atom_types: types.argmax(2).reshape([k, n]) + 1,
            all_frac_coords: Tensor::stack(
                snapshots.iter().map(|s| s.frac_coords.clone()).collect(),
                0,
            ),
            all_lattices: Tensor::stack(
                snapshots.iter().map(|s| s.lattices.clone()).collect(),
                0,
            ),
        })
    }
}
