//! Periodic neighbor search

use crate::batch::StructureIndex;
use crate::error::{CrystalError, Result};

use super::frac_to_cart_host;

/// Raw neighbor list
///
/// Edge `e` links `sources[e]` translated by the lattice image `images[e]`
/// to `targets[e]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbors {
    pub sources: Vec<usize>,
    pub targets: Vec<usize>,
    pub images: Vec<[i32; 3]>,
    /// Number of edges of each structure, edges grouped by structure in order
    pub num_neighbors: Vec<usize>,
}

impl Neighbors {
    fn push(&mut self, source: usize, target: usize, image: [i32; 3]) {
        self.sources.push(source);
        self.targets.push(target);
        self.images.push(image);
    }
}

/// Periodic radius graph over cartesian coordinates
pub trait NeighborSearch {
    fn search(
        &self,
        cart_coords: &[[f64; 3]],
        lattices: &[[[f64; 3]; 3]],
        index: &StructureIndex,
        cutoff: f64,
        max_neighbors: usize,
    ) -> Result<Neighbors>;
}

/// Brute-force search over every periodic image within reach of the cutoff
///
/// Keeps the `max_neighbors` closest sources of each target atom, ties broken by
/// source index.
#[derive(Debug, Clone, Copy, Default)]
pub struct PbcRadiusSearch;

impl NeighborSearch for PbcRadiusSearch {
    fn search(
        &self,
        cart_coords: &[[f64; 3]],
        lattices: &[[[f64; 3]; 3]],
        index: &StructureIndex,
        cutoff: f64,
        max_neighbors: usize,
    ) -> Result<Neighbors> {
        let mut out = Neighbors::default();

        for (graph, range) in index.ranges().enumerate() {
            let lattice = &lattices[graph];
            let reach = image_reach(lattice, cutoff)?;
            let before = out.sources.len();

            for target in range.clone() {
                let mut candidates: Vec<(f64, usize, [i32; 3])> = Vec::new();
                for source in range.clone() {
                    for n0 in -reach[0]..=reach[0] {
                        for n1 in -reach[1]..=reach[1] {
                            for n2 in -reach[2]..=reach[2] {
                                let image = [n0, n1, n2];
                                let shift = frac_to_cart_host(
                                    &[n0 as f64, n1 as f64, n2 as f64],
                                    lattice,
                                );
                                let dist = distance(
                                    &cart_coords[target],
                                    &add(&cart_coords[source], &shift),
                                );
                                if dist <= cutoff && dist > 1e-8 {
                                    candidates.push((dist, source, image));
                                }
                            }
                        }
                    }
                }

                candidates.sort_by(|a, b| {
                    a.0.total_cmp(&b.0)
                        .then(a.1.cmp(&b.1))
                        .then(a.2.cmp(&b.2))
                });
                for (_, source, image) in candidates.into_iter().take(max_neighbors) {
                    out.push(source, target, image);
                }
            }

            out.num_neighbors.push(out.sources.len() - before);
        }

        Ok(out)
    }
}

/// Makes a neighbor list direction-symmetric
///
/// Keeps edges with `source < target`, or self-edges whose image is
/// lexicographically negative, and appends the reverse of each kept edge.
/// Each structure's block becomes `[kept…, reversed…]`.
pub fn symmetrize(neighbors: Neighbors, index: &StructureIndex) -> Result<Neighbors> {
    let total: usize = neighbors.num_neighbors.iter().sum();
    if neighbors.num_neighbors.len() != index.num_structures() || total != neighbors.sources.len() {
        return Err(CrystalError::InvalidCutoff(format!(
            "neighbor counts {:?} do not describe {} edges over {} structures",
            neighbors.num_neighbors,
            neighbors.sources.len(),
            index.num_structures()
        )));
    }

    let mut out = Neighbors::default();
    let mut start = 0;

    for &count in &neighbors.num_neighbors {
        let block = start..start + count;
        start += count;

        let kept: Vec<usize> = block
            .filter(|&e| {
                let (s, t) = (neighbors.sources[e], neighbors.targets[e]);
                s < t || (s == t && is_negative(&neighbors.images[e]))
            })
            .collect();

        for &e in &kept {
            out.push(neighbors.sources[e], neighbors.targets[e], neighbors.images[e]);
        }
        for &e in &kept {
            let [a, b, c] = neighbors.images[e];
            out.push(neighbors.targets[e], neighbors.sources[e], [-a, -b, -c]);
        }
        out.num_neighbors.push(kept.len() * 2);
    }

    Ok(out)
}

/// First nonzero component is negative
fn is_negative(image: &[i32; 3]) -> bool {
    image
        .iter()
        .find(|&&v| v != 0)
        .is_some_and(|&v| v < 0)
}

/// Number of images to scan along each lattice vector
///
/// The spacing between lattice planes normal to reciprocal vector `k` is
/// `V / |b_i × b_j|`.
fn image_reach(lattice: &[[f64; 3]; 3], cutoff: f64) -> Result<[i32; 3]> {
    let [a, b, c] = lattice;
    let volume = dot(a, &cross(b, c)).abs();
    if !volume.is_finite() || volume < 1e-10 {
        return Err(CrystalError::InvalidCutoff(format!(
            "degenerate lattice with volume {volume}"
        )));
    }

    let areas = [norm(&cross(b, c)), norm(&cross(c, a)), norm(&cross(a, b))];
    let mut reach = [0i32; 3];
    for (r, area) in reach.iter_mut().zip(areas) {
        let spacing = volume / area;
        *r = (cutoff / spacing).ceil() as i32;
    }
    Ok(reach)
}

fn add(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(a: &[f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    norm(&[a[0] - b[0], a[1] - b[1], a[2] - b[2]])
}
