//! Lattice geometry
//!
//! Lattices are stored as `[S, 3, 3]` matrices whose rows are the lattice
//! vectors `a`, `b`, `c`, so a fractional row vector `x` maps to cartesian
//! space as `x · L`.

use burn::prelude::*;

use crate::error::{CrystalError, Result};

/// Converts lattice lengths and angles (degrees) to lattice matrices
///
/// Uses the convention with `c` along the z axis and `a` in the x-z plane:
///
/// ```text
/// γ* = acos((cos α cos β - cos γ) / (sin α sin β))
/// a  = [a sin β, 0, a cos β]
/// b  = [-b sin α cos γ*, b sin α sin γ*, b cos α]
/// c  = [0, 0, c]
/// ```
pub fn lattice_params_to_matrix<B: Backend>(
    lengths: Tensor<B, 2>,
    angles: Tensor<B, 2>,
) -> Result<Tensor<B, 3>> {
    let [s, three] = lengths.dims();
    if three != 3 || angles.dims() != [s, 3] {
        return Err(CrystalError::Shape(format!(
            "lattice lengths {:?} and angles {:?} must both be [S, 3]",
            lengths.dims(),
            angles.dims()
        )));
    }

    let device = lengths.device();
    let lengths: Vec<f64> = lengths.into_data().iter::<f64>().collect();
    let angles: Vec<f64> = angles.into_data().iter::<f64>().collect();

    let mut out = Vec::with_capacity(s * 9);
    for (len, ang) in lengths.chunks_exact(3).zip(angles.chunks_exact(3)) {
        let [a, b, c] = [len[0], len[1], len[2]];
        let [alpha, beta, gamma] = [
            ang[0].to_radians(),
            ang[1].to_radians(),
            ang[2].to_radians(),
        ];

        let val = ((alpha.cos() * beta.cos() - gamma.cos()) / (alpha.sin() * beta.sin()))
            .clamp(-1.0, 1.0);
        let gamma_star = val.acos();

        let rows = [
            [a * beta.sin(), 0.0, a * beta.cos()],
            [
                -b * alpha.sin() * gamma_star.cos(),
                b * alpha.sin() * gamma_star.sin(),
                b * alpha.cos(),
            ],
            [0.0, 0.0, c],
        ];
        out.extend(rows.iter().flatten().map(|&v| v as f32));
    }

    Ok(Tensor::from_data(TensorData::new(out, [s, 3, 3]), &device))
}

/// Pairwise inner products of the lattice vectors, `L · Lᵀ`
pub fn lattice_gram<B: Backend>(lattices: Tensor<B, 3>) -> Tensor<B, 3> {
    lattices.clone().matmul(lattices.transpose())
}

/// Maps fractional coordinates `[N, 3]` to cartesian coordinates
///
/// `lattice_per_atom` is the `[N, 3, 3]` lattice of each atom's structure.
pub fn frac_to_cart<B: Backend>(
    frac_coords: Tensor<B, 2>,
    lattice_per_atom: Tensor<B, 3>,
) -> Tensor<B, 2> {
    let [n, _] = frac_coords.dims();
    frac_coords
        .reshape([n, 1, 3])
        .matmul(lattice_per_atom)
        .reshape([n, 3])
}

/// Host copy of `[S, 3, 3]` lattices as row-major matrices
pub fn lattices_to_host<B: Backend>(lattices: Tensor<B, 3>) -> Vec<[[f64; 3]; 3]> {
    let values: Vec<f64> = lattices.into_data().iter::<f64>().collect();
    values
        .chunks_exact(9)
        .map(|m| [[m[0], m[1], m[2]], [m[3], m[4], m[5]], [m[6], m[7], m[8]]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < 1e-4, "index {i}: expected {e}, got {a}");
        }
    }

    #[test]
    fn test_cubic_lattice() {
        let device = Default::default();
        let lengths = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![2.0f32, 3.0, 4.0], [1, 3]),
            &device,
        );
        let angles = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![90.0f32, 90.0, 90.0], [1, 3]),
            &device,
        );
        let lattice = lattice_params_to_matrix(lengths, angles).unwrap();
        let values: Vec<f32> = lattice.into_data().iter::<f32>().collect();
        assert_close(&values, &[2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 4.0]);
    }

    #[test]
    fn test_hexagonal_lengths_preserved() {
        let device = Default::default();
        let lengths = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![3.0f32, 3.0, 5.0], [1, 3]),
            &device,
        );
        let angles = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![90.0f32, 90.0, 120.0], [1, 3]),
            &device,
        );
        let lattice = lattice_params_to_matrix(lengths, angles).unwrap();
        let gram: Vec<f32> = lattice_gram(lattice).into_data().iter::<f32>().collect();
        // Diagonal holds squared lengths, off-diagonal a·b = |a||b| cos γ
        assert_close(&[gram[0], gram[4], gram[8]], &[9.0, 9.0, 25.0]);
        assert_close(&[gram[1]], &[-4.5]);
    }

    #[test]
    fn test_frac_to_cart() {
        let device = Default::default();
        let frac = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.5f32, 0.5, 0.5], [1, 3]),
            &device,
        );
        let lattice = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(vec![2.0f32, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 4.0], [1, 3, 3]),
            &device,
        );
        let cart: Vec<f32> = frac_to_cart(frac, lattice).into_data().iter::<f32>().collect();
        assert_close(&cart, &[1.5, 1.0, 2.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let device = Default::default();
        let lengths = Tensor::<TestBackend, 2>::zeros([2, 3], &device);
        let angles = Tensor::<TestBackend, 2>::zeros([1, 3], &device);
        assert!(lattice_params_to_matrix(lengths, angles).is_err());
    }
}
