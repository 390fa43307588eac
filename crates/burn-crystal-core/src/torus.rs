//! Fractional coordinates on the unit torus

use burn::prelude::*;

/// Wraps values to `[0, 1)` with a floored modulo
///
/// The floor is taken on a detached copy, so under autodiff the wrap behaves as
/// the identity plus a constant shift and gradients pass straight through.
/// Tiny negatives round to exactly 1.0 in `x - floor(x)`; those are carried
/// back to 0.0.
pub fn wrap_unit<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let shift = x.clone().detach().floor();
    let wrapped = x - shift;
    let carry = wrapped.clone().detach().greater_equal_elem(1.0).float();
    wrapped - carry
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_wrap_unit() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.3f32, -0.25, 0.0, 2.75, 0.999, -3.5], [2, 3]),
            &device,
        );
        let wrapped: Vec<f32> = wrap_unit(x).into_data().iter::<f32>().collect();
        let expected = [0.3f32, 0.75, 0.0, 0.75, 0.999, 0.5];
        for (w, e) in wrapped.iter().zip(expected) {
            assert!((w - e).abs() < 1e-5, "expected {e}, got {w}");
            assert!((0.0..1.0).contains(w));
        }
    }

    #[test]
    fn test_tiny_negative_wraps_below_one() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_data(
            TensorData::new(vec![-1e-9f32, -1e-30, 1.0 - 1e-8], [3]),
            &device,
        );
        let wrapped: Vec<f32> = wrap_unit(x).into_data().iter::<f32>().collect();
        assert!(wrapped.iter().all(|w| (0.0..1.0).contains(w)), "{wrapped:?}");
    }
}
