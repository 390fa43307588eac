//! Sinusoidal embeddings
//!
//! Two flavours are used by the denoiser: a transformer-style embedding of the
//! diffusion time, and a Fourier feature map of fractional displacements whose
//! integer frequencies keep the features periodic on the unit torus.

use std::f64::consts::PI;

use burn::prelude::*;

/// Geometric frequencies for a `dim`-wide time embedding
///
/// `freq_i = exp(-i · ln(10000) / (half - 1))` for `i < dim / 2`.
pub fn time_embedding_freqs<B: Backend>(dim: usize, device: &B::Device) -> Tensor<B, 1> {
    let half_dim = dim / 2;
    let scale = if half_dim > 1 {
        10000.0f64.ln() / (half_dim - 1) as f64
    } else {
        0.0
    };

    let freqs: Vec<f32> = (0..half_dim)
        .map(|i| (-(i as f64) * scale).exp() as f32)
        .collect();

    Tensor::<B, 1>::from_data(TensorData::new(freqs, [half_dim]), device)
}

/// Embeds times `[S]` as `[S, dim]` with `[sin | cos]` halves
///
/// `dim` is expected to be even.
pub fn sinusoidal_time_embedding<B: Backend>(times: Tensor<B, 1>, dim: usize) -> Tensor<B, 2> {
    let [batch] = times.dims();
    let device = times.device();
    let freqs = time_embedding_freqs::<B>(dim, &device);
    let half_dim = dim / 2;

    let args = times.reshape([batch, 1]) * freqs.reshape([1, half_dim]);
    Tensor::cat(vec![args.clone().sin(), args.cos()], 1)
}

/// Output width of [`sinusoids_embedding`] for `num_freqs` frequencies
pub fn sinusoids_dim(num_freqs: usize) -> usize {
    num_freqs * 3 * 2
}

/// Fourier features of fractional displacements `[E, 3] -> [E, 6F]`
///
/// Frequencies are `2π · k` for `k = 0..F`, so the features are invariant to
/// integer lattice shifts.
pub fn sinusoids_embedding<B: Backend>(x: Tensor<B, 2>, num_freqs: usize) -> Tensor<B, 2> {
    let [edges, _] = x.dims();
    let device = x.device();

    let freqs: Vec<f32> = (0..num_freqs)
        .map(|k| (2.0 * PI * k as f64) as f32)
        .collect();
    let freqs = Tensor::<B, 1>::from_data(TensorData::new(freqs, [num_freqs]), &device);

    let args = (x.reshape([edges, 3, 1]) * freqs.reshape([1, 1, num_freqs]))
        .reshape([edges, 3 * num_freqs]);
    Tensor::cat(vec![args.clone().sin(), args.cos()], 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_time_embedding_shape_and_zero() {
        let device = Default::default();
        let times = Tensor::<TestBackend, 1>::from_data(TensorData::new(vec![0.0f32, 7.0], [2]), &device);
        let emb = sinusoidal_time_embedding(times, 8);
        assert_eq!(emb.dims(), [2, 8]);

        let values: Vec<f32> = emb.into_data().iter::<f32>().collect();
        // t = 0: sin half is zero, cos half is one
        assert!(values[..4].iter().all(|v| v.abs() < 1e-6));
        assert!(values[4..8].iter().all(|v| (v - 1.0).abs() < 1e-6));
        // first frequency is 1
        assert!((values[8] - 7.0f32.sin()).abs() < 1e-5);
    }

    #[test]
    fn test_sinusoids_periodic() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.1f32, 0.2, 0.3], [1, 3]),
            &device,
        );
        let b = a.clone() + 1.0;

        let ea: Vec<f32> = sinusoids_embedding(a, 4).into_data().iter::<f32>().collect();
        let eb: Vec<f32> = sinusoids_embedding(b, 4).into_data().iter::<f32>().collect();
        assert_eq!(ea.len(), sinusoids_dim(4));
        for (x, y) in ea.iter().zip(&eb) {
            assert!((x - y).abs() < 1e-4);
        }
    }
}
