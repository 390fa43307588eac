//! Sampler diagnostics

use burn::prelude::*;

use crate::error::{DiffusionError, Result};

/// One-line summary of a sampler state tensor
///
/// Statistics are taken over the finite values; non-finite counts are
/// appended when present.
pub(crate) fn tensor_stats<B: Backend, const D: usize>(tensor: &Tensor<B, D>) -> String {
    let values: Vec<f64> = tensor
        .clone()
        .into_data()
        .iter::<f32>()
        .map(f64::from)
        .collect();
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let nan = values.iter().filter(|v| v.is_nan()).count();
    let inf = values.iter().filter(|v| v.is_infinite()).count();

    let mut summary = if finite.is_empty() {
        "no finite values".to_string()
    } else {
        let count = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / count;
        let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
        let (min, max) = finite
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        format!(
            "min={min:.4}, max={max:.4}, mean={mean:.4}, std={:.4}",
            var.sqrt()
        )
    };
    if nan > 0 || inf > 0 {
        summary.push_str(&format!(" [NaN={nan}, Inf={inf}]"));
    }
    summary
}

/// Errors with the tensor's name and timestep if `enabled` and any value is NaN/Inf
pub(crate) fn check_finite_if<B: Backend, const D: usize>(
    tensor: &Tensor<B, D>,
    what: &'static str,
    t: usize,
    enabled: bool,
) -> Result<()> {
    if !enabled {
        return Ok(());
    }

    let finite = tensor
        .clone()
        .into_data()
        .iter::<f32>()
        .all(|x| x.is_finite());
    if finite {
        Ok(())
    } else {
        tracing::error!(what, t, stats = %tensor_stats(tensor), "non-finite sampler state");
        Err(DiffusionError::NonFinite { what, t })
    }
}
