//! Segment reductions over flat rows
//!
//! Rows are grouped by a host-side segment id (destination atom for edge
//! messages, owning structure for atoms). Sums scatter-add rows into their
//! segment with `select_assign`, so cost grows with the number of rows and
//! the reduction stays differentiable on every backend.

use burn::prelude::*;

use crate::batch::index_tensor;

/// Averages `values [E, D]` into `[num_segments, D]` by `segment_ids`
///
/// Segments that receive no rows yield zero vectors.
pub fn segment_mean<B: Backend>(
    values: Tensor<B, 2>,
    segment_ids: &[usize],
    num_segments: usize,
) -> Tensor<B, 2> {
    let device = values.device();
    let mut counts = vec![0usize; num_segments];
    for &segment in segment_ids {
        counts[segment] += 1;
    }
    let inverse: Vec<f32> = counts
        .iter()
        .map(|&count| 1.0 / count.max(1) as f32)
        .collect();
    let inverse = Tensor::<B, 2>::from_data(TensorData::new(inverse, [num_segments, 1]), &device);

    segment_sum(values, segment_ids, num_segments) * inverse
}

/// Sums `values [E, D]` into `[num_segments, D]` by `segment_ids`
pub fn segment_sum<B: Backend>(
    values: Tensor<B, 2>,
    segment_ids: &[usize],
    num_segments: usize,
) -> Tensor<B, 2> {
    let [rows, width] = values.dims();
    let device = values.device();
    debug_assert_eq!(rows, segment_ids.len());

    let zeros = Tensor::zeros([num_segments, width], &device);
    if rows == 0 {
        return zeros;
    }

    zeros.select_assign(0, index_tensor::<B>(segment_ids, &device), values)
}
