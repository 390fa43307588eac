//! Minimum-cost linear assignment
//!
//! Hungarian method with row potentials, O(n³). Costs are given row-major.

use crate::error::{CrystalError, Result};

/// Solves the square assignment problem
///
/// Returns, for each row, the column it is assigned to such that the total
/// cost is minimal. Each column is used exactly once.
pub fn solve_assignment(cost: &[f64], rows: usize, cols: usize) -> Result<Vec<usize>> {
    if rows != cols {
        return Err(CrystalError::NonSquareAssignment { rows, cols });
    }
    if cost.len() != rows * cols {
        return Err(CrystalError::Shape(format!(
            "cost matrix has {} entries, expected {rows}x{cols}",
            cost.len()
        )));
    }
    let n = rows;
    if n == 0 {
        return Ok(Vec::new());
    }

    let at = |i: usize, j: usize| cost[(i - 1) * n + (j - 1)];

    // 1-based with a virtual column 0
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    let mut matched_row = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        matched_row[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = matched_row[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=n {
                if used[j] {
                    continue;
                }
                let reduced = at(i0, j) - u[i0] - v[j];
                if reduced < minv[j] {
                    minv[j] = reduced;
                    way[j] = j0;
                }
                if minv[j] < delta {
                    delta = minv[j];
                    j1 = j;
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[matched_row[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if matched_row[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            matched_row[j0] = matched_row[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    for j in 1..=n {
        assignment[matched_row[j] - 1] = j - 1;
    }
    Ok(assignment)
}
