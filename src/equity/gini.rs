//! Gini coefficient and its approximate group decomposition.
//!
//! The Gini index does not split exactly into between- and within-group parts.
//! We report:
//!
//! - between: Gini of the distribution with each value replaced by its group mean
//! - within: Σ value-share_g × Gini_g
//!
//! and keep the population-level Gini as `overall`. The leftover
//! (`overall − between − within`) is the overlap term and is reported as-is.

use crate::error::RoiError;

use super::Components;
use super::partition::Partition;

pub(crate) fn gini(p: &Partition<'_>) -> Result<Components, RoiError> {
    if let Some((i, v)) = p.values.iter().enumerate().find(|(_, v)| **v < 0.0) {
        return Err(RoiError::invalid(format!(
            "Gini undefined for negative value {v} at position {i}"
        )));
    }
    if p.is_constant() {
        return Ok(Components::zero(p.cells.len()));
    }

    let overall = gini_coefficient(p.values);

    let smoothed: Vec<f64> = p
        .cells
        .iter()
        .flat_map(|cell| std::iter::repeat_n(cell.mean, cell.n()))
        .collect();
    let between = gini_coefficient(&smoothed);

    let mut within = 0.0;
    let mut indices = Vec::with_capacity(p.cells.len());
    for cell in &p.cells {
        let g = gini_coefficient(&cell.values);
        // Not constant and non-negative, so the total is positive.
        within += (cell.total / p.total) * g;
        indices.push(g);
    }

    Ok(Components {
        overall,
        between,
        within,
        group_indices: indices,
    })
}

/// Rank-based Gini coefficient of non-negative values.
///
/// `G = 2 Σ i·v_(i) / (n Σ v) − (n + 1)/n` over values sorted ascending
/// (ranks start at 1). Returns 0 for empty, all-zero or constant input.
pub fn gini_coefficient(values: &[f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = values.iter().sum();
    if sum <= 0.0 {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted[0] == sorted[n - 1] {
        return 0.0;
    }

    let ranked: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, v)| (i + 1) as f64 * v)
        .sum();
    let nf = n as f64;
    (2.0 * ranked / (nf * sum) - (nf + 1.0) / nf).max(0.0)
}
