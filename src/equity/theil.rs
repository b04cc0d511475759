//! Theil T and Theil L indices with their exact between/within decompositions.
//!
//! With population mean `μ`, group means `μ_g`, group sizes `n_g`:
//!
//! ```text
//! T = (1/n) Σ (v/μ) ln(v/μ)
//!   = Σ s_g ln(μ_g/μ)  +  Σ s_g T_g          s_g = (n_g/n)(μ_g/μ)
//!
//! L = (1/n) Σ ln(μ/v)
//!   = Σ p_g ln(μ/μ_g)  +  Σ p_g L_g          p_g = n_g/n
//! ```
//!
//! Both indices are undefined for non-positive values.

use crate::error::RoiError;

use super::Components;
use super::partition::Partition;

pub(crate) fn theil_t(p: &Partition<'_>) -> Result<Components, RoiError> {
    require_positive(p.values, "Theil T")?;
    if p.is_constant() {
        return Ok(Components::zero(p.cells.len()));
    }

    let n = p.n() as f64;
    let mu = p.mean;
    let overall = theil_t_index(p.values, mu);

    let mut between = 0.0;
    let mut within = 0.0;
    let mut indices = Vec::with_capacity(p.cells.len());
    for cell in &p.cells {
        let ratio = cell.mean / mu;
        let share = (cell.n() as f64 / n) * ratio;
        let t_g = theil_t_index(&cell.values, cell.mean);
        between += share * ratio.ln();
        within += share * t_g;
        indices.push(t_g);
    }

    Ok(Components {
        overall,
        between,
        within,
        group_indices: indices,
    })
}

pub(crate) fn theil_l(p: &Partition<'_>) -> Result<Components, RoiError> {
    require_positive(p.values, "Theil L")?;
    if p.is_constant() {
        return Ok(Components::zero(p.cells.len()));
    }

    let n = p.n() as f64;
    let mu = p.mean;
    let overall = theil_l_index(p.values, mu);

    let mut between = 0.0;
    let mut within = 0.0;
    let mut indices = Vec::with_capacity(p.cells.len());
    for cell in &p.cells {
        let share = cell.n() as f64 / n;
        let l_g = theil_l_index(&cell.values, cell.mean);
        between += share * (mu / cell.mean).ln();
        within += share * l_g;
        indices.push(l_g);
    }

    Ok(Components {
        overall,
        between,
        within,
        group_indices: indices,
    })
}

fn theil_t_index(values: &[f64], mean: f64) -> f64 {
    let sum: f64 = values
        .iter()
        .map(|v| {
            let r = v / mean;
            r * r.ln()
        })
        .sum();
    sum / values.len() as f64
}

fn theil_l_index(values: &[f64], mean: f64) -> f64 {
    let sum: f64 = values.iter().map(|v| (mean / v).ln()).sum();
    sum / values.len() as f64
}

fn require_positive(values: &[f64], label: &str) -> Result<(), RoiError> {
    match values.iter().enumerate().find(|(_, v)| **v <= 0.0) {
        Some((i, v)) => Err(RoiError::invalid(format!(
            "{label} undefined for non-positive value {v} at position {i}"
        ))),
        None => Ok(()),
    }
}
