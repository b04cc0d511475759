//! Offline fit of the earnings model from survey microdata.
//!
//! Design matrix columns, in order:
//!
//! ```text
//! [1, D_state_2, …, D_state_k, S, X, X², S·X]
//! ```
//!
//! where the lexicographically first state is the reference category and has
//! no dummy. Survey weights enter through `sqrt(w)` row scaling.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::RoiError;
use crate::math::{apply_row_weights, solve_least_squares, weighted_r_squared};

use super::model::{COEFFICIENTS_VERSION, EarningsModelCoefficients};

/// Below this R² the fit is logged as weak. Wage regressions of this form
/// typically explain about a third of the variance.
const LOW_R_SQUARED: f64 = 0.1;

/// One person-year of survey microdata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyRecord {
    /// Survey year, when known; used to restate wages in constant dollars.
    pub year: Option<i32>,
    pub state: String,
    pub wage: f64,
    pub schooling_years: f64,
    pub experience_years: f64,
    pub weight: f64,
}

/// Options for [`fit_earnings_model`].
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    /// Drop records with more experience than this (e.g. retirees).
    pub max_experience: Option<f64>,
    /// Ignore survey weights and fit unweighted OLS.
    pub unweighted: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_experience: Some(50.0),
            unweighted: false,
        }
    }
}

/// Fitted coefficients plus fit bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub coefficients: EarningsModelCoefficients,
    pub r_squared: f64,
    pub n_used: usize,
    pub n_dropped: usize,
}

/// Fit `ln(wage)` on state dummies, schooling, experience, experience² and
/// the schooling × experience interaction.
///
/// Records with a non-positive or non-finite wage, a non-positive weight, or
/// experience above `max_experience` are dropped and counted.
pub fn fit_earnings_model(
    records: &[SurveyRecord],
    opts: &FitOptions,
) -> Result<FitReport, RoiError> {
    let usable: Vec<&SurveyRecord> = records.iter().filter(|r| is_usable(r, opts)).collect();
    let n_dropped = records.len() - usable.len();
    if usable.is_empty() {
        return Err(RoiError::EmptyDataset {
            reason: format!(
                "no usable survey records ({} supplied, all dropped)",
                records.len()
            ),
        });
    }

    let states: Vec<&str> = {
        let mut s: Vec<&str> = usable.iter().map(|r| r.state.as_str()).collect();
        s.sort_unstable();
        s.dedup();
        s
    };
    let reference_state = states[0].to_string();
    let dummy_index: BTreeMap<&str, usize> = states[1..]
        .iter()
        .enumerate()
        .map(|(i, s)| (*s, 1 + i))
        .collect();

    let n_state = dummy_index.len();
    let p = 1 + n_state + 4;
    let n = usable.len();
    if n < p {
        return Err(RoiError::ModelFit {
            reason: format!("{n} usable records cannot identify {p} coefficients"),
        });
    }

    let mut x = DMatrix::<f64>::zeros(n, p);
    let mut y = DVector::<f64>::zeros(n);
    let mut weights = Vec::with_capacity(n);
    for (i, r) in usable.iter().enumerate() {
        x[(i, 0)] = 1.0;
        if let Some(&col) = dummy_index.get(r.state.as_str()) {
            x[(i, col)] = 1.0;
        }
        let s = r.schooling_years;
        let e = r.experience_years;
        let base = 1 + n_state;
        x[(i, base)] = s;
        x[(i, base + 1)] = e;
        x[(i, base + 2)] = e * e;
        x[(i, base + 3)] = s * e;
        y[i] = r.wage.ln();
        weights.push(if opts.unweighted { 1.0 } else { r.weight });
    }

    let design = x.clone();
    let response: Vec<f64> = y.iter().copied().collect();
    apply_row_weights(&mut x, &mut y, &weights);

    let beta = solve_least_squares(&x, &y).ok_or_else(|| RoiError::ModelFit {
        reason: "least-squares system is singular or ill-conditioned".to_string(),
    })?;

    let fitted: Vec<f64> = (&design * &beta).iter().copied().collect();
    let r_squared = weighted_r_squared(&response, &fitted, &weights);

    let state_effects = dummy_index
        .iter()
        .map(|(s, &col)| (s.to_string(), beta[col]))
        .collect();
    let base = 1 + n_state;
    let coefficients = EarningsModelCoefficients {
        version: COEFFICIENTS_VERSION,
        intercept: beta[0],
        state_effects,
        reference_state,
        schooling: beta[base],
        experience: beta[base + 1],
        experience_sq: beta[base + 2],
        schooling_x_experience: beta[base + 3],
        r_squared,
        n_obs: n,
    };

    info!(
        n_used = n,
        n_dropped,
        states = states.len(),
        r_squared,
        "fitted earnings model"
    );
    if r_squared < LOW_R_SQUARED {
        warn!(r_squared, "earnings model explains little of the wage variance");
    }

    Ok(FitReport {
        coefficients,
        r_squared,
        n_used: n,
        n_dropped,
    })
}

fn is_usable(r: &SurveyRecord, opts: &FitOptions) -> bool {
    r.wage.is_finite()
        && r.wage > 0.0
        && r.weight.is_finite()
        && r.weight > 0.0
        && r.schooling_years.is_finite()
        && r.experience_years.is_finite()
        && !r.state.trim().is_empty()
        && opts
            .max_experience
            .is_none_or(|max| r.experience_years <= max)
}
