//! Weighted least squares solver and fit diagnostics.
//!
//! The earnings model is a linear regression of the form:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2
//! ```
//!
//! Implementation choices:
//! - We scale rows by `sqrt(w_i)` and solve an ordinary least squares problem.
//! - We use SVD so tall design matrices (many survey rows, a few dozen columns)
//!   solve robustly. Nalgebra's `QR::solve` is intended for square systems and
//!   will panic for non-square matrices.
//! - State dummies can be nearly collinear in small samples, so the solve falls
//!   back to looser singular-value tolerances before giving up.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Scale each row of `x` and entry of `y` by `sqrt(w_i)`.
///
/// Weights must be non-negative; the caller filters invalid rows first.
pub fn apply_row_weights(x: &mut DMatrix<f64>, y: &mut DVector<f64>, weights: &[f64]) {
    for (i, w) in weights.iter().enumerate() {
        let s = w.sqrt();
        x.row_mut(i).scale_mut(s);
        y[i] *= s;
    }
}

/// Weighted coefficient of determination.
///
/// `R² = 1 − SS_res / SS_tot` with both sums weighted by `w` and centered on
/// the weighted mean of `y`. Returns 0 when `y` has no variation.
pub fn weighted_r_squared(y: &[f64], fitted: &[f64], weights: &[f64]) -> f64 {
    let w_sum: f64 = weights.iter().sum();
    if w_sum <= 0.0 {
        return 0.0;
    }
    let mean = y.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / w_sum;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for ((obs, fit), w) in y.iter().zip(fitted).zip(weights) {
        ss_res += w * (obs - fit).powi(2);
        ss_tot += w * (obs - mean).powi(2);
    }
    if ss_tot <= f64::EPSILON {
        return 0.0;
    }
    1.0 - ss_res / ss_tot
}
