//! Inequality decomposition into between-group and within-group components.
//!
//! All four methods share the same entry point, [`decompose`], and return a
//! [`DecompositionResult`]. Theil T, Theil L and the variance decomposition are
//! exact (`between + within == overall` up to floating error). The Gini
//! decomposition is approximate and carries its overlap in `residual`.
//!
//! Degenerate inputs (all values identical) produce zeros everywhere with
//! `degenerate = true` rather than a division by zero.

mod gini;
mod partition;
mod theil;
mod variance;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{GroupKey, InequalityMethod};
use crate::error::RoiError;

pub use gini::gini_coefficient;
pub use partition::{GroupSummary, MIN_REPORTABLE_GROUP};

use partition::Partition;

/// Raw output of one method before it is wrapped into a [`DecompositionResult`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Components {
    pub overall: f64,
    pub between: f64,
    pub within: f64,
    pub group_indices: Vec<f64>,
}

impl Components {
    pub fn zero(groups: usize) -> Self {
        Self {
            overall: 0.0,
            between: 0.0,
            within: 0.0,
            group_indices: vec![0.0; groups],
        }
    }
}

/// Result of one decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionResult {
    pub method: InequalityMethod,
    pub overall: f64,
    pub between: f64,
    pub within: f64,
    /// `overall − between − within`. Floating noise for exact methods.
    pub residual: f64,
    /// `between / overall`, clamped to `[0, 1]`. Zero when degenerate.
    pub ratio: f64,
    pub degenerate: bool,
    pub exact: bool,
    pub n: usize,
    pub groups: Vec<GroupSummary>,
}

impl DecompositionResult {
    /// Share of inequality that lies within groups.
    pub fn within_ratio(&self) -> f64 {
        if self.degenerate {
            0.0
        } else {
            (self.within / self.overall).clamp(0.0, 1.0)
        }
    }

    pub fn small_groups(&self) -> impl Iterator<Item = &GroupSummary> {
        self.groups.iter().filter(|g| g.small_group)
    }
}

/// Decompose `values` by the parallel `groups` labels under `method`.
///
/// # Errors
///
/// - [`RoiError::InvalidInput`] for empty or mismatched inputs and non-finite values
/// - [`RoiError::InvalidInput`] for Theil with any value `<= 0`, or Gini with any value `< 0`
pub fn decompose(
    method: InequalityMethod,
    values: &[f64],
    groups: &[GroupKey],
) -> Result<DecompositionResult, RoiError> {
    let partition = Partition::new(values, groups)?;
    let components = match method {
        InequalityMethod::TheilT => theil::theil_t(&partition)?,
        InequalityMethod::TheilL => theil::theil_l(&partition)?,
        InequalityMethod::Gini => gini::gini(&partition)?,
        InequalityMethod::VarianceDecomposition => variance::anova(&partition),
    };

    // Every index is non-negative. Only identical values (or an index that
    // underflows to zero) leave nothing to divide by; small units are fine.
    let degenerate = partition.is_constant() || components.overall <= 0.0;
    let ratio = if degenerate {
        0.0
    } else {
        (components.between / components.overall).clamp(0.0, 1.0)
    };
    let (overall, between, within) = if degenerate {
        (0.0, 0.0, 0.0)
    } else {
        (components.overall, components.between, components.within)
    };

    debug!(
        method = %method,
        n = partition.n(),
        groups = partition.cells.len(),
        overall,
        between,
        within,
        degenerate,
        "decomposition complete"
    );

    let group_indices = if degenerate {
        vec![0.0; partition.cells.len()]
    } else {
        components.group_indices
    };

    Ok(DecompositionResult {
        method,
        overall,
        between,
        within,
        residual: overall - between - within,
        ratio,
        degenerate,
        exact: method.is_exact(),
        n: partition.n(),
        groups: partition::summarize(&partition, &group_indices),
    })
}

impl InequalityMethod {
    /// Method-call form of [`decompose`].
    pub fn decompose(
        self,
        values: &[f64],
        groups: &[GroupKey],
    ) -> Result<DecompositionResult, RoiError> {
        decompose(self, values, groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(labels: &[&str]) -> Vec<GroupKey> {
        labels.iter().map(|l| (*l).into()).collect()
    }

    #[test]
    fn constant_values_are_degenerate_for_every_method() {
        let values = [10.0, 10.0, 10.0, 10.0];
        let groups = keys(&["a", "a", "b", "b"]);
        for method in InequalityMethod::ALL {
            let r = decompose(method, &values, &groups).unwrap();
            assert_eq!(r.overall, 0.0, "{method}");
            assert_eq!(r.ratio, 0.0);
            assert!(r.degenerate);
        }
    }

    #[test]
    fn tiny_units_are_not_mistaken_for_equality() {
        let groups = keys(&["a", "a", "b", "b"]);
        let small = [1e-7, 1e-7, 3e-7, 3e-7];
        let large: Vec<f64> = small.iter().map(|v| v * 1e7).collect();
        for method in InequalityMethod::ALL {
            let a = decompose(method, &small, &groups).unwrap();
            let b = decompose(method, &large, &groups).unwrap();
            assert!(!a.degenerate, "{method}");
            assert!((a.ratio - b.ratio).abs() < 1e-9, "{method}: {} vs {}", a.ratio, b.ratio);
        }
        let variance =
            decompose(InequalityMethod::VarianceDecomposition, &small, &groups).unwrap();
        assert!((variance.ratio - 1.0).abs() < 1e-9);
        assert!(variance.overall > 0.0);
    }

    #[test]
    fn two_internally_equal_groups_are_all_between() {
        let values = [100.0, 100.0, 200.0, 200.0];
        let groups = keys(&["low", "low", "high", "high"]);
        for method in InequalityMethod::ALL {
            let r = decompose(method, &values, &groups).unwrap();
            assert!(r.within.abs() < 1e-12, "{method}: within = {}", r.within);
            assert!((r.ratio - 1.0).abs() < 1e-9, "{method}: ratio = {}", r.ratio);
            assert!(!r.degenerate);
        }
    }

    #[test]
    fn single_group_has_no_between_component() {
        let values = [3.0, 7.0, 11.0, 2.0, 5.0];
        let groups = keys(&["all"; 5]);
        for method in InequalityMethod::ALL {
            let r = decompose(method, &values, &groups).unwrap();
            assert_eq!(r.between, 0.0, "{method}");
            assert_eq!(r.ratio, 0.0);
            assert!((r.within - r.overall).abs() < 1e-12);
        }
    }

    #[test]
    fn exact_methods_have_tiny_residuals() {
        let values = [12.0, 30.0, 8.0, 55.0, 41.0, 19.0, 23.0, 70.0];
        let groups = keys(&["a", "b", "a", "c", "b", "a", "c", "c"]);
        for method in [
            InequalityMethod::TheilT,
            InequalityMethod::TheilL,
            InequalityMethod::VarianceDecomposition,
        ] {
            let r = decompose(method, &values, &groups).unwrap();
            assert!(r.exact);
            assert!(r.residual.abs() < 1e-9 * r.overall.max(1.0), "{method}");
        }

        let gini = decompose(InequalityMethod::Gini, &values, &groups).unwrap();
        assert!(!gini.exact);
        assert!(gini.ratio >= 0.0 && gini.ratio <= 1.0);
    }

    #[test]
    fn theil_rejects_non_positive_values() {
        let values = [5.0, 0.0, 3.0];
        let groups = keys(&["a", "b", "b"]);
        let err = decompose(InequalityMethod::TheilT, &values, &groups).unwrap_err();
        assert!(matches!(err, RoiError::InvalidInput { .. }));
        assert!(err.to_string().contains("Theil T undefined for non-positive value"));

        // Gini and variance accept zeros.
        assert!(decompose(InequalityMethod::Gini, &values, &groups).is_ok());
        assert!(decompose(InequalityMethod::VarianceDecomposition, &values, &groups).is_ok());
    }

    #[test]
    fn gini_is_scale_invariant() {
        let values = [3.0, 9.0, 1.0, 14.0, 6.0, 6.5];
        let scaled: Vec<f64> = values.iter().map(|v| v * 37.5).collect();
        let groups = keys(&["a", "a", "b", "b", "c", "c"]);
        let a = decompose(InequalityMethod::Gini, &values, &groups).unwrap();
        let b = decompose(InequalityMethod::Gini, &scaled, &groups).unwrap();
        assert!((a.overall - b.overall).abs() < 1e-12);
        assert!((a.between - b.between).abs() < 1e-12);
    }

    #[test]
    fn length_mismatch_and_empty_are_invalid() {
        assert!(decompose(InequalityMethod::Gini, &[], &[]).is_err());
        assert!(decompose(InequalityMethod::Gini, &[1.0, 2.0], &keys(&["a"])).is_err());
    }

    #[test]
    fn groups_are_summarized_in_key_order() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let groups = keys(&["z", "a", "z", "a"]);
        let r = decompose(InequalityMethod::VarianceDecomposition, &values, &groups).unwrap();
        let labels: Vec<String> = r.groups.iter().map(|g| g.key.to_string()).collect();
        assert_eq!(labels, vec!["a", "z"]);
        assert_eq!(r.small_groups().count(), 2);
    }
}
