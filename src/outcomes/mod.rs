//! Program outcomes besides earnings: completion and employment.
//!
//! Both reduce to per-group means of a per-person value. Missing values are
//! counted per group and never imputed.

pub mod completion;
pub mod employment;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::GroupKey;
use crate::equity::MIN_REPORTABLE_GROUP;

pub use completion::{CompletionRecord, CompletionReport, summarize_completion};
pub use employment::{
    EmploymentRecord, EmploymentReport, IndividualEmployment, StateEmploymentRates,
    employment_outcomes,
};

/// Mean of one outcome within a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub group: GroupKey,
    /// Members with a value.
    pub n: usize,
    /// Members whose value was missing.
    pub n_missing: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation; `None` below two values.
    pub sd: Option<f64>,
    pub small_group: bool,
}

/// Group `(key, value)` rows and summarize each group, in key order.
pub(crate) fn summarize_by_group<'a>(
    rows: impl IntoIterator<Item = (&'a GroupKey, Option<f64>)>,
) -> Vec<OutcomeSummary> {
    let mut cells: BTreeMap<&GroupKey, (Vec<f64>, usize)> = BTreeMap::new();
    for (key, value) in rows {
        let (values, missing) = cells.entry(key).or_default();
        match value.filter(|v| v.is_finite()) {
            Some(v) => values.push(v),
            None => *missing += 1,
        }
    }

    cells
        .into_iter()
        .map(|(group, (values, n_missing))| {
            let n = values.len();
            let mean = (n > 0).then(|| values.iter().sum::<f64>() / n as f64);
            let sd = mean.filter(|_| n >= 2).map(|m| {
                let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
                (ss / (n as f64 - 1.0)).sqrt()
            });
            OutcomeSummary {
                group: group.clone(),
                n,
                n_missing,
                mean,
                sd,
                small_group: n < MIN_REPORTABLE_GROUP,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_come_back_sorted_with_missing_counted() {
        let a = GroupKey::single("a");
        let b = GroupKey::single("b");
        let rows = vec![
            (&b, Some(1.0)),
            (&a, Some(2.0)),
            (&a, None),
            (&a, Some(4.0)),
            (&b, Some(f64::NAN)),
        ];
        let out = summarize_by_group(rows);
        assert_eq!(out[0].group, a);
        assert_eq!(out[0].n, 2);
        assert_eq!(out[0].n_missing, 1);
        assert_eq!(out[0].mean, Some(3.0));
        assert!((out[0].sd.unwrap() - 2.0_f64.sqrt()).abs() < 1e-12);
        assert_eq!(out[1].n, 1);
        assert_eq!(out[1].n_missing, 1);
        assert_eq!(out[1].sd, None);
        assert!(out[1].small_group);
    }
}
