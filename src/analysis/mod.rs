//! Equity analysis orchestration.
//!
//! Turns a dataset plus an [`AnalysisRequest`] into one decomposition per
//! requested method. Validation happens once, before any method runs:
//!
//! - the dataset must have rows and the value column must be numeric
//! - rows missing the value or any group label are excluded and counted
//!
//! A method that rejects the remaining values (e.g. Theil on a zero) fails
//! the whole request.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Dataset, GroupKey, InequalityMethod};
use crate::earnings::PremiumResult;
use crate::equity::{DecompositionResult, decompose};
use crate::error::RoiError;
use crate::ses::BatchResolution;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub value_column: String,
    pub group_columns: Vec<String>,
    pub methods: Vec<InequalityMethod>,
}

impl AnalysisRequest {
    /// Request every method.
    pub fn new(value_column: impl Into<String>, group_columns: Vec<String>) -> Self {
        Self {
            value_column: value_column.into(),
            group_columns,
            methods: InequalityMethod::ALL.to_vec(),
        }
    }

    pub fn with_methods(mut self, methods: Vec<InequalityMethod>) -> Self {
        self.methods = methods;
        self
    }
}

/// Rows left out of the decomposition and why.
///
/// A row missing both its value and a group label counts as `missing_value`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionReport {
    pub rows_total: usize,
    pub missing_value: usize,
    pub missing_group: usize,
    pub rows_used: usize,
}

impl ExclusionReport {
    pub fn excluded(&self) -> usize {
        self.missing_value + self.missing_group
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub value_column: String,
    pub group_columns: Vec<String>,
    pub results: BTreeMap<InequalityMethod, DecompositionResult>,
    pub exclusions: ExclusionReport,
}

pub struct EquityAnalysis;

impl EquityAnalysis {
    pub fn run(dataset: &Dataset, request: &AnalysisRequest) -> Result<AnalysisReport, RoiError> {
        if dataset.is_empty() {
            return Err(RoiError::empty("dataset has no rows"));
        }
        if request.group_columns.is_empty() {
            return Err(RoiError::invalid("at least one group column is required"));
        }
        if request.methods.is_empty() {
            return Err(RoiError::invalid("no inequality methods requested"));
        }

        let observations = dataset.observations(&request.value_column, &request.group_columns)?;

        let mut exclusions = ExclusionReport {
            rows_total: observations.len(),
            ..Default::default()
        };
        let mut values = Vec::with_capacity(observations.len());
        let mut groups = Vec::with_capacity(observations.len());
        for obs in &observations {
            let Some(value) = obs.value else {
                exclusions.missing_value += 1;
                continue;
            };
            let Some(key) = obs.group_key() else {
                exclusions.missing_group += 1;
                continue;
            };
            values.push(value);
            groups.push(key);
        }
        exclusions.rows_used = values.len();

        info!(
            value_column = %request.value_column,
            rows_total = exclusions.rows_total,
            missing_value = exclusions.missing_value,
            missing_group = exclusions.missing_group,
            rows_used = exclusions.rows_used,
            "equity analysis inputs"
        );

        if values.is_empty() {
            return Err(RoiError::empty(format!(
                "no rows have both `{}` and every group label",
                request.value_column
            )));
        }

        let results = decompose_all(&request.methods, &values, &groups)?;
        Ok(AnalysisReport {
            value_column: request.value_column.clone(),
            group_columns: request.group_columns.clone(),
            results,
            exclusions,
        })
    }

    /// Decompose earnings premiums by the groups they were computed for.
    ///
    /// Premiums are frequently negative, so in practice only the variance
    /// decomposition applies; other methods report their usual input errors.
    pub fn run_premiums(
        premiums: &PremiumResult,
        methods: &[InequalityMethod],
    ) -> Result<BTreeMap<InequalityMethod, DecompositionResult>, RoiError> {
        let (values, groups) = premiums.decomposition_input();
        if values.is_empty() {
            return Err(RoiError::empty("no individuals with an observed wage"));
        }
        decompose_all(methods, &values, &groups)
    }
}

fn decompose_all(
    methods: &[InequalityMethod],
    values: &[f64],
    groups: &[GroupKey],
) -> Result<BTreeMap<InequalityMethod, DecompositionResult>, RoiError> {
    methods
        .iter()
        .map(|&m| decompose(m, values, groups).map(|r| (m, r)))
        .collect()
}

/// Add an SES band column built from a batch resolution.
///
/// Records must line up with dataset rows (same order, same ids). Unresolved
/// records leave the cell missing, so the analysis excludes and counts them.
pub fn attach_ses_bands(
    dataset: &mut Dataset,
    batch: &BatchResolution,
    column: &str,
) -> Result<(), RoiError> {
    if batch.records.len() != dataset.len() {
        return Err(RoiError::invalid(format!(
            "resolution has {} records but the dataset has {} rows",
            batch.records.len(),
            dataset.len()
        )));
    }
    if let Some((row, record)) = batch
        .records
        .iter()
        .enumerate()
        .find(|(row, r)| r.id != dataset.ids()[*row])
    {
        return Err(RoiError::invalid(format!(
            "resolution record `{}` does not match dataset row {} (`{}`)",
            record.id,
            row + 1,
            dataset.ids()[row]
        )));
    }

    let cells = batch
        .records
        .iter()
        .map(|r| r.band().map(|b| b.label().to_string()))
        .collect();
    dataset.add_column(column, cells)
}
