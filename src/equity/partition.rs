//! Grouping of a value vector by a parallel label vector, plus per-group summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::GroupKey;
use crate::error::RoiError;

/// Groups below this size are flagged so reports can suppress them.
pub const MIN_REPORTABLE_GROUP: usize = 30;

/// Values split into groups, with population-level totals.
///
/// Within a group, values keep their input order. Groups are ordered by key.
#[derive(Debug, Clone)]
pub(crate) struct Partition<'a> {
    pub values: &'a [f64],
    pub total: f64,
    pub mean: f64,
    pub cells: Vec<GroupCell>,
}

#[derive(Debug, Clone)]
pub(crate) struct GroupCell {
    pub key: GroupKey,
    pub values: Vec<f64>,
    pub total: f64,
    pub mean: f64,
}

impl GroupCell {
    pub fn n(&self) -> usize {
        self.values.len()
    }
}

impl<'a> Partition<'a> {
    pub fn new(values: &'a [f64], groups: &[GroupKey]) -> Result<Self, RoiError> {
        if values.is_empty() || groups.is_empty() {
            return Err(RoiError::invalid(
                "no observations to decompose (empty value or group list)",
            ));
        }
        if values.len() != groups.len() {
            return Err(RoiError::invalid(format!(
                "value and group vectors differ in length ({} vs {})",
                values.len(),
                groups.len()
            )));
        }
        if let Some((i, v)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(RoiError::invalid(format!(
                "non-finite value {v} at position {i}"
            )));
        }

        let mut by_group: BTreeMap<&GroupKey, Vec<f64>> = BTreeMap::new();
        for (v, g) in values.iter().zip(groups) {
            by_group.entry(g).or_default().push(*v);
        }

        let cells = by_group
            .into_iter()
            .map(|(key, values)| {
                let total: f64 = values.iter().sum();
                let mean = total / values.len() as f64;
                GroupCell {
                    key: key.clone(),
                    values,
                    total,
                    mean,
                }
            })
            .collect();

        let total: f64 = values.iter().sum();
        Ok(Self {
            values,
            total,
            mean: total / values.len() as f64,
            cells,
        })
    }

    pub fn n(&self) -> usize {
        self.values.len()
    }

    /// True when every value is identical (including the single-value case).
    pub fn is_constant(&self) -> bool {
        let first = self.values[0];
        self.values.iter().all(|v| *v == first)
    }
}

/// Descriptive statistics for one group in a decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub key: GroupKey,
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; `None` for single-member groups.
    pub sd: Option<f64>,
    pub min: f64,
    pub max: f64,
    pub population_share: f64,
    /// Share of the population total held by this group (`None` if the total is zero).
    pub value_share: Option<f64>,
    /// The group's own index under the requested method.
    pub index: f64,
    pub small_group: bool,
}

pub(crate) fn summarize(partition: &Partition<'_>, group_indices: &[f64]) -> Vec<GroupSummary> {
    let n = partition.n() as f64;
    partition
        .cells
        .iter()
        .zip(group_indices)
        .map(|(cell, &index)| {
            let mut sorted = cell.values.clone();
            sorted.sort_by(|a, b| a.total_cmp(b));
            GroupSummary {
                key: cell.key.clone(),
                n: cell.n(),
                mean: cell.mean,
                median: median_sorted(&sorted),
                sd: sample_sd(&cell.values, cell.mean),
                min: sorted[0],
                max: sorted[sorted.len() - 1],
                population_share: cell.n() as f64 / n,
                value_share: if partition.total != 0.0 {
                    Some(cell.total / partition.total)
                } else {
                    None
                },
                index,
                small_group: cell.n() < MIN_REPORTABLE_GROUP,
            }
        })
        .collect()
}

fn median_sorted(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

fn sample_sd(values: &[f64], mean: f64) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((ss / (values.len() as f64 - 1.0)).sqrt())
}
