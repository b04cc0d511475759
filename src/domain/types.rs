//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed between the decomposer, the premium calculator and the orchestrator
//! - exported to JSON/CSV
//! - built by hand in tests without touching the filesystem

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::RoiError;

/// Inequality measure understood by the decomposer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum InequalityMethod {
    /// Entropy-based Theil T index (income-share weighted).
    TheilT,
    /// Mean log deviation, Theil L (population-share weighted).
    TheilL,
    /// Rank-based Gini coefficient. Its group decomposition is approximate.
    Gini,
    /// ANOVA-style sum-of-squares decomposition.
    #[serde(rename = "variance")]
    #[value(name = "variance")]
    VarianceDecomposition,
}

impl InequalityMethod {
    pub const ALL: [InequalityMethod; 4] = [
        InequalityMethod::TheilT,
        InequalityMethod::TheilL,
        InequalityMethod::Gini,
        InequalityMethod::VarianceDecomposition,
    ];

    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            InequalityMethod::TheilT => "Theil T",
            InequalityMethod::TheilL => "Theil L",
            InequalityMethod::Gini => "Gini",
            InequalityMethod::VarianceDecomposition => "Variance (SS)",
        }
    }

    /// Whether `between + within` reconstructs the overall index exactly.
    pub fn is_exact(self) -> bool {
        !matches!(self, InequalityMethod::Gini)
    }
}

impl fmt::Display for InequalityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A partition cell: one categorical value per grouping column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey(Vec<String>);

impl GroupKey {
    pub fn new(parts: Vec<String>) -> Self {
        Self(parts)
    }

    pub fn single(label: impl Into<String>) -> Self {
        Self(vec![label.into()])
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for GroupKey {
    fn from(value: &str) -> Self {
        GroupKey::single(value)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" / "))
    }
}

/// Tokens treated as a missing cell at ingest and on numeric parsing.
const MISSING_TOKENS: [&str; 6] = ["", "na", "n/a", "nan", "null", "."];

pub fn is_missing_token(raw: &str) -> bool {
    let t = raw.trim();
    MISSING_TOKENS.iter().any(|m| t.eq_ignore_ascii_case(m))
}

/// Parse a raw cell as a number.
///
/// `Ok(None)` is a missing cell, `Err` means the cell holds text that is not a
/// finite number.
pub fn parse_numeric_cell(raw: &str) -> Result<Option<f64>, String> {
    if is_missing_token(raw) {
        return Ok(None);
    }
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(trimmed.to_string()),
    }
}

/// A named column of raw cells. `None` is a missing cell.
///
/// Cells stay as text until a caller asks for a typed view; that keeps codes
/// such as state FIPS (`"08"`) or block-group GEOIDs intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Option<String>>,
}

/// An in-memory tabular dataset: one id per row plus named columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    ids: Vec<String>,
    columns: Vec<Column>,
}

impl Dataset {
    pub fn new(ids: Vec<String>) -> Self {
        Self {
            ids,
            columns: Vec::new(),
        }
    }

    /// Builder form of [`Dataset::add_column`].
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        cells: Vec<Option<String>>,
    ) -> Result<Self, RoiError> {
        self.add_column(name, cells)?;
        Ok(self)
    }

    /// Add (or replace) a column. The column must have one cell per row.
    pub fn add_column(
        &mut self,
        name: impl Into<String>,
        cells: Vec<Option<String>>,
    ) -> Result<(), RoiError> {
        let name = name.into();
        if cells.len() != self.ids.len() {
            return Err(RoiError::invalid(format!(
                "column `{name}` has {} cells but the dataset has {} rows",
                cells.len(),
                self.ids.len()
            )));
        }
        let cells = cells
            .into_iter()
            .map(|c| c.filter(|s| !is_missing_token(s)))
            .collect();
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.cells = cells,
            None => self.columns.push(Column { name, cells }),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn require_column(&self, name: &str) -> Result<&Column, RoiError> {
        self.column(name).ok_or_else(|| RoiError::MissingColumn {
            column: name.to_string(),
        })
    }

    /// Typed numeric view of a column.
    ///
    /// Fails if any non-missing cell is not a finite number: a value column is
    /// either numeric or rejected, never partially coerced.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>, RoiError> {
        let column = self.require_column(name)?;
        column
            .cells
            .iter()
            .enumerate()
            .map(|(row, cell)| match cell {
                None => Ok(None),
                Some(raw) => parse_numeric_cell(raw).map_err(|bad| {
                    RoiError::invalid(format!(
                        "column `{name}` is not numeric (row {}, id `{}`: '{bad}')",
                        row + 1,
                        self.ids[row]
                    ))
                }),
            })
            .collect()
    }

    /// Categorical view of a column (raw labels, trimmed).
    pub fn label_column(&self, name: &str) -> Result<Vec<Option<String>>, RoiError> {
        let column = self.require_column(name)?;
        Ok(column
            .cells
            .iter()
            .map(|c| c.as_deref().map(|s| s.trim().to_string()))
            .collect())
    }

    /// Row-wise view over one value column and several grouping columns.
    pub fn observations(
        &self,
        value_column: &str,
        group_columns: &[String],
    ) -> Result<Vec<Observation>, RoiError> {
        let values = self.numeric_column(value_column)?;
        let labels: Vec<Vec<Option<String>>> = group_columns
            .iter()
            .map(|g| self.label_column(g))
            .collect::<Result<_, _>>()?;

        Ok(self
            .ids
            .iter()
            .enumerate()
            .map(|(row, id)| Observation {
                id: id.clone(),
                value: values[row],
                labels: labels.iter().map(|col| col[row].clone()).collect(),
            })
            .collect())
    }
}

/// One person-record as seen by a single analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: String,
    pub value: Option<f64>,
    /// One label per requested grouping column, in request order.
    pub labels: Vec<Option<String>>,
}

impl Observation {
    /// The partition cell for this row, or `None` if any label is missing.
    pub fn group_key(&self) -> Option<GroupKey> {
        self.labels
            .iter()
            .cloned()
            .collect::<Option<Vec<String>>>()
            .map(GroupKey::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(raw: &[&str]) -> Vec<Option<String>> {
        raw.iter().map(|s| Some(s.to_string())).collect()
    }

    #[test]
    fn numeric_column_rejects_text_but_keeps_missing() {
        let ds = Dataset::new(vec!["a".into(), "b".into(), "c".into()])
            .with_column("wage", cells(&["100", "NA", "200"]))
            .unwrap()
            .with_column("race", cells(&["x", "y", "x"]))
            .unwrap();

        assert_eq!(
            ds.numeric_column("wage").unwrap(),
            vec![Some(100.0), None, Some(200.0)]
        );
        let err = ds.numeric_column("race").unwrap_err();
        assert!(matches!(err, RoiError::InvalidInput { .. }));
        assert!(matches!(
            ds.numeric_column("nope"),
            Err(RoiError::MissingColumn { .. })
        ));
    }

    #[test]
    fn labels_keep_leading_zeros() {
        let ds = Dataset::new(vec!["a".into()])
            .with_column("state", cells(&["08"]))
            .unwrap();
        assert_eq!(ds.label_column("state").unwrap(), vec![Some("08".to_string())]);
    }

    #[test]
    fn group_key_requires_every_label() {
        let obs = Observation {
            id: "1".into(),
            value: Some(1.0),
            labels: vec![Some("F".into()), None],
        };
        assert!(obs.group_key().is_none());

        let obs = Observation {
            id: "2".into(),
            value: Some(1.0),
            labels: vec![Some("F".into()), Some("B".into())],
        };
        assert_eq!(obs.group_key().unwrap().to_string(), "F / B");
    }

    #[test]
    fn add_column_checks_length() {
        let mut ds = Dataset::new(vec!["a".into(), "b".into()]);
        assert!(ds.add_column("x", cells(&["1"])).is_err());
    }
}
