//! Employment likelihood and employment premium by program.
//!
//! A participant's raw change is `employed_at_end − employed_at_start` (each
//! 0 or 1). The premium subtracts the change in the statewide employment rate
//! over the same months, so a program is not credited for a recovering labor
//! market. Statewide rates come from LAUS unemployment-rate series.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::TimeSeries;
use crate::domain::GroupKey;
use crate::error::RoiError;

use super::{OutcomeSummary, summarize_by_group};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmploymentRecord {
    pub id: String,
    pub group: GroupKey,
    /// Two-digit state FIPS code.
    pub state: Option<String>,
    /// Program entry month (first of the month).
    pub entry_month: Option<NaiveDate>,
    pub exit_month: Option<NaiveDate>,
    pub employed_at_start: Option<bool>,
    pub employed_at_end: Option<bool>,
}

/// Monthly statewide employment rates (share of the labor force employed).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateEmploymentRates {
    rates: HashMap<String, BTreeMap<NaiveDate, f64>>,
}

impl StateEmploymentRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a state's LAUS unemployment-rate series (percent).
    pub fn insert_unemployment_series(
        &mut self,
        state: &str,
        series: &TimeSeries,
    ) -> Result<(), RoiError> {
        let months = self.rates.entry(state.to_string()).or_default();
        for p in &series.points {
            if !(0.0..=100.0).contains(&p.value) {
                return Err(RoiError::invalid(format!(
                    "unemployment rate {} for {} in series {} outside 0-100",
                    p.value, p.date, series.series_id
                )));
            }
            months.insert(first_of_month(p.date), 1.0 - p.value / 100.0);
        }
        Ok(())
    }

    pub fn rate(&self, state: &str, month: NaiveDate) -> Option<f64> {
        self.rates.get(state)?.get(&first_of_month(month)).copied()
    }

    /// Change in the state's employment rate from `entry` to `exit`.
    pub fn change(&self, state: &str, entry: NaiveDate, exit: NaiveDate) -> Option<f64> {
        Some(self.rate(state, exit)? - self.rate(state, entry)?)
    }

    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }
}

/// Normalize any date to the first day of its month.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualEmployment {
    pub id: String,
    pub group: GroupKey,
    /// `employed_at_end − employed_at_start`.
    pub change: Option<f64>,
    /// Statewide employment-rate change over the participant's months.
    pub macro_change: Option<f64>,
    /// `change − macro_change`.
    pub premium: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmploymentReport {
    pub individuals: Vec<IndividualEmployment>,
    /// Share employed at exit.
    pub employed_at_end: Vec<OutcomeSummary>,
    pub change: Vec<OutcomeSummary>,
    /// Empty when no statewide rates were supplied.
    pub premium: Vec<OutcomeSummary>,
    /// Records with a raw change but no statewide rate for their state or months.
    pub missing_macro: usize,
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Employment outcomes by group, corrected by `rates` when given.
pub fn employment_outcomes(
    records: &[EmploymentRecord],
    rates: Option<&StateEmploymentRates>,
) -> EmploymentReport {
    let individuals: Vec<IndividualEmployment> = records
        .iter()
        .map(|r| {
            let change = match (r.employed_at_start, r.employed_at_end) {
                (Some(start), Some(end)) => Some(flag(end) - flag(start)),
                _ => None,
            };
            let macro_change = rates.and_then(|rates| {
                rates.change(r.state.as_deref()?, r.entry_month?, r.exit_month?)
            });
            IndividualEmployment {
                id: r.id.clone(),
                group: r.group.clone(),
                change,
                macro_change,
                premium: change.zip(macro_change).map(|(c, m)| c - m),
            }
        })
        .collect();

    let missing_macro = if rates.is_some() {
        individuals
            .iter()
            .filter(|i| i.change.is_some() && i.macro_change.is_none())
            .count()
    } else {
        0
    };

    let employed_at_end =
        summarize_by_group(records.iter().map(|r| (&r.group, r.employed_at_end.map(flag))));
    let change = summarize_by_group(individuals.iter().map(|i| (&i.group, i.change)));
    let premium = if rates.is_some() {
        summarize_by_group(individuals.iter().map(|i| (&i.group, i.premium)))
    } else {
        Vec::new()
    };

    debug!(
        records = records.len(),
        corrected = rates.is_some(),
        missing_macro,
        "computed employment outcomes"
    );

    EmploymentReport {
        individuals,
        employed_at_end,
        change,
        premium,
        missing_macro,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SeriesPoint;

    fn month(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn colorado_rates() -> StateEmploymentRates {
        let series = TimeSeries {
            series_id: "LAUST080000000000003".into(),
            points: vec![
                SeriesPoint {
                    date: month(2019, 9),
                    value: 10.0,
                },
                SeriesPoint {
                    date: month(2021, 6),
                    value: 4.0,
                },
            ],
        };
        let mut rates = StateEmploymentRates::new();
        rates.insert_unemployment_series("08", &series).unwrap();
        rates
    }

    fn record(id: &str, state: &str, start: bool, end: Option<bool>) -> EmploymentRecord {
        EmploymentRecord {
            id: id.into(),
            group: GroupKey::single("cna"),
            state: Some(state.into()),
            entry_month: Some(month(2019, 9)),
            exit_month: NaiveDate::from_ymd_opt(2021, 6, 15),
            employed_at_start: Some(start),
            employed_at_end: end,
        }
    }

    #[test]
    fn statewide_recovery_is_subtracted() {
        let rates = colorado_rates();
        assert!((rates.rate("08", month(2019, 9)).unwrap() - 0.90).abs() < 1e-12);
        assert!((rates.change("08", month(2019, 9), month(2021, 6)).unwrap() - 0.06).abs() < 1e-12);

        let records = vec![
            record("1", "08", false, Some(true)),
            record("2", "08", true, Some(true)),
            record("3", "06", false, Some(true)),
            record("4", "08", false, None),
        ];
        let report = employment_outcomes(&records, Some(&rates));

        assert!((report.individuals[0].premium.unwrap() - 0.94).abs() < 1e-12);
        assert!((report.individuals[1].premium.unwrap() + 0.06).abs() < 1e-12);
        assert_eq!(report.individuals[2].premium, None);
        assert_eq!(report.missing_macro, 1);

        assert!((report.employed_at_end[0].mean.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(report.employed_at_end[0].n_missing, 1);
        assert!((report.change[0].mean.unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.premium[0].mean.unwrap() - 0.44).abs() < 1e-12);
    }

    #[test]
    fn without_rates_only_raw_changes_are_reported() {
        let records = vec![record("1", "08", false, Some(true))];
        let report = employment_outcomes(&records, None);
        assert_eq!(report.change[0].mean, Some(1.0));
        assert!(report.premium.is_empty());
        assert_eq!(report.missing_macro, 0);
        assert_eq!(report.individuals[0].premium, None);
    }

    #[test]
    fn out_of_range_rates_are_rejected() {
        let series = TimeSeries {
            series_id: "x".into(),
            points: vec![SeriesPoint {
                date: month(2020, 1),
                value: 140.0,
            }],
        };
        assert!(
            StateEmploymentRates::new()
                .insert_unemployment_series("08", &series)
                .is_err()
        );
    }
}
