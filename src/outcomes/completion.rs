//! Completion rates and time to completion by program.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::GroupKey;

use super::{OutcomeSummary, summarize_by_group};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub id: String,
    pub group: GroupKey,
    pub completed: Option<bool>,
    pub entry_year: Option<i32>,
    pub exit_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    /// Share of members who completed (mean of the 0/1 flag).
    pub rates: Vec<OutcomeSummary>,
    /// Years from entry to exit, over completers only.
    pub time_to_completion: Vec<OutcomeSummary>,
    /// Completers whose exit year precedes their entry year.
    pub inconsistent_years: usize,
}

pub fn summarize_completion(records: &[CompletionRecord]) -> CompletionReport {
    let rates = summarize_by_group(
        records
            .iter()
            .map(|r| (&r.group, r.completed.map(|c| if c { 1.0 } else { 0.0 }))),
    );

    let mut inconsistent_years = 0;
    let durations: Vec<(&GroupKey, Option<f64>)> = records
        .iter()
        .filter(|r| r.completed == Some(true))
        .map(|r| {
            let years = match (r.entry_year, r.exit_year) {
                (Some(entry), Some(exit)) if exit >= entry => Some(f64::from(exit - entry)),
                (Some(_), Some(_)) => {
                    inconsistent_years += 1;
                    None
                }
                _ => None,
            };
            (&r.group, years)
        })
        .collect();
    let time_to_completion = summarize_by_group(durations);

    debug!(
        records = records.len(),
        groups = rates.len(),
        inconsistent_years,
        "summarized completion"
    );

    CompletionReport {
        rates,
        time_to_completion,
        inconsistent_years,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(group: &str, completed: Option<bool>, entry: i32, exit: Option<i32>) -> CompletionRecord {
        CompletionRecord {
            id: format!("{group}-{entry}"),
            group: GroupKey::single(group),
            completed,
            entry_year: Some(entry),
            exit_year: exit,
        }
    }

    #[test]
    fn rates_use_flags_and_durations_use_completers() {
        let records = vec![
            record("nursing", Some(true), 2015, Some(2017)),
            record("nursing", Some(true), 2016, Some(2020)),
            record("nursing", Some(false), 2016, None),
            record("nursing", None, 2016, None),
            record("welding", Some(false), 2018, Some(2019)),
        ];
        let report = summarize_completion(&records);

        let nursing = &report.rates[0];
        assert_eq!(nursing.group, GroupKey::single("nursing"));
        assert!((nursing.mean.unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(nursing.n_missing, 1);
        assert_eq!(report.rates[1].mean, Some(0.0));

        // Only nursing has completers; welding's non-completer has no duration.
        assert_eq!(report.time_to_completion.len(), 1);
        assert_eq!(report.time_to_completion[0].mean, Some(3.0));
    }

    #[test]
    fn backwards_years_are_counted_not_used() {
        let records = vec![
            record("a", Some(true), 2020, Some(2018)),
            record("a", Some(true), 2020, Some(2021)),
        ];
        let report = summarize_completion(&records);
        assert_eq!(report.inconsistent_years, 1);
        assert_eq!(report.time_to_completion[0].n, 1);
        assert_eq!(report.time_to_completion[0].n_missing, 1);
    }
}
