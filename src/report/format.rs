//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the analysis code stays clean and testable
//! - output changes are localized

use crate::analysis::AnalysisReport;
use crate::domain::InequalityMethod;
use crate::earnings::{FitReport, PremiumResult};
use crate::equity::DecompositionResult;
use crate::outcomes::{CompletionReport, EmploymentReport, OutcomeSummary};
use crate::ses::CoverageReport;

use super::PremiumRankings;

/// Fitted earnings model: coefficients and fit diagnostics.
pub fn format_fit_summary(report: &FitReport) -> String {
    let c = &report.coefficients;
    let mut out = String::new();

    out.push_str("=== roi - earnings model fit ===\n");
    out.push_str(&format!(
        "Records: used={} dropped={} | R²={:.4}\n",
        report.n_used, report.n_dropped, report.r_squared
    ));
    out.push_str("\nCoefficients (ln wage):\n");
    out.push_str(&format!("- intercept            : {:>10.6}\n", c.intercept));
    out.push_str(&format!("- schooling            : {:>10.6}\n", c.schooling));
    out.push_str(&format!("- experience           : {:>10.6}\n", c.experience));
    out.push_str(&format!("- experience²          : {:>10.6}\n", c.experience_sq));
    out.push_str(&format!("- schooling×experience : {:>10.6}\n", c.schooling_x_experience));
    out.push_str(&format!(
        "\nState effects (reference {}, {} others):\n",
        c.reference_state,
        c.state_effects.len()
    ));
    for (state, effect) in &c.state_effects {
        out.push_str(&format!("  {state:<4} {effect:>+10.6}\n"));
    }

    out
}

/// One line per method, followed by the group table of the first method.
pub fn format_analysis(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let ex = &report.exclusions;

    out.push_str(&format!(
        "=== roi - equity decomposition of `{}` by {} ===\n",
        report.value_column,
        report.group_columns.join(" × ")
    ));
    out.push_str(&format!(
        "Rows: total={} used={} | excluded: missing value={} missing group={}\n\n",
        ex.rows_total, ex.rows_used, ex.missing_value, ex.missing_group
    ));
    out.push_str(&format_methods(report.results.values()));

    if let Some(first) = report.results.values().next() {
        out.push('\n');
        out.push_str(&format_groups(first));
    }
    out
}

/// Method comparison table.
pub fn format_methods<'a>(results: impl IntoIterator<Item = &'a DecompositionResult>) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!(
            "{:<14} {:>14} {:>14} {:>14} {:>12} {:>8}",
            "method", "overall", "between", "within", "residual", "between%"
        ),
    );
    push_row(
        &mut out,
        format!(
            "{:-<14} {:-<14} {:-<14} {:-<14} {:-<12} {:-<8}",
            "", "", "", "", "", ""
        ),
    );
    for r in results {
        let mut flags = Vec::new();
        if r.degenerate {
            flags.push("degenerate");
        }
        if !r.exact {
            flags.push("approx");
        }
        push_row(
            &mut out,
            format!(
                "{:<14} {:>14} {:>14} {:>14} {:>12} {:>7.1}% {}",
                r.method.display_name(),
                fmt_num(r.overall, r.method),
                fmt_num(r.between, r.method),
                fmt_num(r.within, r.method),
                fmt_num(r.residual, r.method),
                r.ratio * 100.0,
                flags.join(","),
            ),
        );
    }
    out
}

/// Per-group summary table for one decomposition.
pub fn format_groups(result: &DecompositionResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Groups ({}):\n", result.method.display_name()));
    push_row(
        &mut out,
        format!(
            "{:<28} {:>6} {:>12} {:>12} {:>12} {:>7} {:>10}",
            "group", "n", "mean", "median", "sd", "share", "index"
        ),
    );
    push_row(
        &mut out,
        format!(
            "{:-<28} {:-<6} {:-<12} {:-<12} {:-<12} {:-<7} {:-<10}",
            "", "", "", "", "", "", ""
        ),
    );
    for g in &result.groups {
        push_row(
            &mut out,
            format!(
                "{:<28} {:>6} {:>12.2} {:>12.2} {:>12} {:>6.1}% {:>10} {}",
                truncate(&g.key.to_string(), 28),
                g.n,
                g.mean,
                g.median,
                g.sd.map(|s| format!("{s:.2}")).unwrap_or_else(|| "-".to_string()),
                g.population_share * 100.0,
                fmt_num(g.index, result.method),
                if g.small_group { "(small)" } else { "" },
            ),
        );
    }
    out
}

/// Premium counts plus the highest/lowest groups.
pub fn format_premiums(result: &PremiumResult, rankings: &PremiumRankings) -> String {
    let mut out = String::new();
    let with_premium = result.individuals.iter().filter(|p| p.premium.is_some()).count();
    let fallbacks = result
        .individuals
        .iter()
        .filter(|p| p.basis.is_fallback())
        .count();

    out.push_str("=== roi - earnings premiums ===\n");
    out.push_str(&format!(
        "Individuals: {} | with premium: {} | intercept fallbacks: {} ({:?})\n",
        result.individuals.len(),
        with_premium,
        fallbacks,
        result.policy
    ));
    out.push_str(&format!(
        "Excluded: missing wage={} fallback={}\n\n",
        result.excluded_missing_wage, result.excluded_fallback
    ));

    out.push_str("Highest mean premium:\n");
    out.push_str(&format_group_premiums(&rankings.highest));
    out.push('\n');
    out.push_str("Lowest mean premium:\n");
    out.push_str(&format_group_premiums(&rankings.lowest));
    out
}

fn format_group_premiums(groups: &[crate::earnings::GroupPremium]) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!("{:<28} {:>6} {:>8} {:>9} {:>14}", "group", "n", "w/ wage", "fallback", "mean premium"),
    );
    push_row(
        &mut out,
        format!("{:-<28} {:-<6} {:-<8} {:-<9} {:-<14}", "", "", "", "", ""),
    );
    for g in groups {
        push_row(
            &mut out,
            format!(
                "{:<28} {:>6} {:>8} {:>9} {:>14}",
                truncate(&g.group.to_string(), 28),
                g.n,
                g.n_with_wage,
                g.n_fallback,
                g.mean_premium
                    .map(|m| format!("{m:.2}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        );
    }
    out
}

/// SES coverage: counts, rates and the unresolved breakdown.
pub fn format_coverage(coverage: &CoverageReport) -> String {
    let mut out = String::new();
    out.push_str("=== roi - SES resolution ===\n");
    out.push_str(&format!(
        "Records: {} | scored: {} ({:.1}%) | unresolved: {} ({:.1}%)\n",
        coverage.total,
        coverage.scored,
        coverage.coverage_rate() * 100.0,
        coverage.unresolved,
        coverage.unresolved_rate() * 100.0
    ));
    for (reason, n) in &coverage.by_reason {
        out.push_str(&format!("  {reason:<24} {n:>6}\n"));
    }
    out
}

/// Completion rates and time to completion by group.
pub fn format_completion(report: &CompletionReport) -> String {
    let mut out = String::new();
    out.push_str("=== roi - completion ===\n");
    out.push_str("Completion rate:\n");
    out.push_str(&format_outcomes(&report.rates, true));
    out.push_str("\nYears to completion (completers):\n");
    out.push_str(&format_outcomes(&report.time_to_completion, false));
    if report.inconsistent_years > 0 {
        out.push_str(&format!(
            "Exit before entry (excluded): {}\n",
            report.inconsistent_years
        ));
    }
    out
}

/// Employment at exit, raw change and (when corrected) the employment premium.
pub fn format_employment(report: &EmploymentReport) -> String {
    let mut out = String::new();
    out.push_str("=== roi - employment ===\n");
    out.push_str("Employed at exit:\n");
    out.push_str(&format_outcomes(&report.employed_at_end, true));
    out.push_str("\nChange in employment (end - start):\n");
    out.push_str(&format_outcomes(&report.change, false));
    if report.premium.is_empty() {
        out.push_str("\nEmployment premium: not computed (no statewide rates)\n");
    } else {
        out.push_str("\nEmployment premium (net of statewide change):\n");
        out.push_str(&format_outcomes(&report.premium, false));
        out.push_str(&format!(
            "Missing statewide rate: {}\n",
            report.missing_macro
        ));
    }
    out
}

fn format_outcomes(groups: &[OutcomeSummary], as_percent: bool) -> String {
    let mut out = String::new();
    push_row(
        &mut out,
        format!("{:<28} {:>6} {:>8} {:>10} {:>10}", "group", "n", "missing", "mean", "sd"),
    );
    push_row(
        &mut out,
        format!("{:-<28} {:-<6} {:-<8} {:-<10} {:-<10}", "", "", "", "", ""),
    );
    let fmt = |v: Option<f64>| match v {
        Some(v) if as_percent => format!("{:.1}%", v * 100.0),
        Some(v) => format!("{v:.3}"),
        None => "-".to_string(),
    };
    for g in groups {
        push_row(
            &mut out,
            format!(
                "{:<28} {:>6} {:>8} {:>10} {:>10} {}",
                truncate(&g.group.to_string(), 28),
                g.n,
                g.n_missing,
                fmt(g.mean),
                fmt(g.sd),
                if g.small_group { "(small)" } else { "" },
            ),
        );
    }
    out
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

fn fmt_num(v: f64, method: InequalityMethod) -> String {
    match method {
        InequalityMethod::VarianceDecomposition => format!("{v:.4e}"),
        _ => format!("{v:.6}"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::analysis::{AnalysisReport, ExclusionReport};
    use crate::domain::GroupKey;
    use crate::equity::decompose;

    #[test]
    fn analysis_report_lists_every_method_and_flags() {
        let values = [100.0, 100.0, 200.0, 200.0];
        let groups: Vec<GroupKey> = ["a", "a", "b", "b"].into_iter().map(GroupKey::from).collect();
        let results: BTreeMap<_, _> = InequalityMethod::ALL
            .iter()
            .map(|&m| (m, decompose(m, &values, &groups).unwrap()))
            .collect();
        let report = AnalysisReport {
            value_column: "earnings".into(),
            group_columns: vec!["race".into()],
            results,
            exclusions: ExclusionReport {
                rows_total: 5,
                missing_value: 1,
                missing_group: 0,
                rows_used: 4,
            },
        };

        let text = format_analysis(&report);
        assert!(text.contains("Theil T"));
        assert!(text.contains("Variance (SS)"));
        assert!(text.contains("approx"));
        assert!(text.contains("missing value=1"));
        assert!(text.contains("(small)"));
        assert!(text.lines().all(|l| l == l.trim_end()));
    }

    #[test]
    fn completion_shows_rates_as_percentages() {
        use crate::outcomes::{CompletionRecord, summarize_completion};

        let records: Vec<CompletionRecord> = [(true, Some(2019)), (false, None)]
            .into_iter()
            .enumerate()
            .map(|(i, (completed, exit))| CompletionRecord {
                id: i.to_string(),
                group: GroupKey::single("welding"),
                completed: Some(completed),
                entry_year: Some(2017),
                exit_year: exit,
            })
            .collect();
        let text = format_completion(&summarize_completion(&records));
        assert!(text.contains("50.0%"));
        assert!(text.contains("2.000"));
        assert!(!text.contains("Exit before entry"));
    }

    #[test]
    fn employment_without_rates_says_so() {
        let text = format_employment(&crate::outcomes::employment_outcomes(&[], None));
        assert!(text.contains("not computed"));
    }

    #[test]
    fn truncate_marks_cut_labels() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdefgh", 5), "abcd.");
    }

    #[test]
    fn coverage_lists_reasons() {
        let coverage = CoverageReport {
            total: 4,
            scored: 3,
            unresolved: 1,
            by_reason: BTreeMap::from([("not_in_table".to_string(), 1)]),
        };
        let text = format_coverage(&coverage);
        assert!(text.contains("75.0%"));
        assert!(text.contains("not_in_table"));
    }
}
