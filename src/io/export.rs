//! Export results to CSV.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream
//! scripts: one row per group (decompositions), per person (premiums) or per
//! record (SES resolution). Missing values are written as empty cells.

use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::analysis::AnalysisReport;
use crate::earnings::PremiumResult;
use crate::error::RoiError;
use crate::ses::{BatchResolution, Resolution};

fn create_writer(path: &Path) -> Result<Writer<File>, RoiError> {
    Writer::from_path(path)
        .map_err(|e| RoiError::io(format!("failed to create export CSV '{}': {e}", path.display())))
}

fn write_row<I, T>(w: &mut Writer<File>, row: I) -> Result<(), RoiError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    w.write_record(row)
        .map_err(|e| RoiError::io(format!("failed to write export CSV row: {e}")))
}

fn finish(mut w: Writer<File>) -> Result<(), RoiError> {
    w.flush()
        .map_err(|e| RoiError::io(format!("failed to flush export CSV: {e}")))
}

fn opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.6}")).unwrap_or_default()
}

/// One row per (method, group) with the group's summary statistics and the
/// method-level components repeated for convenience.
pub fn write_decomposition_csv(path: &Path, report: &AnalysisReport) -> Result<(), RoiError> {
    let mut w = create_writer(path)?;
    write_row(
        &mut w,
        [
            "method",
            "group",
            "n",
            "mean",
            "median",
            "sd",
            "min",
            "max",
            "population_share",
            "value_share",
            "group_index",
            "small_group",
            "overall",
            "between",
            "within",
            "ratio",
        ],
    )?;
    for (method, result) in &report.results {
        for g in &result.groups {
            write_row(
                &mut w,
                [
                    method.display_name().to_string(),
                    g.key.to_string(),
                    g.n.to_string(),
                    format!("{:.6}", g.mean),
                    format!("{:.6}", g.median),
                    opt(g.sd),
                    format!("{:.6}", g.min),
                    format!("{:.6}", g.max),
                    format!("{:.6}", g.population_share),
                    opt(g.value_share),
                    format!("{:.6}", g.index),
                    g.small_group.to_string(),
                    format!("{:.6}", result.overall),
                    format!("{:.6}", result.between),
                    format!("{:.6}", result.within),
                    format!("{:.6}", result.ratio),
                ],
            )?;
        }
    }
    finish(w)
}

/// One row per individual premium.
pub fn write_premiums_csv(path: &Path, result: &PremiumResult) -> Result<(), RoiError> {
    let mut w = create_writer(path)?;
    write_row(
        &mut w,
        ["id", "group", "predicted_wage", "observed_wage", "premium", "fallback"],
    )?;
    for p in &result.individuals {
        write_row(
            &mut w,
            [
                p.id.clone(),
                p.group.to_string(),
                format!("{:.2}", p.predicted_wage),
                opt(p.observed_wage),
                opt(p.premium),
                p.basis.is_fallback().to_string(),
            ],
        )?;
    }
    finish(w)
}

/// One row per resolved record, in input order.
pub fn write_resolution_csv(path: &Path, batch: &BatchResolution) -> Result<(), RoiError> {
    let mut w = create_writer(path)?;
    write_row(
        &mut w,
        ["id", "block_group", "national_percentile", "state_decile", "band", "reason"],
    )?;
    for r in &batch.records {
        let (percentile, decile, reason) = match &r.resolution {
            Resolution::Scored(s) => (
                format!("{}", s.national_percentile),
                s.state_decile.to_string(),
                String::new(),
            ),
            Resolution::Unresolved(reason) => (String::new(), String::new(), reason.code()),
        };
        write_row(
            &mut w,
            [
                r.id.clone(),
                r.unit.as_ref().map(|u| u.to_string()).unwrap_or_default(),
                percentile,
                decile,
                r.band().map(|b| b.label().to_string()).unwrap_or_default(),
                reason,
            ],
        )?;
    }
    finish(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ses::{CoverageReport, GeoUnitId, ResolvedRecord, SesScore, UnresolvedReason};

    #[test]
    fn resolution_export_has_one_row_per_record() {
        let records = vec![
            ResolvedRecord {
                index: 0,
                id: "a".into(),
                unit: Some(GeoUnitId::parse("080310017022").unwrap()),
                resolution: Resolution::Scored(SesScore::new(57.0, 6).unwrap()),
            },
            ResolvedRecord {
                index: 1,
                id: "b, jr".into(),
                unit: None,
                resolution: Resolution::Unresolved(UnresolvedReason::Cancelled),
            },
        ];
        let batch = BatchResolution {
            coverage: CoverageReport::from_records(&records),
            records,
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ses.csv");
        write_resolution_csv(&path, &batch).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "a,080310017022,57,6,40-60,");
        assert_eq!(lines[2], "\"b, jr\",,,,,cancelled");
    }
}
