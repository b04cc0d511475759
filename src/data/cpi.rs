//! Annual CPI table for constant-dollar conversion.

use std::collections::BTreeMap;

use chrono::Datelike;
use tracing::debug;

use crate::data::bls::TimeSeries;
use crate::earnings::SurveyRecord;
use crate::error::RoiError;

/// Annual CPI index levels, one per calendar year.
#[derive(Debug, Clone, PartialEq)]
pub struct CpiTable {
    annual: BTreeMap<i32, f64>,
}

impl CpiTable {
    pub fn from_annual(annual: BTreeMap<i32, f64>) -> Result<Self, RoiError> {
        if let Some((year, v)) = annual.iter().find(|(_, v)| !(v.is_finite() && **v > 0.0)) {
            return Err(RoiError::invalid(format!("CPI for {year} is not positive ({v})")));
        }
        Ok(Self { annual })
    }

    /// Average monthly observations into annual levels.
    pub fn from_series(series: &TimeSeries) -> Result<Self, RoiError> {
        let mut sums: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
        for p in &series.points {
            let e = sums.entry(p.date.year()).or_default();
            e.0 += p.value;
            e.1 += 1;
        }
        let annual: BTreeMap<i32, f64> = sums
            .into_iter()
            .map(|(year, (sum, n))| (year, sum / n as f64))
            .collect();
        debug!(series_id = %series.series_id, years = annual.len(), "built annual CPI table");
        Self::from_annual(annual)
    }

    pub fn years(&self) -> impl Iterator<Item = i32> + '_ {
        self.annual.keys().copied()
    }

    pub fn latest_year(&self) -> Option<i32> {
        self.annual.keys().next_back().copied()
    }

    fn level(&self, year: i32) -> Result<f64, RoiError> {
        self.annual
            .get(&year)
            .copied()
            .ok_or_else(|| RoiError::invalid(format!("no CPI level for {year}")))
    }

    /// Multiplier that turns `from`-year dollars into `to`-year dollars.
    pub fn adjustment_factor(&self, from: i32, to: i32) -> Result<f64, RoiError> {
        Ok(self.level(to)? / self.level(from)?)
    }

    pub fn adjust(&self, value: f64, from: i32, to: i32) -> Result<f64, RoiError> {
        Ok(value * self.adjustment_factor(from, to)?)
    }

    /// Restate survey wages in `base_year` dollars.
    ///
    /// Records without a year are left unchanged. Returns how many were adjusted.
    pub fn restate_survey(
        &self,
        records: &mut [SurveyRecord],
        base_year: i32,
    ) -> Result<usize, RoiError> {
        let mut adjusted = 0;
        for r in records.iter_mut() {
            if let Some(year) = r.year {
                r.wage = self.adjust(r.wage, year, base_year)?;
                adjusted += 1;
            }
        }
        Ok(adjusted)
    }
}
