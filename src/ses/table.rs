//! Deprivation-index lookup table and SES bands.
//!
//! The table maps a Census block group to its Area Deprivation Index scores.
//! It is loaded once, in full, and then only read; [`DeprivationIndex`] is
//! shared behind an `Arc` by the resolver.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RoiError;

/// Length of a block-group FIPS code (state 2 + county 3 + tract 6 + group 1).
pub const BLOCK_GROUP_FIPS_LEN: usize = 12;

/// Block-group identifier, kept as text so leading zeros survive.
///
/// Deserialization goes through [`GeoUnitId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct GeoUnitId(String);

impl GeoUnitId {
    /// Parse a block-group FIPS code.
    ///
    /// Spreadsheet exports often store the code as a number, which drops the
    /// leading zero of states 01–09; an 11-digit code is left-padded.
    pub fn parse(raw: &str) -> Result<Self, RoiError> {
        let t = raw.trim();
        if t.is_empty() || !t.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RoiError::invalid(format!(
                "block-group id '{t}' is not a numeric FIPS code"
            )));
        }
        match t.len() {
            BLOCK_GROUP_FIPS_LEN => Ok(Self(t.to_string())),
            11 => Ok(Self(format!("0{t}"))),
            n => Err(RoiError::invalid(format!(
                "block-group id '{t}' has {n} digits (expected {BLOCK_GROUP_FIPS_LEN})"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-digit state FIPS prefix.
    pub fn state_fips(&self) -> &str {
        &self.0[..2]
    }
}

impl TryFrom<String> for GeoUnitId {
    type Error = RoiError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        GeoUnitId::parse(&raw)
    }
}

impl fmt::Display for GeoUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SES scores for one block group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SesScore {
    /// National percentile, 0–100 (higher is more deprived).
    pub national_percentile: f64,
    /// Within-state decile, 1–10.
    pub state_decile: u8,
}

impl SesScore {
    pub fn new(national_percentile: f64, state_decile: u8) -> Result<Self, RoiError> {
        if !(0.0..=100.0).contains(&national_percentile) {
            return Err(RoiError::invalid(format!(
                "national percentile {national_percentile} outside 0-100"
            )));
        }
        if !(1..=10).contains(&state_decile) {
            return Err(RoiError::invalid(format!(
                "state decile {state_decile} outside 1-10"
            )));
        }
        Ok(Self {
            national_percentile,
            state_decile,
        })
    }

    pub fn band(&self) -> SesBand {
        SesBand::from_score(self)
    }
}

/// One row of the deprivation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeprivationEntry {
    Scored(SesScore),
    /// Published without a score (e.g. `PH` low population, `GQ` group quarters).
    Suppressed { code: String },
}

/// Immutable block group → SES lookup.
#[derive(Debug, Clone, Default)]
pub struct DeprivationIndex {
    entries: HashMap<GeoUnitId, DeprivationEntry>,
}

impl DeprivationIndex {
    /// Build the table. Duplicate keys are rejected.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (GeoUnitId, DeprivationEntry)>,
    ) -> Result<Self, RoiError> {
        let mut map = HashMap::new();
        for (unit, entry) in entries {
            if map.contains_key(&unit) {
                return Err(RoiError::invalid(format!(
                    "block group {unit} appears more than once in the deprivation table"
                )));
            }
            map.insert(unit, entry);
        }
        Ok(Self { entries: map })
    }

    pub fn get(&self, unit: &GeoUnitId) -> Option<&DeprivationEntry> {
        self.entries.get(unit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn suppressed_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| matches!(e, DeprivationEntry::Suppressed { .. }))
            .count()
    }
}

/// Equal-width national-percentile quintiles.
///
/// Bands include their lower bound and exclude their upper bound, except the
/// last band which also includes 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SesBand {
    Q1,
    Q2,
    Q3,
    Q4,
    Q5,
}

impl SesBand {
    pub const ALL: [SesBand; 5] = [SesBand::Q1, SesBand::Q2, SesBand::Q3, SesBand::Q4, SesBand::Q5];

    /// `None` for NaN or values outside `[0, 100]`.
    pub fn from_percentile(p: f64) -> Option<Self> {
        if !(0.0..=100.0).contains(&p) {
            return None;
        }
        Some(match p {
            p if p < 20.0 => SesBand::Q1,
            p if p < 40.0 => SesBand::Q2,
            p if p < 60.0 => SesBand::Q3,
            p if p < 80.0 => SesBand::Q4,
            _ => SesBand::Q5,
        })
    }

    fn from_score(score: &SesScore) -> Self {
        // Scores are validated to 0-100 on construction.
        Self::from_percentile(score.national_percentile).unwrap_or(SesBand::Q5)
    }

    pub fn label(self) -> &'static str {
        match self {
            SesBand::Q1 => "0-20",
            SesBand::Q2 => "20-40",
            SesBand::Q3 => "40-60",
            SesBand::Q4 => "60-80",
            SesBand::Q5 => "80-100",
        }
    }
}

impl fmt::Display for SesBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_unit_ids_keep_or_restore_leading_zeros() {
        assert_eq!(GeoUnitId::parse("080310001001").unwrap().as_str(), "080310001001");
        assert_eq!(GeoUnitId::parse("80310001001").unwrap().as_str(), "080310001001");
        assert_eq!(GeoUnitId::parse("080310001001").unwrap().state_fips(), "08");
        assert!(GeoUnitId::parse("0803100010").is_err());
        assert!(GeoUnitId::parse("08031000100x").is_err());
        assert!(GeoUnitId::parse("").is_err());
    }

    #[test]
    fn deserialized_ids_are_validated() {
        let id: GeoUnitId = serde_json::from_str("\"80310001001\"").unwrap();
        assert_eq!(id.state_fips(), "08");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"080310001001\"");
        assert!(serde_json::from_str::<GeoUnitId>("\"8\"").is_err());
        assert!(serde_json::from_str::<GeoUnitId>("\"\"").is_err());
    }

    #[test]
    fn band_edges() {
        assert_eq!(SesBand::from_percentile(0.0), Some(SesBand::Q1));
        assert_eq!(SesBand::from_percentile(19.999), Some(SesBand::Q1));
        assert_eq!(SesBand::from_percentile(20.0), Some(SesBand::Q2));
        assert_eq!(SesBand::from_percentile(79.9), Some(SesBand::Q4));
        assert_eq!(SesBand::from_percentile(80.0), Some(SesBand::Q5));
        assert_eq!(SesBand::from_percentile(100.0), Some(SesBand::Q5));
        assert_eq!(SesBand::from_percentile(100.5), None);
        assert_eq!(SesBand::from_percentile(f64::NAN), None);
        assert_eq!(SesBand::Q3.to_string(), "40-60");
    }

    #[test]
    fn scores_are_range_checked() {
        assert!(SesScore::new(55.0, 6).is_ok());
        assert!(SesScore::new(-1.0, 6).is_err());
        assert!(SesScore::new(50.0, 0).is_err());
        assert!(SesScore::new(50.0, 11).is_err());
    }

    #[test]
    fn duplicate_units_are_rejected() {
        let unit = GeoUnitId::parse("080310001001").unwrap();
        let score = DeprivationEntry::Scored(SesScore::new(10.0, 1).unwrap());
        let err = DeprivationIndex::from_entries([(unit.clone(), score.clone()), (unit, score)]);
        assert!(err.is_err());
    }
}
