//! Schooling and experience derivation from survey codes.
//!
//! Survey extracts carry the IPUMS-CPS `EDUC` code rather than years of
//! schooling, and age rather than labor-market experience. The earnings model
//! works in years, so both are converted here:
//!
//! - `EDUC` codes are binned into years of schooling
//! - potential experience follows the usual Mincer convention `age − S − 6`

use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper bounds (inclusive) of each `EDUC` bin and the years it maps to.
///
/// The lowest bin starts just above `-1`. Codes above the last bound are not
/// recognised.
const EDUC_BINS: [(i32, f64); 8] = [
    (60, 10.0),
    (73, 12.0),
    (81, 14.0),
    (92, 13.0),
    (111, 16.0),
    (123, 18.0),
    (124, 19.0),
    (125, 20.0),
];

/// Years of schooling for an IPUMS-CPS `EDUC` code.
///
/// Returns `None` for codes outside `(-1, 125]`.
pub fn years_of_schooling(educ_code: i32) -> Option<f64> {
    if educ_code <= -1 {
        return None;
    }
    EDUC_BINS
        .iter()
        .find(|(upper, _)| educ_code <= *upper)
        .map(|(_, years)| *years)
}

/// Potential labor-market experience: `max(age − schooling − 6, 0)`.
pub fn work_experience(age: f64, schooling_years: f64) -> f64 {
    (age - schooling_years - 6.0).max(0.0)
}

/// Age bands used for wage tabulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeGroup {
    UpTo18,
    From19To25,
    From26To34,
    From35To54,
    From55To64,
    From65,
}

impl AgeGroup {
    /// Bucket an age. Each band includes its upper bound.
    pub fn from_age(age: f64) -> Self {
        if age <= 18.0 {
            AgeGroup::UpTo18
        } else if age <= 25.0 {
            AgeGroup::From19To25
        } else if age <= 34.0 {
            AgeGroup::From26To34
        } else if age <= 54.0 {
            AgeGroup::From35To54
        } else if age <= 64.0 {
            AgeGroup::From55To64
        } else {
            AgeGroup::From65
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AgeGroup::UpTo18 => "18 and under",
            AgeGroup::From19To25 => "19-25",
            AgeGroup::From26To34 => "26-34",
            AgeGroup::From35To54 => "35-54",
            AgeGroup::From55To64 => "55-64",
            AgeGroup::From65 => "65+",
        }
    }
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn educ_bins_are_right_closed() {
        assert_eq!(years_of_schooling(0), Some(10.0));
        assert_eq!(years_of_schooling(60), Some(10.0));
        assert_eq!(years_of_schooling(61), Some(12.0));
        assert_eq!(years_of_schooling(73), Some(12.0));
        assert_eq!(years_of_schooling(81), Some(14.0));
        // Associate-degree codes (82..=92) sit below the some-college bin.
        assert_eq!(years_of_schooling(91), Some(13.0));
        assert_eq!(years_of_schooling(111), Some(16.0));
        assert_eq!(years_of_schooling(123), Some(18.0));
        assert_eq!(years_of_schooling(124), Some(19.0));
        assert_eq!(years_of_schooling(125), Some(20.0));
        assert_eq!(years_of_schooling(126), None);
        assert_eq!(years_of_schooling(-1), None);
    }

    #[test]
    fn experience_is_clamped_at_zero() {
        assert_eq!(work_experience(30.0, 12.0), 12.0);
        assert_eq!(work_experience(17.0, 12.0), 0.0);
    }

    #[test]
    fn age_groups_include_upper_bound() {
        assert_eq!(AgeGroup::from_age(18.0), AgeGroup::UpTo18);
        assert_eq!(AgeGroup::from_age(19.0), AgeGroup::From19To25);
        assert_eq!(AgeGroup::from_age(25.0), AgeGroup::From19To25);
        assert_eq!(AgeGroup::from_age(54.0), AgeGroup::From35To54);
        assert_eq!(AgeGroup::from_age(65.0), AgeGroup::From65);
        assert_eq!(AgeGroup::From26To34.to_string(), "26-34");
    }
}
