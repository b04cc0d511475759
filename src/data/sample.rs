//! Synthetic survey and program-cohort generation for demos and tests.
//!
//! Wages are drawn from a known earnings equation plus log-normal noise, so a
//! fit on the synthetic survey should land near [`TRUE_COEFFICIENTS`] with a
//! modest R². The cohort adds program effects and an SES gradient so the
//! equity decomposition has something to find.

use std::collections::HashMap;
use std::future::Future;

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::Dataset;
use crate::earnings::{SurveyRecord, work_experience, years_of_schooling};
use crate::error::RoiError;
use crate::ses::{
    DeprivationEntry, DeprivationIndex, GeoUnitId, GeocodeFailure, Geocoder, SesScore,
};

/// State FIPS codes and their true log-wage effects (first is the reference).
const STATES: [(&str, f64); 5] = [
    ("06", 0.18),
    ("08", 0.08),
    ("13", -0.05),
    ("36", 0.15),
    ("48", 0.02),
];

/// Education codes drawn for respondents, with relative frequencies.
const EDUC_CODES: [(i32, f64); 7] = [
    (50, 0.08),
    (73, 0.30),
    (81, 0.17),
    (91, 0.10),
    (111, 0.22),
    (123, 0.10),
    (125, 0.03),
];

const RACES: [&str; 5] = ["asian", "black", "hispanic", "white", "other"];
const GENDERS: [&str; 2] = ["f", "m"];
/// Programs and their true log-wage premium.
const PROGRAMS: [(&str, f64); 3] = [("certificate", 0.05), ("associate", 0.12), ("bachelor", 0.25)];

/// Tracts and block groups generated per state.
const TRACTS_PER_STATE: u32 = 10;
const GROUPS_PER_TRACT: u32 = 2;

/// `(intercept, schooling, experience, experience², schooling×experience)`.
pub const TRUE_COEFFICIENTS: (f64, f64, f64, f64, f64) = (9.6, 0.085, 0.038, -0.00065, 0.0004);

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticConfig {
    pub seed: u64,
    pub survey_size: usize,
    pub cohort_size: usize,
    /// Standard deviation of log-wage noise.
    pub noise_sd: f64,
    /// Probability a cohort member has no observed wage.
    pub missing_wage_rate: f64,
    /// Probability a cohort address is unknown to the geocoder.
    pub geocode_miss_rate: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            survey_size: 4000,
            cohort_size: 600,
            noise_sd: 0.55,
            missing_wage_rate: 0.05,
            geocode_miss_rate: 0.08,
        }
    }
}

impl SyntheticConfig {
    fn validate(&self) -> Result<(), RoiError> {
        if !(self.noise_sd.is_finite() && self.noise_sd >= 0.0) {
            return Err(RoiError::invalid("noise sd must be finite and >= 0"));
        }
        for (name, p) in [
            ("missing wage rate", self.missing_wage_rate),
            ("geocode miss rate", self.geocode_miss_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(RoiError::invalid(format!("{name} must be within [0, 1]")));
            }
        }
        Ok(())
    }
}

fn log_wage(rng: &mut StdRng, noise: &Normal<f64>, state_effect: f64, s: f64, x: f64) -> f64 {
    let (a, b_s, b_x, b_x2, b_sx) = TRUE_COEFFICIENTS;
    a + state_effect + b_s * s + b_x * x + b_x2 * x * x + b_sx * s * x + noise.sample(rng)
}

fn draw_educ(rng: &mut StdRng) -> Result<i32, RoiError> {
    EDUC_CODES
        .choose_weighted(rng, |(_, w)| *w)
        .map(|(code, _)| *code)
        .map_err(|e| RoiError::invalid(format!("education weights: {e}")))
}

fn noise(sd: f64) -> Result<Normal<f64>, RoiError> {
    Normal::new(0.0, sd).map_err(|e| RoiError::invalid(format!("noise distribution: {e}")))
}

/// Survey microdata drawn from the true earnings equation.
pub fn generate_survey(config: &SyntheticConfig) -> Result<Vec<SurveyRecord>, RoiError> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = noise(config.noise_sd)?;

    let mut out = Vec::with_capacity(config.survey_size);
    for _ in 0..config.survey_size {
        let (state, effect) = STATES[rng.gen_range(0..STATES.len())];
        let code = draw_educ(&mut rng)?;
        let schooling = years_of_schooling(code).unwrap_or(12.0);
        let age = rng.gen_range(18..=64) as f64;
        let experience = work_experience(age, schooling);
        let lw = log_wage(&mut rng, &noise, effect, schooling, experience);
        out.push(SurveyRecord {
            year: None,
            state: state.to_string(),
            wage: lw.exp(),
            schooling_years: schooling,
            experience_years: experience,
            weight: rng.gen_range(500.0..3000.0),
        });
    }
    Ok(out)
}

/// One synthetic program participant.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub id: String,
    pub race: String,
    pub gender: String,
    pub program: String,
    pub state: String,
    pub educ_code: i32,
    pub age: u32,
    pub observed_wage: Option<f64>,
    pub address: String,
}

/// A program cohort plus the SES infrastructure to resolve it offline.
#[derive(Debug, Clone)]
pub struct SyntheticCohort {
    pub participants: Vec<Participant>,
    pub deprivation: DeprivationIndex,
    pub directory: DirectoryGeocoder,
}

impl SyntheticCohort {
    /// Cohort as a dataset with columns `race, gender, program, state, educ,
    /// age, earnings, address`.
    pub fn dataset(&self) -> Result<Dataset, RoiError> {
        let ids = self.participants.iter().map(|p| p.id.clone()).collect();
        Dataset::new(ids)
            .with_column("race", self.column(|p| Some(p.race.clone())))?
            .with_column("gender", self.column(|p| Some(p.gender.clone())))?
            .with_column("program", self.column(|p| Some(p.program.clone())))?
            .with_column("state", self.column(|p| Some(p.state.clone())))?
            .with_column("educ", self.column(|p| Some(p.educ_code.to_string())))?
            .with_column("age", self.column(|p| Some(p.age.to_string())))?
            .with_column(
                "earnings",
                self.column(|p| p.observed_wage.map(|w| format!("{w:.2}"))),
            )?
            .with_column("address", self.column(|p| Some(p.address.clone())))
    }

    fn column(&self, cell: impl Fn(&Participant) -> Option<String>) -> Vec<Option<String>> {
        self.participants.iter().map(cell).collect()
    }
}

/// Program cohort, deprivation table and address directory.
///
/// The last block group of each state is left out of the table and every
/// seventh one is published as suppressed, so resolution has realistic gaps.
pub fn generate_cohort(config: &SyntheticConfig) -> Result<SyntheticCohort, RoiError> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let noise = noise(config.noise_sd * 0.8)?;

    let mut units: Vec<(GeoUnitId, &str, f64)> = Vec::new();
    let mut table = Vec::new();
    let mut counter = 0usize;
    for (state, _) in STATES {
        for tract in 1..=TRACTS_PER_STATE {
            for group in 1..=GROUPS_PER_TRACT {
                let unit = GeoUnitId::parse(&format!("{state}031{:06}{group}", tract * 100))?;
                let percentile: f64 = rng.gen_range(1.0..=100.0_f64).round();
                units.push((unit.clone(), state, percentile));
                counter += 1;
                let last = tract == TRACTS_PER_STATE && group == GROUPS_PER_TRACT;
                if last {
                    continue;
                }
                let entry = if counter % 7 == 0 {
                    DeprivationEntry::Suppressed { code: "PH".into() }
                } else {
                    let decile = ((percentile / 10.0).ceil() as u8).clamp(1, 10);
                    DeprivationEntry::Scored(SesScore::new(percentile, decile)?)
                };
                table.push((unit, entry));
            }
        }
    }
    let deprivation = DeprivationIndex::from_entries(table)?;

    let mut participants = Vec::with_capacity(config.cohort_size);
    let mut directory = HashMap::new();
    for i in 0..config.cohort_size {
        let (unit, state, percentile) = units[rng.gen_range(0..units.len())].clone();
        let state_effect = STATES
            .iter()
            .find(|(s, _)| *s == state)
            .map_or(0.0, |(_, e)| *e);
        let (program, program_effect) = PROGRAMS[rng.gen_range(0..PROGRAMS.len())];
        let code = draw_educ(&mut rng)?;
        let schooling = years_of_schooling(code).unwrap_or(12.0);
        let age: u32 = rng.gen_range(20..=55);
        let experience = work_experience(age as f64, schooling);

        let ses_gradient = -0.004 * (percentile - 50.0);
        let lw = log_wage(&mut rng, &noise, state_effect, schooling, experience)
            + program_effect
            + ses_gradient;
        let observed_wage = (!rng.gen_bool(config.missing_wage_rate)).then(|| lw.exp());

        let address = format!("{} Main St, Unit {}, {state}", 100 + i, unit.as_str());
        if !rng.gen_bool(config.geocode_miss_rate) {
            directory.insert(address.clone(), unit);
        }

        participants.push(Participant {
            id: format!("P{:04}", i + 1),
            race: RACES[rng.gen_range(0..RACES.len())].to_string(),
            gender: GENDERS[rng.gen_range(0..GENDERS.len())].to_string(),
            program: program.to_string(),
            state: state.to_string(),
            educ_code: code,
            age,
            observed_wage,
            address,
        });
    }

    Ok(SyntheticCohort {
        participants,
        deprivation,
        directory: DirectoryGeocoder::new(directory),
    })
}

/// In-memory geocoder backed by an address directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryGeocoder {
    entries: HashMap<String, GeoUnitId>,
}

impl DirectoryGeocoder {
    pub fn new(entries: HashMap<String, GeoUnitId>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Geocoder for DirectoryGeocoder {
    fn geocode(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<GeoUnitId, GeocodeFailure>> + Send {
        let result = if address.trim().is_empty() {
            Err(GeocodeFailure::Malformed)
        } else {
            self.entries
                .get(address)
                .cloned()
                .ok_or(GeocodeFailure::NotFound)
        };
        std::future::ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::earnings::{FitOptions, fit_earnings_model};

    fn small() -> SyntheticConfig {
        SyntheticConfig {
            survey_size: 1500,
            cohort_size: 120,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn survey_is_deterministic_for_a_seed() {
        let a = generate_survey(&small()).unwrap();
        let b = generate_survey(&small()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 1500);
        assert!(a.iter().all(|r| r.wage > 0.0 && r.experience_years >= 0.0));
    }

    #[test]
    fn fitting_the_survey_recovers_the_schooling_return() {
        let survey = generate_survey(&small()).unwrap();
        let report = fit_earnings_model(&survey, &FitOptions::default()).unwrap();
        let c = &report.coefficients;
        assert_eq!(c.reference_state, "06");
        assert!((c.schooling - TRUE_COEFFICIENTS.1).abs() < 0.05, "schooling {}", c.schooling);
        assert!(report.r_squared > 0.02 && report.r_squared < 0.9);
    }

    #[test]
    fn cohort_has_gaps_in_table_and_directory() {
        let cohort = generate_cohort(&small()).unwrap();
        assert_eq!(cohort.participants.len(), 120);
        let total_units = STATES.len() * (TRACTS_PER_STATE * GROUPS_PER_TRACT) as usize;
        assert_eq!(cohort.deprivation.len(), total_units - STATES.len());
        assert!(cohort.deprivation.suppressed_count() > 0);
        assert!(cohort.directory.len() <= 120);

        let ds = cohort.dataset().unwrap();
        assert_eq!(ds.len(), 120);
        assert!(ds.numeric_column("earnings").is_ok());
    }

    #[test]
    fn rates_are_validated() {
        let bad = SyntheticConfig {
            missing_wage_rate: 1.5,
            ..small()
        };
        assert!(generate_survey(&bad).is_err());
    }
}
