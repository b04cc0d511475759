//! Mincer-style earnings model: coefficient artifact and prediction.
//!
//! ```text
//! ln(wage) = α + γ_state + β_S·S + β_X·X + β_X2·X² + β_SX·S·X
//! ```
//!
//! The coefficient table is fitted once (see [`super::fit`]) and then only read.
//! [`EarningsModel`] wraps it in an `Arc` so analysis code can clone the model
//! freely and share it across tasks.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RoiError;

/// Current on-disk format version of [`EarningsModelCoefficients`].
pub const COEFFICIENTS_VERSION: u32 = 1;

/// Fitted coefficients of the earnings model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsModelCoefficients {
    pub version: u32,
    pub intercept: f64,
    /// State fixed effects relative to `reference_state` (which maps to 0).
    pub state_effects: BTreeMap<String, f64>,
    pub reference_state: String,
    pub schooling: f64,
    pub experience: f64,
    pub experience_sq: f64,
    pub schooling_x_experience: f64,
    pub r_squared: f64,
    pub n_obs: usize,
}

impl EarningsModelCoefficients {
    /// Reject artifacts that cannot produce finite predictions.
    pub fn validate(&self) -> Result<(), RoiError> {
        if self.version != COEFFICIENTS_VERSION {
            return Err(RoiError::ModelFit {
                reason: format!(
                    "unsupported coefficient version {} (expected {COEFFICIENTS_VERSION})",
                    self.version
                ),
            });
        }
        let scalars = [
            ("intercept", self.intercept),
            ("schooling", self.schooling),
            ("experience", self.experience),
            ("experience_sq", self.experience_sq),
            ("schooling_x_experience", self.schooling_x_experience),
        ];
        for (name, v) in scalars {
            if !v.is_finite() {
                return Err(RoiError::ModelFit {
                    reason: format!("coefficient `{name}` is not finite"),
                });
            }
        }
        if let Some((state, v)) = self.state_effects.iter().find(|(_, v)| !v.is_finite()) {
            return Err(RoiError::ModelFit {
                reason: format!("state effect for `{state}` is not finite ({v})"),
            });
        }
        Ok(())
    }

    /// The experience-dependent part of the linear predictor.
    fn experience_terms(&self, schooling: f64, experience: f64) -> f64 {
        self.schooling_x_experience * schooling * experience
            + self.experience * experience
            + self.experience_sq * experience * experience
    }
}

/// Inputs for a single wage prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionInput {
    pub state: Option<String>,
    pub schooling_years: f64,
    pub experience_years: f64,
}

/// How the state term of a prediction was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionBasis {
    /// The state had a fitted fixed effect (or was the reference state).
    StateEffect,
    /// The state was missing or unknown; only the intercept was used.
    InterceptFallback,
}

impl PredictionBasis {
    pub fn is_fallback(self) -> bool {
        matches!(self, PredictionBasis::InterceptFallback)
    }
}

/// Result of [`EarningsModel::predict`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WagePrediction {
    pub log_wage: f64,
    pub wage: f64,
    pub basis: PredictionBasis,
}

/// Read-only earnings model.
#[derive(Debug, Clone)]
pub struct EarningsModel {
    coefficients: Arc<EarningsModelCoefficients>,
}

impl EarningsModel {
    pub fn new(coefficients: EarningsModelCoefficients) -> Result<Self, RoiError> {
        coefficients.validate()?;
        Ok(Self {
            coefficients: Arc::new(coefficients),
        })
    }

    pub fn coefficients(&self) -> &EarningsModelCoefficients {
        &self.coefficients
    }

    /// Predict the expected wage level.
    ///
    /// An unknown or missing state falls back to the intercept and is flagged
    /// via [`PredictionBasis::InterceptFallback`].
    pub fn predict(&self, input: &PredictionInput) -> WagePrediction {
        let c = &*self.coefficients;
        let state_term = match input.state.as_deref() {
            Some(s) if s == c.reference_state => Some(0.0),
            Some(s) => c.state_effects.get(s).copied(),
            None => None,
        };
        let basis = match state_term {
            Some(_) => PredictionBasis::StateEffect,
            None => {
                debug!(state = ?input.state, "no state effect; using intercept only");
                PredictionBasis::InterceptFallback
            }
        };

        let s = input.schooling_years;
        let x = input.experience_years;
        let log_wage =
            c.intercept + state_term.unwrap_or(0.0) + c.schooling * s + c.experience_terms(s, x);

        WagePrediction {
            log_wage,
            wage: log_wage.exp(),
            basis,
        }
    }

    /// Project a pre-program wage forward by the experience gained since.
    ///
    /// Uses the change in the experience terms of the log-wage equation as an
    /// approximate percentage change: `start × (1 + f(X_now) − f(X_now − years))`.
    /// Experience at the start is clamped at zero.
    pub fn counterfactual_wage(
        &self,
        starting_wage: f64,
        schooling_years: f64,
        experience_now: f64,
        years_elapsed: f64,
    ) -> f64 {
        let c = &*self.coefficients;
        let start = (experience_now - years_elapsed).max(0.0);
        let delta = c.experience_terms(schooling_years, experience_now)
            - c.experience_terms(schooling_years, start);
        starting_wage * (1.0 + delta)
    }
}
