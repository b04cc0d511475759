//! Earnings model (fit + predict) and the earnings premium calculator.

pub mod fit;
pub mod model;
pub mod premium;
pub mod schooling;

pub use fit::{FitOptions, FitReport, SurveyRecord, fit_earnings_model};
pub use model::{
    COEFFICIENTS_VERSION, EarningsModel, EarningsModelCoefficients, PredictionBasis,
    PredictionInput, WagePrediction,
};
pub use premium::{
    FallbackPolicy, GroupPremium, IndividualPremium, PremiumCalculator, PremiumInput,
    PremiumResult,
};
pub use schooling::{AgeGroup, work_experience, years_of_schooling};
