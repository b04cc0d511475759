//! Earnings premium: observed wage minus the model's predicted wage.
//!
//! Individual premiums feed the inequality decomposer directly; group means are
//! computed only over individuals with an observed wage (missing wages are
//! excluded, never imputed as zero).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::GroupKey;

use super::model::{EarningsModel, PredictionBasis, PredictionInput};

/// Whether intercept-fallback predictions count toward group means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    #[default]
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PremiumInput {
    pub id: String,
    pub group: GroupKey,
    pub state: Option<String>,
    pub schooling_years: f64,
    pub experience_years: f64,
    pub observed_wage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualPremium {
    pub id: String,
    pub group: GroupKey,
    pub predicted_wage: f64,
    pub observed_wage: Option<f64>,
    /// `observed − predicted`; `None` when the observed wage is missing.
    pub premium: Option<f64>,
    pub basis: PredictionBasis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupPremium {
    pub group: GroupKey,
    pub n: usize,
    pub n_with_wage: usize,
    pub n_fallback: usize,
    /// Mean of the premiums that count under the fallback policy.
    pub mean_premium: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremiumResult {
    pub individuals: Vec<IndividualPremium>,
    pub groups: Vec<GroupPremium>,
    pub policy: FallbackPolicy,
    pub excluded_missing_wage: usize,
    /// Fallback predictions left out of group means (always 0 under `Include`).
    pub excluded_fallback: usize,
}

impl PremiumResult {
    /// Premiums and group labels ready for [`crate::equity::decompose`].
    ///
    /// Uses the same inclusion rule as the group means.
    pub fn decomposition_input(&self) -> (Vec<f64>, Vec<GroupKey>) {
        self.individuals
            .iter()
            .filter(|p| counts(p, self.policy))
            .filter_map(|p| p.premium.map(|v| (v, p.group.clone())))
            .unzip()
    }
}

fn counts(p: &IndividualPremium, policy: FallbackPolicy) -> bool {
    !(policy == FallbackPolicy::Exclude && p.basis.is_fallback())
}

/// Combines observed wages with earnings-model predictions.
#[derive(Debug, Clone)]
pub struct PremiumCalculator {
    model: EarningsModel,
    policy: FallbackPolicy,
}

impl PremiumCalculator {
    pub fn new(model: EarningsModel) -> Self {
        Self {
            model,
            policy: FallbackPolicy::default(),
        }
    }

    pub fn with_fallback_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn calculate(&self, inputs: &[PremiumInput]) -> PremiumResult {
        let individuals: Vec<IndividualPremium> = inputs
            .iter()
            .map(|input| {
                let prediction = self.model.predict(&PredictionInput {
                    state: input.state.clone(),
                    schooling_years: input.schooling_years,
                    experience_years: input.experience_years,
                });
                let observed = input.observed_wage.filter(|w| w.is_finite());
                IndividualPremium {
                    id: input.id.clone(),
                    group: input.group.clone(),
                    predicted_wage: prediction.wage,
                    observed_wage: observed,
                    premium: observed.map(|w| w - prediction.wage),
                    basis: prediction.basis,
                }
            })
            .collect();

        #[derive(Default)]
        struct Acc {
            n: usize,
            n_with_wage: usize,
            n_fallback: usize,
            sum: f64,
            used: usize,
        }

        let mut acc: BTreeMap<&GroupKey, Acc> = BTreeMap::new();
        let mut excluded_missing_wage = 0;
        let mut excluded_fallback = 0;
        for p in &individuals {
            let a = acc.entry(&p.group).or_default();
            a.n += 1;
            if p.basis.is_fallback() {
                a.n_fallback += 1;
            }
            let Some(premium) = p.premium else {
                excluded_missing_wage += 1;
                continue;
            };
            a.n_with_wage += 1;
            if !counts(p, self.policy) {
                excluded_fallback += 1;
                continue;
            }
            a.sum += premium;
            a.used += 1;
        }

        let groups: Vec<GroupPremium> = acc
            .into_iter()
            .map(|(group, a)| GroupPremium {
                group: group.clone(),
                n: a.n,
                n_with_wage: a.n_with_wage,
                n_fallback: a.n_fallback,
                mean_premium: (a.used > 0).then(|| a.sum / a.used as f64),
            })
            .collect();

        debug!(
            individuals = individuals.len(),
            groups = groups.len(),
            excluded_missing_wage,
            excluded_fallback,
            "computed earnings premiums"
        );

        PremiumResult {
            individuals,
            groups,
            policy: self.policy,
            excluded_missing_wage,
            excluded_fallback,
        }
    }
}
