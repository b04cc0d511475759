//! Reporting utilities: group rankings and formatted terminal output.

pub mod format;

pub use format::*;

use crate::earnings::{GroupPremium, PremiumResult};

/// Groups with the highest and lowest mean premium (top-N each side).
#[derive(Debug, Clone)]
pub struct PremiumRankings {
    pub highest: Vec<GroupPremium>,
    pub lowest: Vec<GroupPremium>,
}

/// Rank groups by mean premium. Groups without any premium are left out.
pub fn rank_group_premiums(result: &PremiumResult, top_n: usize) -> PremiumRankings {
    let mut ranked: Vec<&GroupPremium> = result
        .groups
        .iter()
        .filter(|g| g.mean_premium.is_some())
        .collect();
    ranked.sort_by(|a, b| {
        b.mean_premium
            .partial_cmp(&a.mean_premium)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let highest = ranked.iter().take(top_n).map(|g| (*g).clone()).collect();
    let lowest = ranked.iter().rev().take(top_n).map(|g| (*g).clone()).collect();
    PremiumRankings { highest, lowest }
}
