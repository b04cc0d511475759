//! ANOVA-style sum-of-squares decomposition: `SS_total = SS_between + SS_within`.

use super::Components;
use super::partition::Partition;

pub(crate) fn anova(p: &Partition<'_>) -> Components {
    if p.is_constant() {
        return Components::zero(p.cells.len());
    }

    let mu = p.mean;
    let overall: f64 = p.values.iter().map(|v| (v - mu).powi(2)).sum();

    let mut between = 0.0;
    let mut within = 0.0;
    let mut indices = Vec::with_capacity(p.cells.len());
    for cell in &p.cells {
        between += cell.n() as f64 * (cell.mean - mu).powi(2);
        let ss_g: f64 = cell.values.iter().map(|v| (v - cell.mean).powi(2)).sum();
        within += ss_g;
        indices.push(ss_g);
    }

    Components {
        overall,
        between,
        within,
        group_indices: indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GroupKey;

    #[test]
    fn sums_of_squares_add_up() {
        let values = [1.0, 2.0, 3.0, 10.0, 12.0];
        let keys: Vec<GroupKey> = ["a", "a", "a", "b", "b"].iter().map(|k| (*k).into()).collect();
        let c = anova(&Partition::new(&values, &keys).unwrap());

        // a: mean 2, SS 2; b: mean 11, SS 2; μ = 5.6
        assert!((c.within - 4.0).abs() < 1e-9);
        let between = 3.0 * (2.0_f64 - 5.6).powi(2) + 2.0 * (11.0_f64 - 5.6).powi(2);
        assert!((c.between - between).abs() < 1e-9);
        assert!((c.overall - (c.between + c.within)).abs() < 1e-9);
    }

    #[test]
    fn negative_values_are_fine() {
        let values = [-5.0, 5.0];
        let keys: Vec<GroupKey> = vec!["a".into(), "b".into()];
        let c = anova(&Partition::new(&values, &keys).unwrap());
        assert!((c.overall - 50.0).abs() < 1e-12);
        assert!((c.between - 50.0).abs() < 1e-12);
    }
}
