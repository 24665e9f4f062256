//! Helper theorem selection
//!
//! Before a batch is searched, proved theorems from the store are added to
//! the kernel as extra rewrite rules. Which ones is a profile setting: a
//! plain random sample, or a larger random sample narrowed down to the
//! theorems that look most like pieces of the targets.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::logic::{Expression, Statement};

/// A random sample of proved theorems
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedSelection {
    pub limit: usize,
}

impl Default for FixedSelection {
    fn default() -> Self {
        Self { limit: 100 }
    }
}

/// Sample `load` theorems, keep the `keep` closest to the targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditDistanceSelection {
    pub load: usize,
    pub keep: usize,
    /// Reward for each matching symbol
    pub match_benefit: f64,
    /// Cost per node of a mismatched subtree
    pub mismatch_cost: f64,
    /// Exponent applied to how far a position is from the best match
    pub weighting: f64,
}

impl Default for EditDistanceSelection {
    fn default() -> Self {
        Self {
            load: 500,
            keep: 50,
            match_benefit: 1.0,
            mismatch_cost: 1.0,
            weighting: 2.0,
        }
    }
}

/// How helper theorems are chosen for a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HelperSelection {
    Fixed(FixedSelection),
    EditDistance(EditDistanceSelection),
}

impl Default for HelperSelection {
    fn default() -> Self {
        HelperSelection::Fixed(FixedSelection::default())
    }
}

impl HelperSelection {
    /// How many stored theorems to sample
    pub fn load_limit(&self) -> usize {
        match self {
            HelperSelection::Fixed(f) => f.limit,
            HelperSelection::EditDistance(e) => e.load,
        }
    }

    /// Narrow the sampled `candidates` down for `targets`
    pub fn select(&self, candidates: Vec<Statement>, targets: &[Statement]) -> Vec<Statement> {
        match self {
            HelperSelection::Fixed(f) => candidates.into_iter().take(f.limit).collect(),
            HelperSelection::EditDistance(e) => e.select(candidates, targets),
        }
    }
}

impl EditDistanceSelection {
    fn distance(&self, a: &Expression, b: &Expression) -> f64 {
        edit_distance(a, b, self.match_benefit, self.mismatch_cost)
    }

    /// Distance from every non-variable position of `target` to the nearer
    /// side of `helper`. A side that is a bare variable matches anything and
    /// is left out; with no side left a position costs its whole size.
    fn position_distances(&self, target: &Statement, helper: &Statement) -> Vec<f64> {
        let sides: Vec<&Expression> = [helper.lhs(), helper.rhs()].into_iter().filter(|e| !e.is_var()).collect();
        target
            .positions()
            .into_iter()
            .filter_map(|(side, path)| target.side(side).subexpr(&path))
            .filter(|sub| !sub.is_var())
            .map(|sub| {
                sides
                    .iter()
                    .map(|side| self.distance(side, sub))
                    .fold(self.mismatch_cost * sub.size() as f64, f64::min)
            })
            .collect()
    }

    /// Higher is more useful across the whole batch
    fn utility(&self, helper: &Statement, targets: &[Statement]) -> f64 {
        targets
            .iter()
            .map(|target| {
                let distances = self.position_distances(target, helper);
                if distances.is_empty() {
                    return 0.0;
                }
                let best = distances.iter().copied().fold(f64::INFINITY, f64::min);
                let spread: f64 = distances.iter().map(|d| -(d - best).powf(self.weighting)).sum();
                -best + spread / distances.len() as f64
            })
            .sum()
    }

    pub fn select(&self, candidates: Vec<Statement>, targets: &[Statement]) -> Vec<Statement> {
        if candidates.len() <= self.keep {
            return candidates;
        }
        let mut scored: Vec<(f64, Statement)> = candidates
            .into_iter()
            .map(|helper| (self.utility(&helper, targets), helper))
            .collect();
        // stable: ties keep sample order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.truncate(self.keep);
        for (utility, _) in &scored {
            trace!(utility, "helper selected");
        }
        scored.into_iter().map(|(_, s)| s).collect()
    }
}

/// Cost of rewriting `a` into `b`. Variables match anything for free, each
/// agreeing symbol earns `benefit`, and a subtree whose head disagrees costs
/// `cost` per node of the larger side. Can be negative.
pub fn edit_distance(a: &Expression, b: &Expression, benefit: f64, cost: f64) -> f64 {
    if a.is_var() || b.is_var() {
        return 0.0;
    }
    match (a.head(), b.head()) {
        (Some(ha), Some(hb)) if ha == hb && a.args().len() == b.args().len() => {
            let children: f64 = a
                .args()
                .iter()
                .zip(b.args())
                .map(|(x, y)| edit_distance(x, y, benefit, cost))
                .sum();
            children - benefit
        }
        _ => cost * a.size().max(b.size()) as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::fixtures::group_theory;

    #[test]
    fn test_edit_distance() {
        let ctx = group_theory();
        let e = |s: &str| ctx.parse_expression(s).unwrap();
        assert_eq!(edit_distance(&e("i(e)"), &e("i(e)"), 1.0, 1.0), -2.0);
        assert_eq!(edit_distance(&e("i(x)"), &e("i(*(e, e))"), 1.0, 1.0), -1.0);
        assert_eq!(edit_distance(&e("i(e)"), &e("*(e, e)"), 1.0, 1.0), 3.0);
        assert_eq!(edit_distance(&e("*(e, i(e))"), &e("*(e, e)"), 1.0, 2.0), -2.0 + 4.0);
    }

    #[test]
    fn test_fixed_takes_the_sample() {
        let ctx = group_theory();
        let candidates: Vec<Statement> = ["i(e) = e", "*(e, x) = x", "i(i(x)) = x"]
            .iter()
            .map(|s| ctx.parse_statement(s).unwrap())
            .collect();
        let selection = HelperSelection::Fixed(FixedSelection { limit: 2 });
        assert_eq!(selection.load_limit(), 2);
        assert_eq!(selection.select(candidates.clone(), &[]), candidates[..2].to_vec());
    }

    #[test]
    fn test_edit_distance_keeps_similar_helpers() {
        let ctx = group_theory();
        let parse = |s: &str| ctx.parse_statement(s).unwrap();
        let candidates = vec![parse("*(e, x) = x"), parse("i(e) = e"), parse("*(*(x, e), e) = x")];
        let targets = vec![parse("i(i(e)) = e")];
        let selection = HelperSelection::EditDistance(EditDistanceSelection {
            load: 10,
            keep: 1,
            ..EditDistanceSelection::default()
        });
        assert_eq!(selection.load_limit(), 10);
        assert_eq!(selection.select(candidates.clone(), &targets), vec![candidates[1].clone()]);

        // fewer candidates than `keep` come back untouched
        let all = EditDistanceSelection { keep: 5, ..EditDistanceSelection::default() };
        assert_eq!(all.select(candidates.clone(), &targets), candidates);
    }
}
