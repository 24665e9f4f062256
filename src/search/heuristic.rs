//! Successor ranking
//!
//! A heuristic scores proof states; higher is more promising. [`Ranked`]
//! applies one to a successor stream: it pulls a bounded window of
//! successors, sorts the window best-first and yields it, then pulls the next
//! window. Ranking never drops or invents successors, it only reorders them
//! within a window, so the depth-bounded search stays complete.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::hmm::{observations, HmmModel, SharedModel};
use crate::logic::{Expression, ProofState};

/// Scores proof states for best-first ordering
pub trait Heuristic: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, state: &ProofState) -> f64;
}

/// Prefers states whose two sides are structurally closer
#[derive(Debug, Clone, Copy, Default)]
pub struct SideDistanceHeuristic;

/// Structural distance between two expressions: zero when equal, the sum
/// over the children when the heads agree, otherwise the larger size.
pub fn side_distance(a: &Expression, b: &Expression) -> usize {
    if a == b {
        return 0;
    }
    match (a.head(), b.head()) {
        (Some(ha), Some(hb)) if ha == hb && a.args().len() == b.args().len() => {
            a.args().iter().zip(b.args()).map(|(x, y)| side_distance(x, y)).sum()
        }
        _ => a.size().max(b.size()),
    }
}

impl Heuristic for SideDistanceHeuristic {
    fn name(&self) -> &'static str {
        "side-distance"
    }

    fn score(&self, state: &ProofState) -> f64 {
        let current = state.current();
        -(side_distance(current.lhs(), current.rhs()) as f64)
    }
}

/// Average per-step log-likelihood of the path under one model snapshot.
///
/// The snapshot is fixed when the heuristic is built, so a search keeps
/// scoring with the same parameters even if training publishes a new model
/// meanwhile.
pub struct HmmHeuristic {
    model: Arc<HmmModel>,
    num_symbols: usize,
}

impl HmmHeuristic {
    pub fn new(model: Arc<HmmModel>, num_symbols: usize) -> Self {
        HmmHeuristic { model, num_symbols }
    }

    /// Heuristic over the model `shared` holds right now
    pub fn from_shared(shared: &SharedModel, num_symbols: usize) -> Self {
        Self::new(shared.snapshot(), num_symbols)
    }

    pub fn model(&self) -> &Arc<HmmModel> {
        &self.model
    }
}

impl Heuristic for HmmHeuristic {
    fn name(&self) -> &'static str {
        "hmm"
    }

    fn score(&self, state: &ProofState) -> f64 {
        let obs = observations::from_heads(&state.heads(), self.num_symbols);
        if obs.is_empty() {
            return 0.0;
        }
        // an alphabet mismatch ranks last instead of failing the search
        match self.model.log_likelihood(&obs) {
            Ok(ll) => ll / obs.len() as f64,
            Err(_) => f64::NEG_INFINITY,
        }
    }
}

/// Best-first reordering of a successor stream, one window at a time
pub struct Ranked<I> {
    inner: I,
    heuristic: Arc<dyn Heuristic>,
    window: usize,
    buffer: VecDeque<ProofState>,
}

impl<I: Iterator<Item = ProofState>> Ranked<I> {
    pub fn new(inner: I, heuristic: Arc<dyn Heuristic>, window: usize) -> Self {
        Ranked {
            inner,
            heuristic,
            window: window.max(1),
            buffer: VecDeque::new(),
        }
    }

    fn refill(&mut self) {
        let mut scored: Vec<(f64, ProofState)> = self
            .inner
            .by_ref()
            .take(self.window)
            .map(|s| (self.heuristic.score(&s), s))
            .collect();
        // stable: ties keep enumeration order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        self.buffer.extend(scored.into_iter().map(|(_, s)| s));
    }
}

impl<I: Iterator<Item = ProofState>> Iterator for Ranked<I> {
    type Item = ProofState;

    fn next(&mut self) -> Option<ProofState> {
        if self.buffer.is_empty() {
            self.refill();
        }
        self.buffer.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::HmmModel;
    use crate::logic::fixtures::group_theory;
    use crate::logic::{KnowledgeKernel, SuccessorOptions};

    #[test]
    fn test_side_distance() {
        let ctx = group_theory();
        let s = ctx.parse_statement("*(a, e) = *(a, i(e))").unwrap();
        assert_eq!(side_distance(s.lhs(), s.rhs()), 2);
        let s = ctx.parse_statement("i(a) = i(a)").unwrap();
        assert_eq!(side_distance(s.lhs(), s.rhs()), 0);
        let s = ctx.parse_statement("i(a) = e").unwrap();
        assert_eq!(side_distance(s.lhs(), s.rhs()), 2);
    }

    #[test]
    fn test_ranked_is_a_permutation_sorted_per_window() {
        let ctx = Arc::new(group_theory());
        let kernel = KnowledgeKernel::new(ctx.clone());
        let state = kernel.begin_proof_of(&ctx.parse_statement("*(a, e) = i(i(a))").unwrap());
        let options = SuccessorOptions { dedup: true, shuffle_seed: None };
        let heuristic: Arc<dyn Heuristic> = Arc::new(SideDistanceHeuristic);

        let plain: Vec<_> = kernel.successor_iter(&state, options).map(|s| s.current().clone()).collect();
        let ranked: Vec<_> = Ranked::new(kernel.successor_iter(&state, options), heuristic.clone(), 4).collect();
        assert_eq!(ranked.len(), plain.len());

        for window in ranked.chunks(4) {
            let scores: Vec<f64> = window.iter().map(|s| heuristic.score(s)).collect();
            assert!(scores.windows(2).all(|p| p[0] >= p[1]), "{:?}", scores);
        }

        let mut a: Vec<_> = ranked.iter().map(|s| s.current().clone()).collect();
        let mut b = plain;
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hmm_heuristic_scores_paths() {
        let ctx = Arc::new(group_theory());
        let kernel = KnowledgeKernel::new(ctx.clone());
        let root = kernel.begin_proof_of(&ctx.parse_statement("*(a, e) = a").unwrap());
        let model = Arc::new(SharedModel::new(HmmModel::uniform(2, observations::alphabet_size(&ctx))));
        let h = HmmHeuristic::from_shared(&model, ctx.num_symbols());
        assert_eq!(h.score(&root), 0.0);

        let child = kernel.successors(&root, None).next().unwrap();
        // uniform emissions over 4 letters
        assert!((h.score(&child) - (0.25f64).ln()).abs() < 1e-9);
    }

    #[test]
    fn test_hmm_heuristic_keeps_its_snapshot() {
        let ctx = Arc::new(group_theory());
        let kernel = KnowledgeKernel::new(ctx.clone());
        let root = kernel.begin_proof_of(&ctx.parse_statement("*(a, e) = a").unwrap());
        let child = kernel.successors(&root, None).next().unwrap();
        let symbols = observations::alphabet_size(&ctx);
        let shared = SharedModel::new(HmmModel::uniform(2, symbols));
        let h = HmmHeuristic::from_shared(&shared, ctx.num_symbols());
        let before = h.score(&child);

        shared.publish(HmmModel::seeded(2, symbols, 11));
        assert_eq!(h.score(&child), before);
        assert_eq!(**h.model(), HmmModel::uniform(2, symbols));
        assert_ne!(HmmHeuristic::from_shared(&shared, ctx.num_symbols()).score(&child), before);
    }
}
