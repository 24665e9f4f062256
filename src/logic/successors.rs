//! Lazy successor enumeration
//!
//! The successors of a proof state are all statements reachable by one
//! rewrite. They are produced by nested cursors, innermost last:
//!
//! 1. [`PositionCursor`] walks every node of the current statement, left side
//!    then right side, in pre-order.
//! 2. [`RuleCursor`] tries every rule in both orientations against the node.
//! 3. [`AssignmentCursor`] fills the variables the match left unbound.
//!
//! [`Dedup`] drops successors already produced at this level. Rule order can
//! be permuted per position with a seeded RNG.
//!
//! Nothing is materialized beyond the rule order of the current position,
//! so memory stays bounded whatever the branching factor.

use std::sync::Arc;

use fnv::FnvHashSet;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::expr::{ExprPath, Expression, SymbolId};
use super::kernel::{KnowledgeKernel, MatchSettings, Orientation, RuleId, RuleSet};
use super::matching::{match_pattern, Assignment};
use super::proof_state::{ProofState, ProofStep};
use super::statement::{Side, Statement};

/// Successor stream handed to the solver
pub type SuccessorIter = Box<dyn Iterator<Item = ProofState> + Send>;

/// How a successor stream is assembled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuccessorOptions {
    /// Suppress canonically identical successors
    pub dedup: bool,
    /// Permute rule order per position with this seed
    pub shuffle_seed: Option<u64>,
}

impl KnowledgeKernel {
    /// Raw successor cursor of `state`
    pub fn successors(&self, state: &ProofState, shuffle_seed: Option<u64>) -> Successors {
        Successors::new(self, state, shuffle_seed)
    }

    /// Successor stream assembled according to `options`
    pub fn successor_iter(&self, state: &ProofState, options: SuccessorOptions) -> SuccessorIter {
        let raw = self.successors(state, options.shuffle_seed);
        if options.dedup {
            Box::new(Dedup::new(raw))
        } else {
            Box::new(raw)
        }
    }
}

// ============================================================================
// Position cursor
// ============================================================================

/// Pre-order walk over both sides of a statement
#[derive(Debug)]
pub struct PositionCursor {
    statement: Statement,
    stack: Vec<(Side, ExprPath)>,
}

impl PositionCursor {
    pub fn new(statement: Statement) -> Self {
        PositionCursor {
            statement,
            stack: vec![(Side::Rhs, Vec::new()), (Side::Lhs, Vec::new())],
        }
    }
}

impl Iterator for PositionCursor {
    type Item = (Side, ExprPath);

    fn next(&mut self) -> Option<Self::Item> {
        let (side, path) = self.stack.pop()?;
        let arity = self
            .statement
            .side(side)
            .subexpr(&path)
            .map_or(0, |node| node.args().len());
        for i in (0..arity).rev() {
            let mut child = path.clone();
            child.push(i);
            self.stack.push((side, child));
        }
        Some((side, path))
    }
}

// ============================================================================
// Rule cursor
// ============================================================================

/// Rules (in both orientations) whose matched side fits one sub-expression
pub struct RuleCursor {
    rules: Arc<RuleSet>,
    subject: Expression,
    order: Vec<usize>,
    next: usize,
    orientation: usize,
    expand_bare_variables: bool,
}

impl RuleCursor {
    fn new(rules: Arc<RuleSet>, subject: Expression, order: Vec<usize>, settings: &MatchSettings) -> Self {
        RuleCursor {
            rules,
            subject,
            order,
            next: 0,
            orientation: 0,
            expand_bare_variables: settings.expand_bare_variables,
        }
    }
}

impl Iterator for RuleCursor {
    type Item = (RuleId, Orientation, Assignment);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(&index) = self.order.get(self.next) {
            let orientation = Orientation::BOTH[self.orientation];
            self.orientation += 1;
            if self.orientation == Orientation::BOTH.len() {
                self.orientation = 0;
                self.next += 1;
            }

            let rule = &self.rules.rules()[index];
            let pattern = rule.rewrite(orientation).pattern();
            let candidate = match pattern.head() {
                None => self.expand_bare_variables,
                head => head == self.subject.head(),
            };
            if !candidate {
                continue;
            }
            if let Some(assignment) = match_pattern(pattern, &self.subject, rule.statement().num_vars()) {
                return Some((rule.id(), orientation, assignment));
            }
        }
        None
    }
}

// ============================================================================
// Assignment cursor
// ============================================================================

/// Odometer over candidate values for the unbound variables of a match
pub(crate) struct AssignmentCursor {
    base: Assignment,
    unbound: Vec<u32>,
    candidates: Arc<[Expression]>,
    counters: Vec<usize>,
    remaining: usize,
    done: bool,
}

impl AssignmentCursor {
    pub(crate) fn new(base: Assignment, unbound: Vec<u32>, candidates: Arc<[Expression]>, cap: usize) -> Self {
        let done = cap == 0 || (!unbound.is_empty() && candidates.is_empty());
        AssignmentCursor {
            counters: vec![0; unbound.len()],
            base,
            unbound,
            candidates,
            remaining: cap,
            done,
        }
    }

    fn advance(&mut self) {
        for counter in self.counters.iter_mut().rev() {
            *counter += 1;
            if *counter < self.candidates.len() {
                return;
            }
            *counter = 0;
        }
        self.done = true;
    }
}

impl Iterator for AssignmentCursor {
    type Item = Assignment;

    fn next(&mut self) -> Option<Assignment> {
        if self.done {
            return None;
        }
        let mut assignment = self.base.clone();
        for (var, &choice) in self.unbound.iter().zip(&self.counters) {
            assignment.bind(*var, self.candidates[choice].clone());
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            self.done = true;
        } else {
            self.advance();
        }
        Some(assignment)
    }
}

// ============================================================================
// Composed successor cursor
// ============================================================================

struct Site {
    side: Side,
    path: ExprPath,
    head: Option<SymbolId>,
}

/// All one-step rewrites of a proof state
pub struct Successors {
    parent: ProofState,
    rules: Arc<RuleSet>,
    settings: MatchSettings,
    candidates: Arc<[Expression]>,
    positions: PositionCursor,
    site: Option<Site>,
    rule_cursor: Option<RuleCursor>,
    applying: Option<(RuleId, Orientation)>,
    assignments: Option<AssignmentCursor>,
    rng: Option<ChaCha8Rng>,
}

impl Successors {
    fn new(kernel: &KnowledgeKernel, parent: &ProofState, shuffle_seed: Option<u64>) -> Self {
        Successors {
            parent: parent.clone(),
            rules: kernel.rule_set(),
            settings: kernel.settings().clone(),
            candidates: kernel.candidate_values(parent.current()).into(),
            positions: PositionCursor::new(parent.current().clone()),
            site: None,
            rule_cursor: None,
            applying: None,
            assignments: None,
            rng: shuffle_seed.map(ChaCha8Rng::seed_from_u64),
        }
    }

    fn rule_order(&mut self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.rules.rules().len()).collect();
        if let Some(rng) = self.rng.as_mut() {
            order.shuffle(rng);
        }
        order
    }

    fn emit(&self, assignment: &Assignment) -> Option<ProofState> {
        let site = self.site.as_ref()?;
        let (rule_id, orientation) = self.applying?;
        let rule = self.rules.rules().get(rule_id.0)?;
        let replacement = rule.rewrite(orientation).replacement().substitute(assignment);
        let result = self.parent.current().replace_at(site.side, &site.path, replacement)?;
        Some(self.parent.child(ProofStep {
            rule: rule_id,
            orientation,
            side: site.side,
            path: site.path.clone(),
            head: site.head,
            result,
        }))
    }
}

impl Iterator for Successors {
    type Item = ProofState;

    fn next(&mut self) -> Option<ProofState> {
        loop {
            if let Some(assignment) = self.assignments.as_mut().and_then(Iterator::next) {
                if let Some(state) = self.emit(&assignment) {
                    return Some(state);
                }
                continue;
            }
            self.assignments = None;

            if let Some((rule_id, orientation, base)) = self.rule_cursor.as_mut().and_then(Iterator::next) {
                let unbound = self.rules.rules()[rule_id.0].rewrite(orientation).unbound().to_vec();
                self.applying = Some((rule_id, orientation));
                self.assignments = Some(AssignmentCursor::new(
                    base,
                    unbound,
                    Arc::clone(&self.candidates),
                    self.settings.max_assignments,
                ));
                continue;
            }
            self.rule_cursor = None;

            let (side, path) = self.positions.next()?;
            let subject = match self.parent.current().side(side).subexpr(&path) {
                Some(node) => node.clone(),
                None => continue,
            };
            let order = self.rule_order();
            self.site = Some(Site { side, path, head: subject.head() });
            self.rule_cursor = Some(RuleCursor::new(Arc::clone(&self.rules), subject, order, &self.settings));
        }
    }
}

// ============================================================================
// De-duplication
// ============================================================================

/// Drops successors canonically equal to one already yielded
pub struct Dedup<I> {
    inner: I,
    seen: FnvHashSet<Statement>,
}

impl<I> Dedup<I> {
    pub fn new(inner: I) -> Self {
        Dedup {
            inner,
            seen: FnvHashSet::default(),
        }
    }
}

impl<I: Iterator<Item = ProofState>> Iterator for Dedup<I> {
    type Item = ProofState;

    fn next(&mut self) -> Option<ProofState> {
        loop {
            let state = self.inner.next()?;
            if self.seen.insert(state.current().canonical()) {
                return Some(state);
            }
        }
    }
}
