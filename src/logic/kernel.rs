//! Knowledge kernel
//!
//! The kernel holds the known-true statements of one model context (its
//! axioms, then proved theorems in insertion order) and uses them as
//! bidirectional rewrite rules.
//!
//! The rule set is copy-on-write: cloning a kernel takes a cheap read-only
//! snapshot, and [`KnowledgeKernel::add_theorems`] never changes a snapshot
//! that a running search already holds. Writers share a kernel through
//! [`SharedKernel`].

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::atp_ensure;
use crate::error::{AtpResult, ErrorCode};

use super::context::ModelContext;
use super::expr::{ExprPath, Expression};
use super::matching::{match_pattern, Assignment};
use super::proof_state::ProofState;
use super::statement::{Side, Statement};

/// Kernel shared between processes: one writer, many readers
pub type SharedKernel = Arc<RwLock<KnowledgeKernel>>;

/// Index of a rule in its kernel (stable, the rule list only grows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub usize);

/// Direction in which a rule is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Rewrite instances of the left side into the right side
    Forward,
    /// Rewrite instances of the right side into the left side
    Reverse,
}

impl Orientation {
    pub const BOTH: [Orientation; 2] = [Orientation::Forward, Orientation::Reverse];
}

/// Matching limits
///
/// A rule side that is a bare variable matches every sub-expression with one
/// assignment. Variables that occur only on the replacement side are then
/// filled from the current statement's free variables and the context's
/// constants, at most `max_assignments` combinations per rewrite site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    /// Cap on unbound-variable assignments per (position, rule, orientation)
    pub max_assignments: usize,
    /// Whether bare-variable rule sides may be used as match patterns
    pub expand_bare_variables: bool,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            max_assignments: 64,
            expand_bare_variables: true,
        }
    }
}

impl MatchSettings {
    /// A zero assignment cap would stop every rewrite, even by ground rules
    pub fn validate(&self) -> AtpResult<()> {
        atp_ensure!(
            self.max_assignments >= 1,
            ErrorCode::InvalidSettings,
            "max_assignments must be at least 1"
        );
        Ok(())
    }
}

/// One direction of a rule, ready for matching
#[derive(Debug, Clone)]
pub struct Rewrite {
    pattern: Expression,
    replacement: Expression,
    unbound: Vec<u32>,
}

impl Rewrite {
    fn new(pattern: &Expression, replacement: &Expression) -> Self {
        let mut bound = Vec::new();
        pattern.collect_vars(&mut bound);
        let mut unbound = Vec::new();
        replacement.collect_vars(&mut unbound);
        unbound.retain(|v| !bound.contains(v));
        Rewrite {
            pattern: pattern.clone(),
            replacement: replacement.clone(),
            unbound,
        }
    }

    pub fn pattern(&self) -> &Expression {
        &self.pattern
    }

    pub fn replacement(&self) -> &Expression {
        &self.replacement
    }

    /// Replacement-side variables the pattern does not bind
    pub fn unbound(&self) -> &[u32] {
        &self.unbound
    }
}

/// A known-true statement used as a rewrite rule
#[derive(Debug, Clone)]
pub struct Rule {
    id: RuleId,
    statement: Statement,
    is_axiom: bool,
    forward: Rewrite,
    reverse: Rewrite,
}

impl Rule {
    fn new(id: RuleId, statement: Statement, is_axiom: bool) -> Self {
        let forward = Rewrite::new(statement.lhs(), statement.rhs());
        let reverse = Rewrite::new(statement.rhs(), statement.lhs());
        Rule { id, statement, is_axiom, forward, reverse }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn is_axiom(&self) -> bool {
        self.is_axiom
    }

    pub fn rewrite(&self, orientation: Orientation) -> &Rewrite {
        match orientation {
            Orientation::Forward => &self.forward,
            Orientation::Reverse => &self.reverse,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RuleSet {
    rules: Vec<Rule>,
    canonical: HashSet<Statement>,
}

impl RuleSet {
    pub(crate) fn rules(&self) -> &[Rule] {
        &self.rules
    }

    fn insert(&mut self, statement: Statement, is_axiom: bool) -> bool {
        if statement.is_reflexive() || !self.canonical.insert(statement.canonical()) {
            return false;
        }
        let id = RuleId(self.rules.len());
        self.rules.push(Rule::new(id, statement, is_axiom));
        true
    }
}

/// Known-true statements of one context, used as rewrite rules
#[derive(Debug, Clone)]
pub struct KnowledgeKernel {
    context: Arc<ModelContext>,
    rules: Arc<RuleSet>,
    settings: MatchSettings,
}

impl KnowledgeKernel {
    /// Kernel seeded with the context's axioms
    pub fn new(context: Arc<ModelContext>) -> Self {
        Self::with_settings(context, MatchSettings::default())
    }

    pub fn with_settings(context: Arc<ModelContext>, settings: MatchSettings) -> Self {
        let mut rules = RuleSet::default();
        for axiom in context.axioms() {
            rules.insert(axiom.clone(), true);
        }
        KnowledgeKernel {
            context,
            rules: Arc::new(rules),
            settings,
        }
    }

    /// Wrap in a lock for sharing between processes
    pub fn into_shared(self) -> SharedKernel {
        Arc::new(RwLock::new(self))
    }

    pub fn context(&self) -> &Arc<ModelContext> {
        &self.context
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.rules.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules.rules
    }

    pub fn rule(&self, id: RuleId) -> Option<&Rule> {
        self.rules.rules.get(id.0)
    }

    pub(crate) fn rule_set(&self) -> Arc<RuleSet> {
        Arc::clone(&self.rules)
    }

    /// Whether `statement` is known, up to renaming and orientation
    pub fn contains(&self, statement: &Statement) -> bool {
        self.rules.canonical.contains(&statement.canonical())
    }

    /// Trivial truth test: both sides are structurally identical
    pub fn try_match(&self, statement: &Statement) -> bool {
        statement.is_reflexive()
    }

    /// Root proof state for a search
    pub fn begin_proof_of(&self, statement: &Statement) -> ProofState {
        ProofState::root(statement.clone())
    }

    /// Add proved statements as rules.
    ///
    /// Statements already present (canonically) and reflexive statements are
    /// skipped. Returns the number actually added.
    pub fn add_theorems<I>(&mut self, statements: I) -> usize
    where
        I: IntoIterator<Item = Statement>,
    {
        let rules = Arc::make_mut(&mut self.rules);
        let added = statements
            .into_iter()
            .filter(|s| rules.insert(s.clone(), false))
            .count();
        if added > 0 {
            debug!(context = self.context.name(), added, total = rules.rules.len(), "theorems added to kernel");
        }
        added
    }

    /// One-way match of one side of a rule against `subject`.
    ///
    /// The rule's variables are bound to sub-expressions of `subject`; the
    /// subject's own variables are treated as opaque.
    pub fn match_rule(&self, rule: RuleId, orientation: Orientation, subject: &Expression) -> Option<Assignment> {
        let rule = self.rule(rule)?;
        match_pattern(&rule.rewrite(orientation).pattern, subject, rule.statement.num_vars())
    }

    /// Values tried for replacement-side variables the match leaves unbound
    pub fn candidate_values(&self, statement: &Statement) -> Vec<Expression> {
        statement
            .var_exprs()
            .chain(self.context.constants().into_iter().map(Expression::Const))
            .collect()
    }

    /// Every statement obtainable by rewriting the node at `(side, path)` of
    /// `statement` with one orientation of one rule.
    pub fn rewrite_at(
        &self,
        statement: &Statement,
        side: Side,
        path: &ExprPath,
        rule: RuleId,
        orientation: Orientation,
    ) -> Vec<Statement> {
        let (rule, subject) = match (self.rule(rule), statement.side(side).subexpr(path)) {
            (Some(r), Some(s)) => (r, s),
            _ => return Vec::new(),
        };
        let rewrite = rule.rewrite(orientation);
        if rewrite.pattern.is_var() && !self.settings.expand_bare_variables {
            return Vec::new();
        }
        let base = match match_pattern(&rewrite.pattern, subject, rule.statement.num_vars()) {
            Some(a) => a,
            None => return Vec::new(),
        };
        let candidates: Arc<[Expression]> = self.candidate_values(statement).into();
        super::successors::AssignmentCursor::new(
            base,
            rewrite.unbound.clone(),
            candidates,
            self.settings.max_assignments,
        )
        .filter_map(|a| statement.replace_at(side, path, rewrite.replacement.substitute(&a)))
        .collect()
    }
}
