//! Proof states
//!
//! A proof state is one node of the rewrite search: the target, the
//! statement reached so far and the chain of steps that led there. Steps are
//! kept in a persistent linked list so siblings share their common prefix.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AtpError, AtpResult, ErrorCode};
use super::context::ModelContext;
use super::expr::{ExprPath, SymbolId};
use super::kernel::{KnowledgeKernel, Orientation, RuleId};
use super::statement::{Side, Statement};

/// One rule application
#[derive(Debug, Clone, PartialEq)]
pub struct ProofStep {
    /// Rule applied (owned by the kernel)
    pub rule: RuleId,
    pub orientation: Orientation,
    pub side: Side,
    pub path: ExprPath,
    /// Head symbol of the rewritten node before the rewrite; `None` for a variable
    pub head: Option<SymbolId>,
    /// Statement after the rewrite
    pub result: Statement,
}

#[derive(Debug)]
struct Trail {
    step: ProofStep,
    prev: Option<Arc<Trail>>,
}

/// A node of the proof search
#[derive(Debug, Clone)]
pub struct ProofState {
    target: Arc<Statement>,
    current: Statement,
    depth: usize,
    trail: Option<Arc<Trail>>,
}

impl ProofState {
    pub(crate) fn root(target: Statement) -> Self {
        ProofState {
            current: target.clone(),
            target: Arc::new(target),
            depth: 0,
            trail: None,
        }
    }

    pub(crate) fn child(&self, step: ProofStep) -> Self {
        ProofState {
            target: Arc::clone(&self.target),
            current: step.result.clone(),
            depth: self.depth + 1,
            trail: Some(Arc::new(Trail {
                step,
                prev: self.trail.clone(),
            })),
        }
    }

    pub fn target(&self) -> &Statement {
        &self.target
    }

    /// Statement reached from the target
    pub fn current(&self) -> &Statement {
        &self.current
    }

    /// Number of rewrites from the target
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_root(&self) -> bool {
        self.trail.is_none()
    }

    pub fn last_step(&self) -> Option<&ProofStep> {
        self.trail.as_ref().map(|t| &t.step)
    }

    /// Steps from the target to this state, in order
    pub fn steps(&self) -> Vec<ProofStep> {
        let mut steps = Vec::with_capacity(self.depth);
        let mut node = self.trail.as_deref();
        while let Some(t) = node {
            steps.push(t.step.clone());
            node = t.prev.as_deref();
        }
        steps.reverse();
        steps
    }

    /// Head symbols of the rewritten nodes, in order
    pub fn heads(&self) -> Vec<Option<SymbolId>> {
        let mut heads = Vec::with_capacity(self.depth);
        let mut node = self.trail.as_deref();
        while let Some(t) = node {
            heads.push(t.step.head);
            node = t.prev.as_deref();
        }
        heads.reverse();
        heads
    }

    /// Distinct rules used along the chain
    pub fn rules_used(&self) -> Vec<RuleId> {
        let mut rules: Vec<RuleId> = self.steps().iter().map(|s| s.rule).collect();
        rules.sort();
        rules.dedup();
        rules
    }

    /// Re-derive every step from its predecessor with the recorded rule.
    ///
    /// Succeeds iff each statement in the chain is a single rewrite of the
    /// previous one by a rule of `kernel`.
    pub fn replay(&self, kernel: &KnowledgeKernel) -> AtpResult<()> {
        let mut prev = self.target().clone();
        for (n, step) in self.steps().iter().enumerate() {
            let candidates = kernel.rewrite_at(&prev, step.side, &step.path, step.rule, step.orientation);
            if !candidates.contains(&step.result) {
                return Err(AtpError::new(
                    ErrorCode::SearchAborted,
                    format!("step {} is not a single rewrite of its predecessor", n + 1),
                )
                .with_context("rule", step.rule.0.to_string()));
            }
            prev = step.result.clone();
        }
        Ok(())
    }

    /// Serializable proof chain
    pub fn to_record(&self, kernel: &KnowledgeKernel) -> ProofRecord {
        let ctx = kernel.context();
        ProofRecord {
            target: self.target.to_text(ctx),
            steps: self
                .steps()
                .into_iter()
                .map(|step| StepRecord {
                    rule: kernel
                        .rule(step.rule)
                        .map(|r| r.statement().to_text(ctx))
                        .unwrap_or_default(),
                    statement: step.result.to_text(ctx),
                    head: step.head.and_then(|h| ctx.symbol_name(h)).map(str::to_string),
                    orientation: step.orientation,
                    side: step.side,
                    path: step.path,
                })
                .collect(),
        }
    }
}

/// Persisted proof: the target and its chain of implication steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub target: String,
    pub steps: Vec<StepRecord>,
}

/// One persisted step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Statement reached by this step
    pub statement: String,
    /// Rule used, in canonical text
    pub rule: String,
    pub orientation: Orientation,
    pub side: Side,
    pub path: ExprPath,
    /// Head symbol name of the rewritten node, absent for a variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
}

impl ProofRecord {
    /// Record for a statement accepted without proof
    pub fn axiom(statement: &Statement, ctx: &ModelContext) -> Self {
        ProofRecord {
            target: statement.to_text(ctx),
            steps: Vec::new(),
        }
    }

    pub fn to_json(&self) -> AtpResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> AtpResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Human-readable chain, one statement per line
    pub fn lines(&self) -> Vec<String> {
        std::iter::once(self.target.clone())
            .chain(self.steps.iter().map(|s| format!("  => {}    [{}]", s.statement, s.rule)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::fixtures::group_theory;

    #[test]
    fn test_root_state() {
        let ctx = Arc::new(group_theory());
        let k = KnowledgeKernel::new(ctx.clone());
        let s = ctx.parse_statement("i(i(x)) = x").unwrap();
        let root = k.begin_proof_of(&s);
        assert!(root.is_root());
        assert_eq!(root.depth(), 0);
        assert_eq!(root.current(), &s);
        assert!(root.steps().is_empty());
    }

    #[test]
    fn test_children_share_prefix_and_replay() {
        let ctx = Arc::new(group_theory());
        let k = KnowledgeKernel::new(ctx.clone());
        let target = ctx.parse_statement("*(y, e) = *(y, e)").unwrap();
        let root = k.begin_proof_of(&target);

        let first = k.rewrite_at(&target, Side::Lhs, &vec![], RuleId(0), Orientation::Forward);
        assert_eq!(first.len(), 1);
        let child = root.child(ProofStep {
            rule: RuleId(0),
            orientation: Orientation::Forward,
            side: Side::Lhs,
            path: vec![],
            head: ctx.symbol_id("*"),
            result: first[0].clone(),
        });
        assert_eq!(child.depth(), 1);
        assert_eq!(child.current().to_text(&ctx), "x0 = *(x0, e)");
        assert_eq!(child.heads(), vec![ctx.symbol_id("*")]);
        assert_eq!(child.rules_used(), vec![RuleId(0)]);
        child.replay(&k).unwrap();

        let record = child.to_record(&k);
        assert_eq!(record.steps.len(), 1);
        assert_eq!(record.steps[0].head.as_deref(), Some("*"));
        let again = ProofRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(again, record);
    }

    #[test]
    fn test_replay_rejects_forged_step() {
        let ctx = Arc::new(group_theory());
        let k = KnowledgeKernel::new(ctx.clone());
        let target = ctx.parse_statement("i(y) = y").unwrap();
        let forged = root_with_step(&k, &target, ctx.parse_statement("e = y").unwrap());
        let err = forged.replay(&k).unwrap_err();
        assert_eq!(err.code, ErrorCode::SearchAborted);
    }

    fn root_with_step(k: &KnowledgeKernel, target: &Statement, result: Statement) -> ProofState {
        k.begin_proof_of(target).child(ProofStep {
            rule: RuleId(1),
            orientation: Orientation::Forward,
            side: Side::Lhs,
            path: vec![],
            head: None,
            result,
        })
    }
}
