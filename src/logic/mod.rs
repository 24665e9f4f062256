//! Equational logic model
//!
//! Expressions, statements and model contexts, plus the knowledge kernel
//! that turns known-true statements into rewrite rules and enumerates the
//! one-step successors of a proof state.

pub mod context;
pub mod expr;
pub mod kernel;
pub mod matching;
pub mod parser;
pub mod proof_state;
pub mod statement;
pub mod successors;

pub use context::{ContextDefinition, ModelContext, SymbolDefinition};
pub use expr::{ExprPath, Expression, SymbolId};
pub use kernel::{KnowledgeKernel, MatchSettings, Orientation, Rewrite, Rule, RuleId, SharedKernel};
pub use matching::{match_pattern, Assignment};
pub use proof_state::{ProofRecord, ProofState, ProofStep, StepRecord};
pub use statement::{Side, Statement};
pub use successors::{Dedup, SuccessorIter, SuccessorOptions, Successors};

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use super::{KnowledgeKernel, ModelContext};

    pub(crate) const GROUP_THEORY_JSON: &str = r#"{
        "name": "group-theory",
        "definitions": [
            { "name": "*", "arity": 2 },
            { "name": "e", "arity": 0 },
            { "name": "i", "arity": 1 }
        ],
        "axioms": [
            "*(x, e) = x",
            "*(x, i(x)) = e",
            "*(*(x, y), z) = *(x, *(y, z))"
        ]
    }"#;

    pub(crate) fn group_theory() -> ModelContext {
        ModelContext::from_json(GROUP_THEORY_JSON).unwrap()
    }

    /// Group axioms plus left identity and left inverse
    pub(crate) fn group_kernel_with_lemmas() -> KnowledgeKernel {
        let ctx = Arc::new(group_theory());
        let mut kernel = KnowledgeKernel::new(ctx.clone());
        kernel.add_theorems(vec![
            ctx.parse_statement("*(e, x) = x").unwrap(),
            ctx.parse_statement("*(i(x), x) = e").unwrap(),
        ]);
        kernel
    }
}
