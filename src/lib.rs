//! ATP - Automated equational theorem prover
//!
//! Proves equations in user-defined algebraic contexts by rewriting with
//! known-true statements, and keeps a persistent record of everything it has
//! proved so later runs build on earlier ones.
//!
//! # Architecture
//!
//! - [`logic`] - expressions, statements, model contexts, the knowledge
//!   kernel and lazy successor enumeration
//! - [`search`] - iterative-deepening solver, stopping strategies,
//!   heuristics and search profiles
//! - [`hmm`] - hidden Markov model heuristic trained with Baum–Welch
//! - [`store`] - SQLite bookkeeping of theorems, proofs, attempts and models
//! - [`process`] - cooperative scheduling of proof and training work
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use atp::{IterativeDeepeningSolver, KnowledgeKernel, ModelContext, SearchSettings, Solver};
//!
//! let ctx = Arc::new(ModelContext::load("contexts/group-theory.json")?);
//! let kernel = KnowledgeKernel::new(ctx.clone());
//! let mut solver = IterativeDeepeningSolver::from_settings(kernel, &SearchSettings::default(), None)?;
//! solver.set_targets(vec![ctx.parse_statement("*(e, e) = e")?]);
//! while solver.any_proof_not_done() {
//!     solver.step(1000)?;
//! }
//! ```

pub mod config;
pub mod error;
pub mod hmm;
pub mod logic;
pub mod process;
pub mod search;
pub mod store;

pub use crate::config::{AtpConfig, ConfigError, LogLevel};
pub use crate::error::{AtpError, AtpResult, ErrorCode};
pub use crate::hmm::{HmmModel, HmmSettings, SharedModel};
pub use crate::logic::{
    Expression, KnowledgeKernel, MatchSettings, ModelContext, ProofRecord, ProofState, SharedKernel, Statement,
};
pub use crate::process::{
    Process, ProcessManager, ProcessReport, ProcessSequence, ProofProcess, Selection, TrainHmmProcess,
    UnprovenSelectorProcess,
};
pub use crate::search::{
    Heuristic, IterativeDeepeningSolver, ProofStatus, SearchSettings, Solver, StoppingStrategy,
};
pub use crate::store::{statement_key, TheoremStore};
