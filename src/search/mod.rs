//! Proof search
//!
//! Iterative-deepening over the rewrite graph of the knowledge kernel,
//! bounded by pluggable stopping strategies and optionally ordered by a
//! heuristic.

pub mod heuristic;
pub mod selection;
pub mod settings;
pub mod solver;
pub mod stopping;

pub use heuristic::{side_distance, Heuristic, HmmHeuristic, Ranked, SideDistanceHeuristic};
pub use selection::{edit_distance, EditDistanceSelection, FixedSelection, HelperSelection};
pub use settings::{BasicBudget, FixedLimits, HeuristicKind, SearchSettings, SolverSettings, StoppingSettings};
pub use solver::{IterativeDeepeningSolver, ProofStatus, SearchStats, Solver};
pub use stopping::{BasicStoppingStrategy, FixedStoppingStrategy, StoppingStrategy, TargetCounters};
