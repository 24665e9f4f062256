//! Iterative-deepening solver
//!
//! The solver proves a batch of targets at once. Each target owns a
//! depth-first stack of frames; a frame is a proof state plus the lazily
//! created stream of its successors. One tick either pops a finished frame or
//! takes one successor from the top frame:
//!
//! - the successor counts as one expansion;
//! - if its sides are identical the target is proved;
//! - if it repeats a statement already on the current path it is skipped;
//! - otherwise it is pushed when its depth is below the bound.
//!
//! When a stack runs empty the iteration is complete: the bound grows by one
//! and traversal restarts from the root. Once the bound passes the maximum
//! depth the stopping strategy is told the space is exhausted. A target only
//! ever becomes exhausted because its stopping strategy says so.
//!
//! Ticks are handed out round-robin across the targets still searching.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AtpError, AtpResult};
use crate::logic::{KnowledgeKernel, ProofState, Statement, SuccessorIter, SuccessorOptions};
use super::heuristic::{Heuristic, Ranked};
use super::settings::{SearchSettings, SolverSettings};
use super::stopping::{self, StoppingStrategy};

/// Outcome of one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofStatus {
    Searching,
    Proved,
    /// Budget spent or space traversed without a proof
    Exhausted,
    /// Internal fault
    Aborted,
}

impl ProofStatus {
    pub fn is_done(&self) -> bool {
        !matches!(self, ProofStatus::Searching)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProofStatus::Searching => "searching",
            ProofStatus::Proved => "proved",
            ProofStatus::Exhausted => "exhausted",
            ProofStatus::Aborted => "aborted",
        }
    }
}

/// Work done on one target
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchStats {
    pub expansions: u64,
    pub elapsed: Duration,
    /// Deepest stack seen
    pub peak_memory: usize,
    /// Completed iterations
    pub iterations: usize,
    /// Current depth bound
    pub depth_bound: usize,
}

/// A prover over a batch of targets, advanced in ticks
pub trait Solver {
    /// Replace the batch; targets whose sides are already identical are
    /// proved immediately.
    fn set_targets(&mut self, targets: Vec<Statement>);

    /// Run up to `ticks` ticks; returns how many ran
    fn step(&mut self, ticks: usize) -> AtpResult<usize>;

    /// Whether some target is still searching
    fn any_proof_not_done(&self) -> bool;

    /// Whether a batch is loaded
    fn engaged(&self) -> bool;

    fn clear(&mut self);

    fn targets(&self) -> Vec<&Statement>;

    fn statuses(&self) -> Vec<ProofStatus>;

    /// Proof of target `index`, once proved
    fn proof(&self, index: usize) -> Option<&ProofState>;

    fn stats(&self, index: usize) -> Option<&SearchStats>;
}

struct Frame {
    state: ProofState,
    /// Canonical form of the frame's statement, for cycle checks
    key: Statement,
    children: Option<SuccessorIter>,
}

impl Frame {
    fn new(state: ProofState) -> Self {
        let key = state.current().canonical();
        Frame { state, key, children: None }
    }
}

struct TargetSearch {
    root: ProofState,
    status: ProofStatus,
    stack: Vec<Frame>,
    bound: usize,
    proof: Option<ProofState>,
    stats: SearchStats,
}

/// What one tick did, for the stopping strategy
#[derive(Default)]
struct TickOutcome {
    expansions: u64,
    completed_bound: Option<usize>,
    space_exhausted: bool,
    proved: bool,
}

/// How successor streams are assembled
struct Expander {
    kernel: KnowledgeKernel,
    options: SuccessorOptions,
    heuristic: Option<Arc<dyn Heuristic>>,
    window: usize,
    opened: u64,
}

impl Expander {
    fn open(&mut self, state: &ProofState) -> SuccessorIter {
        let mut options = self.options;
        if let Some(seed) = options.shuffle_seed {
            options.shuffle_seed = Some(seed ^ self.opened.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        }
        self.opened += 1;
        let raw = self.kernel.successor_iter(state, options);
        match &self.heuristic {
            Some(h) => Box::new(Ranked::new(raw, Arc::clone(h), self.window)),
            None => raw,
        }
    }
}

impl TargetSearch {
    fn new(root: ProofState, bound: usize) -> Self {
        TargetSearch {
            stack: vec![Frame::new(root.clone())],
            root,
            status: ProofStatus::Searching,
            bound,
            proof: None,
            stats: SearchStats {
                depth_bound: bound,
                ..SearchStats::default()
            },
        }
    }

    fn proved(&mut self, proof: ProofState) {
        self.status = ProofStatus::Proved;
        self.proof = Some(proof);
        self.stack.clear();
    }

    fn tick(&mut self, expander: &mut Expander, max_depth: usize) -> AtpResult<TickOutcome> {
        let mut outcome = TickOutcome::default();
        if self.stack.len() > self.bound + 1 {
            return Err(AtpError::aborted(format!(
                "stack of {} frames exceeds depth bound {}",
                self.stack.len(),
                self.bound
            )));
        }

        let Some(top) = self.stack.last_mut() else {
            outcome.completed_bound = Some(self.bound);
            self.stats.iterations += 1;
            self.bound += 1;
            if self.bound > max_depth {
                outcome.space_exhausted = true;
            } else {
                self.stats.depth_bound = self.bound;
                self.stack.push(Frame::new(self.root.clone()));
            }
            return Ok(outcome);
        };

        let children = top.children.get_or_insert_with(|| expander.open(&top.state));
        let Some(child) = children.next() else {
            self.stack.pop();
            return Ok(outcome);
        };

        outcome.expansions = 1;
        if expander.kernel.try_match(child.current()) {
            outcome.proved = true;
            self.proved(child);
            return Ok(outcome);
        }

        let key = child.current().canonical();
        if self.stack.iter().any(|f| f.key == key) {
            return Ok(outcome);
        }
        if child.depth() < self.bound {
            self.stack.push(Frame { state: child, key, children: None });
        }
        Ok(outcome)
    }
}

/// Depth-first iterative deepening over a batch of targets
pub struct IterativeDeepeningSolver {
    settings: SolverSettings,
    expander: Expander,
    stopping: Box<dyn StoppingStrategy>,
    targets: Vec<TargetSearch>,
    cursor: usize,
}

impl IterativeDeepeningSolver {
    /// Solver over a kernel snapshot with an explicit stopping strategy
    pub fn new(kernel: KnowledgeKernel, settings: SolverSettings, stopping: Box<dyn StoppingStrategy>) -> Self {
        IterativeDeepeningSolver {
            settings,
            expander: Expander {
                kernel,
                options: SuccessorOptions { dedup: true, shuffle_seed: None },
                heuristic: None,
                window: 1,
                opened: 0,
            },
            stopping,
            targets: Vec::new(),
            cursor: 0,
        }
    }

    /// Solver configured by a search profile
    pub fn from_settings(
        kernel: KnowledgeKernel,
        settings: &SearchSettings,
        heuristic: Option<Arc<dyn Heuristic>>,
    ) -> AtpResult<Self> {
        settings.validate()?;
        let solver = Self::new(kernel, settings.solver.clone(), stopping::from_settings(&settings.stopping))
            .with_successor_options(settings.successor_options());
        Ok(match heuristic {
            Some(h) => solver.with_heuristic(h, settings.window),
            None => solver,
        })
    }

    pub fn with_heuristic(mut self, heuristic: Arc<dyn Heuristic>, window: usize) -> Self {
        self.expander.heuristic = Some(heuristic);
        self.expander.window = window.max(1);
        self
    }

    pub fn with_successor_options(mut self, options: SuccessorOptions) -> Self {
        self.expander.options = options;
        self
    }

    pub fn kernel(&self) -> &KnowledgeKernel {
        &self.expander.kernel
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn stopping(&self) -> &dyn StoppingStrategy {
        self.stopping.as_ref()
    }

    fn next_searching(&self) -> Option<usize> {
        let n = self.targets.len();
        (0..n)
            .map(|offset| (self.cursor + offset) % n)
            .find(|&i| self.targets[i].status == ProofStatus::Searching)
    }

    fn tick(&mut self, index: usize) -> AtpResult<()> {
        let started = Instant::now();
        let search = &mut self.targets[index];
        let result = search.tick(&mut self.expander, self.settings.max_depth);
        let elapsed = started.elapsed();

        search.stats.elapsed += elapsed;
        search.stats.peak_memory = search.stats.peak_memory.max(search.stack.len());
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                search.status = ProofStatus::Aborted;
                search.stack.clear();
                warn!(target_index = index, error = %e, "search aborted");
                return Err(e.with_context("target", index.to_string()));
            }
        };
        search.stats.expansions += outcome.expansions;

        self.stopping.add(index, outcome.expansions, elapsed, search.stack.len());
        if let Some(bound) = outcome.completed_bound {
            debug!(target_index = index, bound, expansions = search.stats.expansions, "iteration complete");
            self.stopping.on_iteration(index, bound);
        }
        if outcome.space_exhausted {
            self.stopping.on_space_exhausted(index);
        }
        if outcome.proved {
            self.stopping.on_proved(index);
            info!(
                target_index = index,
                depth = search.proof.as_ref().map_or(0, ProofState::depth),
                expansions = search.stats.expansions,
                "target proved"
            );
        } else if self.stopping.should_stop(index) {
            search.status = ProofStatus::Exhausted;
            search.stack.clear();
            self.stopping.on_stopped(index);
            info!(target_index = index, expansions = search.stats.expansions, "target exhausted");
        }
        Ok(())
    }
}

impl Solver for IterativeDeepeningSolver {
    fn set_targets(&mut self, targets: Vec<Statement>) {
        self.clear();
        self.stopping.reset(targets.len());
        let starting_depth = self.settings.starting_depth.max(1);
        for (index, target) in targets.iter().enumerate() {
            let root = self.expander.kernel.begin_proof_of(target);
            let mut search = TargetSearch::new(root.clone(), starting_depth);
            if self.expander.kernel.try_match(target) {
                search.proved(root);
                self.stopping.on_proved(index);
            }
            self.targets.push(search);
        }
        debug!(targets = self.targets.len(), "solver engaged");
    }

    fn step(&mut self, ticks: usize) -> AtpResult<usize> {
        let mut done = 0;
        while done < ticks {
            let Some(index) = self.next_searching() else {
                break;
            };
            self.tick(index)?;
            self.cursor = index + 1;
            done += 1;
        }
        Ok(done)
    }

    fn any_proof_not_done(&self) -> bool {
        self.targets.iter().any(|t| t.status == ProofStatus::Searching)
    }

    fn engaged(&self) -> bool {
        !self.targets.is_empty()
    }

    fn clear(&mut self) {
        self.targets.clear();
        self.cursor = 0;
    }

    fn targets(&self) -> Vec<&Statement> {
        self.targets.iter().map(|t| t.root.target()).collect()
    }

    fn statuses(&self) -> Vec<ProofStatus> {
        self.targets.iter().map(|t| t.status).collect()
    }

    fn proof(&self, index: usize) -> Option<&ProofState> {
        self.targets.get(index).and_then(|t| t.proof.as_ref())
    }

    fn stats(&self, index: usize) -> Option<&SearchStats> {
        self.targets.get(index).map(|t| &t.stats)
    }
}
