//! Stopping strategies
//!
//! A stopping strategy decides when a target has used up its budget. The
//! solver is the only writer: it reports work after every tick through
//! [`StoppingStrategy::add`] and the lifecycle hooks, and consults
//! [`StoppingStrategy::should_stop`] before the next one. A target is never
//! declared exhausted without the strategy agreeing.

use std::time::Duration;

use tracing::debug;

use super::settings::{BasicBudget, FixedLimits, StoppingSettings};

/// Work recorded against one target
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetCounters {
    pub expansions: u64,
    pub elapsed: Duration,
    pub peak_memory: usize,
    /// Completed iterative-deepening iterations
    pub iterations: usize,
    /// Deepest bound completed
    pub depth: usize,
    /// Search space up to the maximum depth was traversed
    pub space_exhausted: bool,
    pub proved: bool,
    /// Declared exhausted by the solver
    pub stopped: bool,
}

impl TargetCounters {
    fn record(&mut self, expansions: u64, elapsed: Duration, memory: usize) {
        self.expansions += expansions;
        self.elapsed += elapsed;
        self.peak_memory = self.peak_memory.max(memory);
    }
}

/// Budget policy consulted by the solver between ticks
pub trait StoppingStrategy: Send {
    /// Start a new batch of `num_targets` targets
    fn reset(&mut self, num_targets: usize);

    /// Record work done on `target` during one tick
    fn add(&mut self, target: usize, expansions: u64, elapsed: Duration, memory: usize);

    /// `target` finished the iteration with depth bound `depth`
    fn on_iteration(&mut self, target: usize, depth: usize);

    /// `target` has nothing left to explore within the maximum depth
    fn on_space_exhausted(&mut self, target: usize);

    /// `target` was proved; any unused budget may be handed to the others
    fn on_proved(&mut self, target: usize);

    /// The solver gave up on `target` after `should_stop` agreed
    fn on_stopped(&mut self, target: usize);

    fn should_stop(&self, target: usize) -> bool;

    fn counters(&self, target: usize) -> Option<&TargetCounters>;
}

/// Build the strategy a profile asks for
pub fn from_settings(settings: &StoppingSettings) -> Box<dyn StoppingStrategy> {
    match settings {
        StoppingSettings::Fixed(limits) => Box::new(FixedStoppingStrategy::new(limits.clone())),
        StoppingSettings::Basic(budget) => Box::new(BasicStoppingStrategy::new(budget.clone())),
    }
}

// ============================================================================
// Fixed thresholds
// ============================================================================

/// Static per-target thresholds
#[derive(Debug, Clone)]
pub struct FixedStoppingStrategy {
    limits: FixedLimits,
    targets: Vec<TargetCounters>,
}

impl FixedStoppingStrategy {
    pub fn new(limits: FixedLimits) -> Self {
        Self { limits, targets: Vec::new() }
    }

    /// Stop after `max_expansions` expansions per target
    pub fn expansions(max_expansions: u64) -> Self {
        Self::new(FixedLimits {
            max_expansions: Some(max_expansions),
            ..FixedLimits::default()
        })
    }

    fn target_mut(&mut self, target: usize) -> &mut TargetCounters {
        if target >= self.targets.len() {
            self.targets.resize(target + 1, TargetCounters::default());
        }
        &mut self.targets[target]
    }
}

impl StoppingStrategy for FixedStoppingStrategy {
    fn reset(&mut self, num_targets: usize) {
        self.targets = vec![TargetCounters::default(); num_targets];
    }

    fn add(&mut self, target: usize, expansions: u64, elapsed: Duration, memory: usize) {
        self.target_mut(target).record(expansions, elapsed, memory);
    }

    fn on_iteration(&mut self, target: usize, depth: usize) {
        let c = self.target_mut(target);
        c.iterations += 1;
        c.depth = depth;
    }

    fn on_space_exhausted(&mut self, target: usize) {
        self.target_mut(target).space_exhausted = true;
    }

    fn on_proved(&mut self, target: usize) {
        self.target_mut(target).proved = true;
    }

    fn on_stopped(&mut self, target: usize) {
        self.target_mut(target).stopped = true;
    }

    fn should_stop(&self, target: usize) -> bool {
        let Some(c) = self.targets.get(target) else {
            return false;
        };
        if c.space_exhausted || c.stopped {
            return true;
        }
        let over_expansions = self.limits.max_expansions.is_some_and(|max| c.expansions >= max);
        let over_time = self.limits.max_seconds.is_some_and(|max| c.elapsed.as_secs_f64() >= max);
        let over_memory = self.limits.max_memory.is_some_and(|max| c.peak_memory >= max);
        over_expansions || over_time || over_memory
    }

    fn counters(&self, target: usize) -> Option<&TargetCounters> {
        self.targets.get(target)
    }
}

// ============================================================================
// Progress-scaled budget
// ============================================================================

/// Per-target budget scaled by progress relative to the batch.
///
/// A target's scale is `1 + alpha * (iterations - mean) / max(mean, 1)`,
/// clamped to `[min_scale, max_scale]`, where `mean` is the mean number of
/// completed iterations across the batch. Targets that deepen faster than
/// their peers get more budget, stalled ones less. When a target is proved,
/// whatever it had left of its budget is split equally among the live
/// targets: those not proved, not out of search space, and not already over
/// their own budget. A target is over budget when its counters reach its
/// scaled base plus an equal share of the released pool among all targets
/// that have not been stopped.
#[derive(Debug, Clone)]
pub struct BasicStoppingStrategy {
    budget: BasicBudget,
    targets: Vec<TargetCounters>,
    released_expansions: f64,
    released_seconds: f64,
}

impl BasicStoppingStrategy {
    pub fn new(budget: BasicBudget) -> Self {
        Self {
            budget,
            targets: Vec::new(),
            released_expansions: 0.0,
            released_seconds: 0.0,
        }
    }

    fn target_mut(&mut self, target: usize) -> &mut TargetCounters {
        if target >= self.targets.len() {
            self.targets.resize(target + 1, TargetCounters::default());
        }
        &mut self.targets[target]
    }

    fn mean_iterations(&self) -> f64 {
        if self.targets.is_empty() {
            return 0.0;
        }
        let total: usize = self.targets.iter().map(|c| c.iterations).sum();
        total as f64 / self.targets.len() as f64
    }

    fn scale_with_mean(&self, target: usize, mean: f64) -> f64 {
        let iterations = self.targets.get(target).map_or(0, |c| c.iterations) as f64;
        let raw = 1.0 + self.budget.alpha * (iterations - mean) / mean.max(1.0);
        raw.clamp(self.budget.min_scale, self.budget.max_scale)
    }

    /// Progress multiplier of `target`
    pub fn scale(&self, target: usize) -> f64 {
        self.scale_with_mean(target, self.mean_iterations())
    }

    fn over(&self, target: usize, scale: f64, share_expansions: f64, share_seconds: f64) -> bool {
        let Some(c) = self.targets.get(target) else {
            return false;
        };
        c.expansions as f64 >= self.budget.base_expansions as f64 * scale + share_expansions
            || c.elapsed.as_secs_f64() >= self.budget.base_seconds * scale + share_seconds
    }

    /// Targets still entitled to a share of released budget
    fn live(&self) -> Vec<usize> {
        let claimants: Vec<usize> = (0..self.targets.len())
            .filter(|&t| {
                let c = &self.targets[t];
                !c.proved && !c.space_exhausted && !c.stopped
            })
            .collect();
        let n = claimants.len().max(1) as f64;
        let mean = self.mean_iterations();
        let (pool_expansions, pool_seconds) = (self.released_expansions / n, self.released_seconds / n);
        claimants
            .into_iter()
            .filter(|&t| !self.over(t, self.scale_with_mean(t, mean), pool_expansions, pool_seconds))
            .collect()
    }

    fn share(&self, pool: f64) -> f64 {
        match self.live().len() {
            0 => 0.0,
            n => pool / n as f64,
        }
    }

    /// Expansions `target` may spend
    pub fn expansion_budget(&self, target: usize) -> f64 {
        self.budget.base_expansions as f64 * self.scale(target) + self.share(self.released_expansions)
    }

    /// Seconds `target` may spend
    pub fn time_budget(&self, target: usize) -> f64 {
        self.budget.base_seconds * self.scale(target) + self.share(self.released_seconds)
    }
}

impl StoppingStrategy for BasicStoppingStrategy {
    fn reset(&mut self, num_targets: usize) {
        self.targets = vec![TargetCounters::default(); num_targets];
        self.released_expansions = 0.0;
        self.released_seconds = 0.0;
    }

    fn add(&mut self, target: usize, expansions: u64, elapsed: Duration, memory: usize) {
        self.target_mut(target).record(expansions, elapsed, memory);
    }

    fn on_iteration(&mut self, target: usize, depth: usize) {
        let c = self.target_mut(target);
        c.iterations += 1;
        c.depth = depth;
    }

    fn on_space_exhausted(&mut self, target: usize) {
        self.target_mut(target).space_exhausted = true;
    }

    fn on_proved(&mut self, target: usize) {
        if self.targets.get(target).is_some_and(|c| c.proved) {
            return;
        }
        let spare_expansions = (self.expansion_budget(target) - self.target_mut(target).expansions as f64).max(0.0);
        let spare_seconds = (self.time_budget(target) - self.target_mut(target).elapsed.as_secs_f64()).max(0.0);
        self.target_mut(target).proved = true;
        self.released_expansions += spare_expansions;
        self.released_seconds += spare_seconds;
        debug!(index = target, spare_expansions, spare_seconds, "budget released by proved target");
    }

    fn on_stopped(&mut self, target: usize) {
        self.target_mut(target).stopped = true;
    }

    fn should_stop(&self, target: usize) -> bool {
        let Some(c) = self.targets.get(target) else {
            return false;
        };
        c.space_exhausted || c.stopped || !self.live().contains(&target)
    }

    fn counters(&self, target: usize) -> Option<&TargetCounters> {
        self.targets.get(target)
    }
}
