//! Search profiles
//!
//! A profile bundles everything one proof attempt needs to know: depth
//! bounds, the stopping strategy and its budget, the heuristic, and how the
//! owning process slices the work. Profiles are named; the name is what the
//! persistence layer records against each attempt.
//!
//! ```toml
//! [profiles.quick]
//! description = "Shallow search with a small fixed budget"
//! step_size = 50
//! max_steps = 4
//!
//! [profiles.quick.solver]
//! starting_depth = 2
//! max_depth = 5
//!
//! [profiles.quick.stopping]
//! kind = "fixed"
//! max_expansions = 20000
//!
//! [profiles.quick.helpers]
//! kind = "edit-distance"
//! load = 200
//! keep = 20
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AtpResult, ErrorCode};
use crate::atp_ensure;
use crate::logic::SuccessorOptions;
use super::selection::HelperSelection;

/// Depth bounds of iterative deepening
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Depth bound of the first iteration (at least 1)
    pub starting_depth: usize,
    /// Largest depth bound tried before a target is exhausted
    pub max_depth: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            starting_depth: 3,
            max_depth: 8,
        }
    }
}

/// Static per-target limits; `None` means unlimited
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FixedLimits {
    pub max_expansions: Option<u64>,
    pub max_seconds: Option<f64>,
    pub max_memory: Option<usize>,
}

/// Per-target base budget scaled by relative progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicBudget {
    pub base_expansions: u64,
    pub base_seconds: f64,
    /// Weight of a target's progress relative to the batch mean
    pub alpha: f64,
    pub min_scale: f64,
    pub max_scale: f64,
}

impl Default for BasicBudget {
    fn default() -> Self {
        Self {
            base_expansions: 50_000,
            base_seconds: 10.0,
            alpha: 0.5,
            min_scale: 0.25,
            max_scale: 4.0,
        }
    }
}

/// Which stopping strategy a profile uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StoppingSettings {
    Fixed(FixedLimits),
    Basic(BasicBudget),
}

impl Default for StoppingSettings {
    fn default() -> Self {
        StoppingSettings::Fixed(FixedLimits {
            max_expansions: Some(100_000),
            max_seconds: Some(30.0),
            max_memory: None,
        })
    }
}

/// How successors are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HeuristicKind {
    /// Enumeration order
    #[default]
    None,
    /// Prefer states whose sides are structurally closer
    SideDistance,
    /// Prefer paths the trained model finds likely
    Hmm,
}

impl HeuristicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeuristicKind::None => "none",
            HeuristicKind::SideDistance => "side-distance",
            HeuristicKind::Hmm => "hmm",
        }
    }
}

/// A named search profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub name: String,
    pub description: String,
    pub solver: SolverSettings,
    pub stopping: StoppingSettings,
    pub heuristic: HeuristicKind,
    /// Solver ticks per process advance
    pub step_size: usize,
    /// Process advances spent searching before giving up
    pub max_steps: usize,
    /// Seed for rule-order randomisation
    pub seed: Option<u64>,
    /// Shuffle rule order per position
    pub randomise: bool,
    /// Drop canonically identical siblings
    pub dedup: bool,
    /// Successors pulled and ranked at once when a heuristic is active
    pub window: usize,
    /// Stored theorems added to the kernel before searching
    pub helpers: HelperSelection,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: "Iterative deepening in enumeration order with a fixed budget".to_string(),
            solver: SolverSettings::default(),
            stopping: StoppingSettings::default(),
            heuristic: HeuristicKind::None,
            step_size: 100,
            max_steps: 10,
            seed: None,
            randomise: false,
            dedup: true,
            window: 32,
            helpers: HelperSelection::default(),
        }
    }
}

impl SearchSettings {
    /// Named profile with default values
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_depths(mut self, starting_depth: usize, max_depth: usize) -> Self {
        self.solver = SolverSettings { starting_depth, max_depth };
        self
    }

    pub fn with_stopping(mut self, stopping: StoppingSettings) -> Self {
        self.stopping = stopping;
        self
    }

    pub fn with_heuristic(mut self, heuristic: HeuristicKind) -> Self {
        self.heuristic = heuristic;
        self
    }

    pub fn with_steps(mut self, step_size: usize, max_steps: usize) -> Self {
        self.step_size = step_size;
        self.max_steps = max_steps;
        self
    }

    pub fn with_helpers(mut self, helpers: HelperSelection) -> Self {
        self.helpers = helpers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self.randomise = true;
        self
    }

    /// Built-in profiles, available without a config file
    pub fn builtin_profiles() -> Vec<SearchSettings> {
        vec![
            SearchSettings::default(),
            SearchSettings::named("fixed")
                .with_description("Deep iterative deepening with a large fixed expansion budget")
                .with_depths(3, 10)
                .with_stopping(StoppingSettings::Fixed(FixedLimits {
                    max_expansions: Some(1_000_000),
                    max_seconds: Some(120.0),
                    max_memory: None,
                }))
                .with_steps(500, 200),
            SearchSettings::named("basic")
                .with_description("Budget shared across the batch according to progress")
                .with_stopping(StoppingSettings::Basic(BasicBudget::default()))
                .with_steps(200, 50),
            SearchSettings::named("hmm")
                .with_description("Best-first within the depth bound, ranked by the trained model")
                .with_stopping(StoppingSettings::Basic(BasicBudget::default()))
                .with_heuristic(HeuristicKind::Hmm)
                .with_steps(200, 50),
        ]
    }

    pub fn builtin(name: &str) -> Option<SearchSettings> {
        Self::builtin_profiles().into_iter().find(|p| p.name == name)
    }

    /// Check bounds are usable
    pub fn validate(&self) -> AtpResult<()> {
        atp_ensure!(!self.name.trim().is_empty(), ErrorCode::InvalidSettings, "profile name cannot be empty");
        atp_ensure!(
            self.solver.starting_depth >= 1,
            ErrorCode::InvalidSettings,
            "profile '{}': starting_depth must be at least 1",
            self.name
        );
        atp_ensure!(
            self.solver.max_depth >= self.solver.starting_depth,
            ErrorCode::InvalidSettings,
            "profile '{}': max_depth {} is below starting_depth {}",
            self.name,
            self.solver.max_depth,
            self.solver.starting_depth
        );
        atp_ensure!(self.step_size >= 1, ErrorCode::InvalidSettings, "profile '{}': step_size must be at least 1", self.name);
        atp_ensure!(self.max_steps >= 1, ErrorCode::InvalidSettings, "profile '{}': max_steps must be at least 1", self.name);
        atp_ensure!(self.window >= 1, ErrorCode::InvalidSettings, "profile '{}': window must be at least 1", self.name);
        match &self.stopping {
            StoppingSettings::Fixed(f) => {
                if let Some(seconds) = f.max_seconds {
                    atp_ensure!(
                        seconds.is_finite() && seconds > 0.0,
                        ErrorCode::InvalidSettings,
                        "profile '{}': max_seconds {} must be a positive number",
                        self.name,
                        seconds
                    );
                }
            }
            StoppingSettings::Basic(b) => self.validate_budget(b)?,
        }
        if let HelperSelection::EditDistance(e) = &self.helpers {
            atp_ensure!(
                e.weighting.is_finite() && e.weighting > 0.0,
                ErrorCode::InvalidSettings,
                "profile '{}': helper weighting {} must be a positive number",
                self.name,
                e.weighting
            );
            atp_ensure!(
                e.match_benefit.is_finite() && e.mismatch_cost.is_finite(),
                ErrorCode::InvalidSettings,
                "profile '{}': helper edit costs must be finite",
                self.name
            );
        }
        Ok(())
    }

    // NaN or infinite values would make `should_stop` never fire, and
    // `f64::clamp` needs min <= max
    fn validate_budget(&self, b: &BasicBudget) -> AtpResult<()> {
        atp_ensure!(
            b.base_expansions >= 1,
            ErrorCode::InvalidSettings,
            "profile '{}': base_expansions must be at least 1",
            self.name
        );
        atp_ensure!(
            b.base_seconds.is_finite() && b.base_seconds > 0.0,
            ErrorCode::InvalidSettings,
            "profile '{}': base_seconds {} must be a positive number",
            self.name,
            b.base_seconds
        );
        atp_ensure!(
            b.alpha.is_finite() && b.alpha >= 0.0,
            ErrorCode::InvalidSettings,
            "profile '{}': alpha {} must be a non-negative number",
            self.name,
            b.alpha
        );
        atp_ensure!(
            b.min_scale.is_finite() && b.max_scale.is_finite() && b.min_scale > 0.0 && b.min_scale <= b.max_scale,
            ErrorCode::InvalidSettings,
            "profile '{}': scale bounds must satisfy 0 < min_scale <= max_scale",
            self.name
        );
        Ok(())
    }

    /// Successor stream options derived from this profile
    pub fn successor_options(&self) -> SuccessorOptions {
        SuccessorOptions {
            dedup: self.dedup,
            shuffle_seed: if self.randomise { Some(self.seed.unwrap_or(0)) } else { None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::selection::EditDistanceSelection;

    #[test]
    fn test_defaults() {
        let s = SearchSettings::default();
        assert_eq!(s.solver.starting_depth, 3);
        assert_eq!(s.solver.max_depth, 8);
        assert!(s.validate().is_ok());
        assert_eq!(s.successor_options(), SuccessorOptions { dedup: true, shuffle_seed: None });
    }

    #[test]
    fn test_builtin_profiles_valid() {
        let names: Vec<String> = SearchSettings::builtin_profiles().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["default", "fixed", "basic", "hmm"]);
        for p in SearchSettings::builtin_profiles() {
            p.validate().unwrap();
        }
        assert_eq!(SearchSettings::builtin("hmm").unwrap().heuristic, HeuristicKind::Hmm);
        assert!(SearchSettings::builtin("nope").is_none());
    }

    #[test]
    fn test_validate_rejects_bad_depths() {
        let err = SearchSettings::default().with_depths(0, 4).validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSettings);
        let err = SearchSettings::default().with_depths(5, 4).validate().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidSettings);
    }

    fn basic(budget: BasicBudget) -> SearchSettings {
        SearchSettings::named("b").with_stopping(StoppingSettings::Basic(budget))
    }

    #[test]
    fn test_validate_rejects_bad_budgets() {
        let bad = [
            BasicBudget { alpha: f64::NAN, ..BasicBudget::default() },
            BasicBudget { alpha: -0.5, ..BasicBudget::default() },
            BasicBudget { base_seconds: f64::INFINITY, ..BasicBudget::default() },
            BasicBudget { base_seconds: -1.0, ..BasicBudget::default() },
            BasicBudget { base_expansions: 0, ..BasicBudget::default() },
            BasicBudget { min_scale: 2.0, max_scale: 1.0, ..BasicBudget::default() },
            BasicBudget { min_scale: f64::NAN, ..BasicBudget::default() },
            BasicBudget { max_scale: f64::INFINITY, ..BasicBudget::default() },
            BasicBudget { min_scale: 0.0, ..BasicBudget::default() },
        ];
        for budget in bad {
            let err = basic(budget.clone()).validate().unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidSettings, "{:?}", budget);
        }
        assert!(basic(BasicBudget { alpha: 0.0, min_scale: 1.0, max_scale: 1.0, ..BasicBudget::default() })
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let fixed = |max_seconds| {
            SearchSettings::named("f").with_stopping(StoppingSettings::Fixed(FixedLimits {
                max_seconds: Some(max_seconds),
                ..FixedLimits::default()
            }))
        };
        assert!(fixed(f64::NAN).validate().is_err());
        assert!(fixed(0.0).validate().is_err());
        assert!(fixed(1.5).validate().is_ok());
        assert!(SearchSettings::default().with_steps(10, 0).validate().is_err());

        let edit = SearchSettings::default().with_helpers(HelperSelection::EditDistance(EditDistanceSelection {
            weighting: 0.0,
            ..EditDistanceSelection::default()
        }));
        assert_eq!(edit.validate().unwrap_err().code, ErrorCode::InvalidSettings);
    }

    #[test]
    fn test_parse_tagged_stopping() {
        let toml = r#"
            name = "quick"
            step_size = 10

            [solver]
            starting_depth = 2

            [stopping]
            kind = "basic"
            base_expansions = 500
        "#;
        let s: SearchSettings = toml::from_str(toml).unwrap();
        assert_eq!(s.solver.starting_depth, 2);
        assert_eq!(s.solver.max_depth, 8);
        match s.stopping {
            StoppingSettings::Basic(b) => {
                assert_eq!(b.base_expansions, 500);
                assert_eq!(b.alpha, 0.5);
            }
            other => panic!("unexpected stopping {:?}", other),
        }
    }

    #[test]
    fn test_seed_enables_shuffle() {
        let s = SearchSettings::default().with_seed(9);
        assert_eq!(s.successor_options().shuffle_seed, Some(9));
    }
}
