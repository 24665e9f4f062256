//! Statistical heuristic
//!
//! A hidden Markov model over the sequence of head symbols rewritten along a
//! proof. Trained with Baum–Welch on persisted proofs, it scores partial
//! proof paths by how much they look like proofs seen before.

pub mod matrix;
pub mod model;
pub mod observations;
pub mod shared;
pub mod training;

use serde::{Deserialize, Serialize};

pub use matrix::Matrix;
pub use model::{ForwardPass, HmmModel, Observation};
pub use shared::SharedModel;
pub use training::{baum_welch, baum_welch_step, BaumWelchConfig, TrainingOutcome, TrainingStats};

/// Model shape and training parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmmSettings {
    /// Number of hidden states
    pub states: usize,
    /// Seed of the initial parameters
    pub seed: u64,
    pub training: BaumWelchConfig,
}

impl Default for HmmSettings {
    fn default() -> Self {
        Self {
            states: 4,
            seed: 0x5eed,
            training: BaumWelchConfig::default(),
        }
    }
}

impl HmmSettings {
    /// Untrained starting model for an alphabet of `symbols` letters
    pub fn initial_model(&self, symbols: usize) -> HmmModel {
        HmmModel::seeded(self.states, symbols, self.seed)
    }
}
