//! Baum–Welch re-estimation
//!
//! One epoch accumulates expected initial, transition and emission counts
//! over every sequence of the corpus, adds the smoothing constant to each
//! count, renormalises the rows, and blends the estimate into the previous
//! parameters:
//!
//! ```text
//! new = (1 - decay) * old + decay * estimate
//! ```
//!
//! With `decay = 1` this is plain EM. Training is deterministic for a given
//! corpus, starting model and configuration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AtpError, AtpResult};
use super::matrix::{normalize, Matrix};
use super::model::{HmmModel, Observation};

/// Training parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaumWelchConfig {
    /// Maximum number of epochs
    pub epochs: usize,
    /// Pseudo-count added to every expected count
    pub smoothing: f64,
    /// Weight of the new estimate against the previous parameters
    pub decay: f64,
    /// Stop once an epoch improves the corpus log-likelihood by less than this
    pub tolerance: f64,
}

impl Default for BaumWelchConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            smoothing: 0.01,
            decay: 0.8,
            tolerance: 1e-6,
        }
    }
}

impl BaumWelchConfig {
    pub fn validate(&self) -> AtpResult<()> {
        if !(self.smoothing >= 0.0 && self.smoothing.is_finite()) {
            return Err(AtpError::invalid_model(format!("smoothing {} must be non-negative", self.smoothing)));
        }
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(AtpError::invalid_model(format!("decay {} must be in (0, 1]", self.decay)));
        }
        Ok(())
    }
}

/// Per-run training statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingStats {
    pub epochs: usize,
    /// Corpus log-likelihood under the model each epoch started from
    pub log_likelihoods: Vec<f64>,
    pub converged: bool,
}

/// Result of [`baum_welch`]
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: HmmModel,
    pub stats: TrainingStats,
}

struct Counts {
    initial: Vec<f64>,
    transition: Matrix,
    emission: Matrix,
}

impl Counts {
    fn new(states: usize, symbols: usize) -> Self {
        Counts {
            initial: vec![0.0; states],
            transition: Matrix::zeros(states, states),
            emission: Matrix::zeros(states, symbols),
        }
    }

    fn into_estimate(mut self, smoothing: f64) -> (Vec<f64>, Matrix, Matrix) {
        let states = self.initial.len();
        self.initial.iter_mut().for_each(|c| *c += smoothing);
        normalize(&mut self.initial, states);
        for m in [&mut self.transition, &mut self.emission] {
            for r in 0..m.rows() {
                m.row_mut(r).iter_mut().for_each(|c| *c += smoothing);
            }
            m.normalize_rows();
        }
        (self.initial, self.transition, self.emission)
    }
}

/// One epoch over `corpus`.
///
/// Returns the updated model and the corpus log-likelihood under `model`.
pub fn baum_welch_step(
    model: &HmmModel,
    corpus: &[Vec<Observation>],
    config: &BaumWelchConfig,
) -> AtpResult<(HmmModel, f64)> {
    config.validate()?;
    let n = model.num_states();
    let mut counts = Counts::new(n, model.num_symbols());
    let mut total_ll = 0.0;

    for seq in corpus.iter().filter(|s| !s.is_empty()) {
        let fwd = model.forward(seq)?;
        let beta = model.backward(seq, &fwd.scales)?;
        total_ll += fwd.log_likelihood();

        for (t, &obs) in seq.iter().enumerate() {
            let mut gamma: Vec<f64> = (0..n).map(|i| fwd.alpha.get(t, i) * beta.get(t, i)).collect();
            normalize(&mut gamma, n);
            for (i, g) in gamma.iter().enumerate() {
                if t == 0 {
                    counts.initial[i] += g;
                }
                counts.emission.add_to(i, obs, *g);
            }

            if let Some(&next) = seq.get(t + 1) {
                let scale = fwd.scales[t + 1];
                for i in 0..n {
                    for j in 0..n {
                        let xi = fwd.alpha.get(t, i)
                            * model.transition().get(i, j)
                            * model.emission().get(j, next)
                            * beta.get(t + 1, j)
                            / scale;
                        counts.transition.add_to(i, j, xi);
                    }
                }
            }
        }
    }

    let (initial, transition, emission) = counts.into_estimate(config.smoothing);
    let mut initial: Vec<f64> = model
        .initial()
        .iter()
        .zip(&initial)
        .map(|(old, new)| (1.0 - config.decay) * old + config.decay * new)
        .collect();
    normalize(&mut initial, n);
    let mut transition = model
        .transition()
        .blend(&transition, config.decay)
        .ok_or_else(|| AtpError::invalid_model("transition shape changed during training"))?;
    transition.normalize_rows();
    let mut emission = model
        .emission()
        .blend(&emission, config.decay)
        .ok_or_else(|| AtpError::invalid_model("emission shape changed during training"))?;
    emission.normalize_rows();

    Ok((HmmModel::new(initial, transition, emission)?, total_ll))
}

/// Train until `epochs` or convergence.
///
/// A corpus with no observations yields the smoothed-uniform model.
pub fn baum_welch(
    model: &HmmModel,
    corpus: &[Vec<Observation>],
    config: &BaumWelchConfig,
) -> AtpResult<TrainingOutcome> {
    config.validate()?;
    let mut stats = TrainingStats::default();
    if corpus.iter().all(Vec::is_empty) {
        return Ok(TrainingOutcome {
            model: HmmModel::uniform(model.num_states(), model.num_symbols()),
            stats,
        });
    }

    let mut current = model.clone();
    for epoch in 0..config.epochs {
        let (next, ll) = baum_welch_step(&current, corpus, config)?;
        let improvement = stats.log_likelihoods.last().map(|prev| ll - prev);
        stats.log_likelihoods.push(ll);
        stats.epochs = epoch + 1;
        current = next;
        debug!(epoch, log_likelihood = ll, "baum-welch epoch");
        if improvement.is_some_and(|d| d.abs() < config.tolerance) {
            stats.converged = true;
            break;
        }
    }
    Ok(TrainingOutcome { model: current, stats })
}
