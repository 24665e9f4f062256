//! Hidden Markov model with scaled forward/backward passes
//!
//! Probabilities are kept in linear space; each forward step is rescaled to
//! sum to one and the scale factors are kept, so long sequences neither
//! underflow nor need log arithmetic. The log-likelihood of a sequence is
//! the sum of the logs of its scale factors.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AtpError, AtpResult};
use super::matrix::{is_distribution, normalize, Matrix};

/// Observation symbol index
pub type Observation = usize;

/// Initial, transition and emission parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawHmmModel")]
pub struct HmmModel {
    initial: Vec<f64>,
    transition: Matrix,
    emission: Matrix,
}

/// Serialized parameters; deserializing goes through [`HmmModel::new`]
#[derive(Deserialize)]
struct RawHmmModel {
    initial: Vec<f64>,
    transition: Matrix,
    emission: Matrix,
}

impl TryFrom<RawHmmModel> for HmmModel {
    type Error = AtpError;

    fn try_from(raw: RawHmmModel) -> AtpResult<Self> {
        HmmModel::new(raw.initial, raw.transition, raw.emission)
    }
}

/// Scaled forward probabilities of one sequence
#[derive(Debug, Clone)]
pub struct ForwardPass {
    /// `alpha[t][i]`, each row scaled to sum to one
    pub alpha: Matrix,
    /// Scale factor applied at each step
    pub scales: Vec<f64>,
}

impl ForwardPass {
    pub fn log_likelihood(&self) -> f64 {
        self.scales.iter().map(|c| c.ln()).sum()
    }
}

impl HmmModel {
    /// Validated model; every distribution must be row-stochastic
    pub fn new(initial: Vec<f64>, transition: Matrix, emission: Matrix) -> AtpResult<Self> {
        let states = initial.len();
        if states == 0 {
            return Err(AtpError::invalid_model("model needs at least one hidden state"));
        }
        if transition.rows() != states || transition.cols() != states {
            return Err(AtpError::invalid_model(format!(
                "transition matrix is {}x{}, expected {}x{}",
                transition.rows(),
                transition.cols(),
                states,
                states
            )));
        }
        if emission.rows() != states || emission.cols() == 0 {
            return Err(AtpError::invalid_model(format!(
                "emission matrix is {}x{}, expected {} rows and at least one symbol",
                emission.rows(),
                emission.cols(),
                states
            )));
        }
        if !is_distribution(&initial) || !transition.is_row_stochastic() || !emission.is_row_stochastic() {
            return Err(AtpError::invalid_model("model parameters are not row-stochastic"));
        }
        Ok(HmmModel { initial, transition, emission })
    }

    /// Every distribution uniform
    pub fn uniform(states: usize, symbols: usize) -> Self {
        let states = states.max(1);
        let symbols = symbols.max(1);
        HmmModel {
            initial: vec![1.0 / states as f64; states],
            transition: Matrix::uniform(states, states),
            emission: Matrix::uniform(states, symbols),
        }
    }

    /// Deterministic random starting point for training.
    ///
    /// Entries are drawn from `[0.5, 1.5)` before normalisation, so no
    /// probability starts near zero and the states are not symmetric.
    pub fn seeded(states: usize, symbols: usize, seed: u64) -> Self {
        let states = states.max(1);
        let symbols = symbols.max(1);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut draw = |len: usize| -> Vec<f64> {
            let mut row: Vec<f64> = (0..len).map(|_| 0.5 + rng.random::<f64>()).collect();
            normalize(&mut row, len);
            row
        };

        let initial = draw(states);
        let mut transition = Matrix::zeros(states, states);
        for i in 0..states {
            transition.row_mut(i).copy_from_slice(&draw(states));
        }
        let mut emission = Matrix::zeros(states, symbols);
        for i in 0..states {
            emission.row_mut(i).copy_from_slice(&draw(symbols));
        }
        HmmModel { initial, transition, emission }
    }

    pub fn num_states(&self) -> usize {
        self.initial.len()
    }

    pub fn num_symbols(&self) -> usize {
        self.emission.cols()
    }

    pub fn initial(&self) -> &[f64] {
        &self.initial
    }

    pub fn transition(&self) -> &Matrix {
        &self.transition
    }

    pub fn emission(&self) -> &Matrix {
        &self.emission
    }

    pub fn is_row_stochastic(&self) -> bool {
        is_distribution(&self.initial) && self.transition.is_row_stochastic() && self.emission.is_row_stochastic()
    }

    fn check_observations(&self, observations: &[Observation]) -> AtpResult<()> {
        match observations.iter().find(|&&o| o >= self.num_symbols()) {
            Some(bad) => Err(AtpError::invalid_model(format!(
                "observation {} outside alphabet of {} symbols",
                bad,
                self.num_symbols()
            ))),
            None => Ok(()),
        }
    }

    /// Scaled forward pass
    pub fn forward(&self, observations: &[Observation]) -> AtpResult<ForwardPass> {
        self.check_observations(observations)?;
        let n = self.num_states();
        let t_len = observations.len();
        let mut alpha = Matrix::zeros(t_len, n);
        let mut scales = Vec::with_capacity(t_len);

        for (t, &obs) in observations.iter().enumerate() {
            for j in 0..n {
                let prior = if t == 0 {
                    self.initial[j]
                } else {
                    (0..n).map(|i| alpha.get(t - 1, i) * self.transition.get(i, j)).sum()
                };
                alpha.set(t, j, prior * self.emission.get(j, obs));
            }
            let scale: f64 = alpha.row(t).iter().sum();
            let scale = if scale > 0.0 { scale } else { f64::MIN_POSITIVE };
            alpha.row_mut(t).iter_mut().for_each(|a| *a /= scale);
            scales.push(scale);
        }
        Ok(ForwardPass { alpha, scales })
    }

    /// Backward pass scaled with the factors of the matching forward pass
    pub fn backward(&self, observations: &[Observation], scales: &[f64]) -> AtpResult<Matrix> {
        self.check_observations(observations)?;
        if scales.len() != observations.len() {
            return Err(AtpError::invalid_model("scale factors do not match the sequence length"));
        }
        let n = self.num_states();
        let t_len = observations.len();
        let mut beta = Matrix::zeros(t_len, n);
        if t_len == 0 {
            return Ok(beta);
        }

        beta.row_mut(t_len - 1).iter_mut().for_each(|b| *b = 1.0);
        for t in (0..t_len - 1).rev() {
            let next = observations[t + 1];
            for i in 0..n {
                let sum: f64 = (0..n)
                    .map(|j| self.transition.get(i, j) * self.emission.get(j, next) * beta.get(t + 1, j))
                    .sum();
                beta.set(t, i, sum / scales[t + 1]);
            }
        }
        Ok(beta)
    }

    /// `ln P(observations | model)`; zero for the empty sequence
    pub fn log_likelihood(&self, observations: &[Observation]) -> AtpResult<f64> {
        Ok(self.forward(observations)?.log_likelihood())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn two_state() -> HmmModel {
        HmmModel::new(
            vec![0.6, 0.4],
            Matrix::from_rows(vec![vec![0.7, 0.3], vec![0.4, 0.6]]).unwrap(),
            Matrix::from_rows(vec![vec![0.5, 0.4, 0.1], vec![0.1, 0.3, 0.6]]).unwrap(),
        )
        .unwrap()
    }

    /// Sum over all hidden paths, for checking the recursions
    fn brute_force(model: &HmmModel, obs: &[usize]) -> f64 {
        let n = model.num_states();
        let paths = n.pow(obs.len() as u32);
        (0..paths)
            .map(|mut code| {
                let mut states = Vec::new();
                for _ in 0..obs.len() {
                    states.push(code % n);
                    code /= n;
                }
                let mut p = model.initial()[states[0]] * model.emission().get(states[0], obs[0]);
                for t in 1..obs.len() {
                    p *= model.transition().get(states[t - 1], states[t]) * model.emission().get(states[t], obs[t]);
                }
                p
            })
            .sum()
    }

    #[test]
    fn test_forward_matches_brute_force() {
        let m = two_state();
        let obs = [0, 2, 1, 2];
        let ll = m.log_likelihood(&obs).unwrap();
        assert!((ll - brute_force(&m, &obs).ln()).abs() < 1e-9);
    }

    #[test]
    fn test_backward_consistent_with_forward() {
        let m = two_state();
        let obs = [1, 0, 2];
        let fwd = m.forward(&obs).unwrap();
        let beta = m.backward(&obs, &fwd.scales).unwrap();
        // with this scaling, sum_i alpha_t(i) * beta_t(i) is 1 at every t
        for t in 0..obs.len() {
            let s: f64 = (0..2).map(|i| fwd.alpha.get(t, i) * beta.get(t, i)).sum();
            assert!((s - 1.0).abs() < 1e-9, "t = {}: {}", t, s);
        }
    }

    #[test]
    fn test_empty_sequence() {
        let m = two_state();
        assert_eq!(m.log_likelihood(&[]).unwrap(), 0.0);
        assert_eq!(m.backward(&[], &[]).unwrap().rows(), 0);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        let err = HmmModel::new(vec![0.5, 0.6], Matrix::uniform(2, 2), Matrix::uniform(2, 3)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidModel);
        let err = HmmModel::new(vec![0.5, 0.5], Matrix::uniform(3, 3), Matrix::uniform(2, 3)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidModel);
        let err = two_state().log_likelihood(&[3]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidModel);
    }

    #[test]
    fn test_deserialize_validates_parameters() {
        let m = two_state();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(serde_json::from_str::<HmmModel>(&json).unwrap(), m);

        let not_stochastic = json.replacen("0.6", "0.9", 1);
        let err = serde_json::from_str::<HmmModel>(&not_stochastic).unwrap_err();
        assert!(err.to_string().contains("row-stochastic"), "{}", err);

        let ragged = r#"{"initial":[1.0],"transition":{"rows":1,"cols":1,"data":[1.0]},
            "emission":{"rows":1,"cols":2,"data":[1.0]}}"#;
        let err = serde_json::from_str::<HmmModel>(ragged).unwrap_err();
        assert!(err.to_string().contains("holds 1 entries"), "{}", err);
    }

    #[test]
    fn test_seeded_is_deterministic_and_stochastic() {
        let a = HmmModel::seeded(3, 5, 42);
        let b = HmmModel::seeded(3, 5, 42);
        assert_eq!(a, b);
        assert!(a.is_row_stochastic());
        assert_ne!(a, HmmModel::seeded(3, 5, 43));
    }
}
