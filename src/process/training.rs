//! Heuristic training process
//!
//! Refits the HMM of a context on its stored proofs, one Baum–Welch epoch
//! per advance, then persists the result and swaps it into the shared
//! snapshot so searches started afterwards score with it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AtpError, AtpResult};
use crate::hmm::{baum_welch_step, observations, HmmModel, HmmSettings, Observation, SharedModel, TrainingStats};
use crate::logic::ModelContext;
use crate::store::{ContextId, TheoremStore};
use super::Process;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    LoadCorpus,
    Training,
    Publish,
    Done,
}

pub struct TrainHmmProcess {
    store: Arc<TheoremStore>,
    context: Arc<ModelContext>,
    shared: Arc<SharedModel>,
    settings: HmmSettings,
    phase: TrainingPhase,
    context_id: Option<ContextId>,
    corpus: Vec<Vec<Observation>>,
    model: Option<HmmModel>,
    stats: TrainingStats,
    published: Option<u64>,
}

impl TrainHmmProcess {
    pub fn new(
        store: Arc<TheoremStore>,
        context: Arc<ModelContext>,
        shared: Arc<SharedModel>,
        settings: HmmSettings,
    ) -> Self {
        TrainHmmProcess {
            store,
            context,
            shared,
            settings,
            phase: TrainingPhase::LoadCorpus,
            context_id: None,
            corpus: Vec::new(),
            model: None,
            stats: TrainingStats::default(),
            published: None,
        }
    }

    pub fn phase(&self) -> TrainingPhase {
        self.phase
    }

    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    /// Snapshot version the trained model was published as
    pub fn published_version(&self) -> Option<u64> {
        self.published
    }

    fn load_corpus(&mut self) -> AtpResult<()> {
        self.settings.training.validate()?;
        let ctx_id = self.store.ensure_context(self.context.name())?;
        let records = self.store.training_corpus(ctx_id)?;
        self.corpus = observations::corpus_from_records(&records, &self.context);

        let symbols = observations::alphabet_size(&self.context);
        let start = match self.store.load_hmm(ctx_id)? {
            Some(m) if m.num_symbols() == symbols => m,
            Some(m) => {
                warn!(stored = m.num_symbols(), expected = symbols, "stored model has the wrong alphabet; starting fresh");
                self.settings.initial_model(symbols)
            }
            None => self.settings.initial_model(symbols),
        };
        debug!(proofs = records.len(), sequences = self.corpus.len(), "training corpus loaded");

        self.model = Some(if self.corpus.is_empty() {
            HmmModel::uniform(start.num_states(), symbols)
        } else {
            start
        });
        self.context_id = Some(ctx_id);
        Ok(())
    }

    /// One epoch; returns whether training is over
    fn train_epoch(&mut self) -> AtpResult<bool> {
        let config = &self.settings.training;
        if self.corpus.is_empty() || self.stats.epochs >= config.epochs {
            return Ok(true);
        }
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AtpError::internal("training without a starting model"))?;
        let (next, ll) = baum_welch_step(model, &self.corpus, config)?;
        let improvement = self.stats.log_likelihoods.last().map(|prev| ll - prev);
        self.stats.log_likelihoods.push(ll);
        self.stats.epochs += 1;
        self.model = Some(next);
        debug!(epoch = self.stats.epochs, log_likelihood = ll, "baum-welch epoch");

        if improvement.is_some_and(|d| d.abs() < config.tolerance) {
            self.stats.converged = true;
        }
        Ok(self.stats.converged || self.stats.epochs >= config.epochs)
    }

    fn publish(&mut self) -> AtpResult<()> {
        let (Some(ctx_id), Some(model)) = (self.context_id, self.model.take()) else {
            return Err(AtpError::internal("publishing before the corpus was loaded"));
        };
        let row = self.store.save_hmm(ctx_id, &model)?;
        let version = self.shared.publish(model);
        info!(
            context = self.context.name(),
            model = row,
            version,
            epochs = self.stats.epochs,
            "heuristic model published"
        );
        self.published = Some(version);
        Ok(())
    }
}

impl Process for TrainHmmProcess {
    fn name(&self) -> String {
        format!("train-hmm[{}]", self.context.name())
    }

    fn advance(&mut self) -> AtpResult<bool> {
        match self.phase {
            TrainingPhase::LoadCorpus => {
                self.load_corpus()?;
                self.phase = TrainingPhase::Training;
            }
            TrainingPhase::Training => {
                if self.train_epoch()? {
                    self.phase = TrainingPhase::Publish;
                }
            }
            TrainingPhase::Publish => {
                self.publish()?;
                self.phase = TrainingPhase::Done;
            }
            TrainingPhase::Done => {}
        }
        Ok(self.phase == TrainingPhase::Done)
    }

    fn summary(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "HMM training finished: {} epoch(s) over {} proof(s){}.",
            self.stats.epochs,
            self.corpus.len(),
            if self.stats.converged { ", converged" } else { "" }
        )];
        if let Some(ll) = self.stats.log_likelihoods.last() {
            lines.push(format!("Final corpus log-likelihood: {:.4}", ll));
        }
        if let Some(version) = self.published {
            lines.push(format!("Published as model version {}", version));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hmm::BaumWelchConfig;
    use crate::logic::fixtures::group_theory;
    use crate::logic::KnowledgeKernel;
    use crate::store::statement_key;

    fn run(process: &mut TrainHmmProcess) {
        for _ in 0..100 {
            if process.advance().unwrap() {
                return;
            }
        }
        panic!("training did not finish");
    }

    fn settings() -> HmmSettings {
        HmmSettings {
            states: 2,
            seed: 3,
            training: BaumWelchConfig { epochs: 5, ..BaumWelchConfig::default() },
        }
    }

    fn store_some_proofs(store: &TheoremStore, ctx: &Arc<ModelContext>) {
        let kernel = KnowledgeKernel::new(ctx.clone());
        let ctx_id = store.ensure_context(ctx.name()).unwrap();
        for text in ["*(e, e) = e", "*(i(e), e) = i(e)"] {
            let target = ctx.parse_statement(text).unwrap();
            let root = kernel.begin_proof_of(&target);
            let child = kernel.successors(&root, None).next().unwrap();
            let id = store.ensure_theorem(ctx_id, &statement_key(&target, ctx)).unwrap();
            store.record_proof(id, &child.to_record(&kernel), false).unwrap();
        }
    }

    #[test]
    fn test_trains_and_publishes() {
        let store = Arc::new(TheoremStore::in_memory().unwrap());
        let ctx = Arc::new(group_theory());
        store_some_proofs(&store, &ctx);
        let symbols = observations::alphabet_size(&ctx);
        let shared = Arc::new(SharedModel::new(HmmModel::uniform(2, symbols)));

        let mut process = TrainHmmProcess::new(store.clone(), ctx.clone(), shared.clone(), settings());
        run(&mut process);

        assert_eq!(process.phase(), TrainingPhase::Done);
        assert!(process.stats().epochs >= 1 && process.stats().epochs <= 5);
        assert_eq!(process.published_version(), Some(shared.version()));
        assert_eq!(shared.version(), 1);
        assert!(shared.snapshot().is_row_stochastic());

        let ctx_id = store.context_id(ctx.name()).unwrap().unwrap();
        let stored = store.load_hmm(ctx_id).unwrap().unwrap();
        assert_eq!(stored.num_symbols(), symbols);
        assert!(process.summary()[0].contains("over 2 proof(s)"));
    }

    #[test]
    fn test_empty_corpus_publishes_uniform() {
        let store = Arc::new(TheoremStore::in_memory().unwrap());
        let ctx = Arc::new(group_theory());
        let symbols = observations::alphabet_size(&ctx);
        let shared = Arc::new(SharedModel::new(HmmModel::seeded(2, symbols, 9)));

        let mut process = TrainHmmProcess::new(store, ctx, shared.clone(), settings());
        run(&mut process);

        assert_eq!(process.stats().epochs, 0);
        assert_eq!(*shared.snapshot(), HmmModel::uniform(2, symbols));
    }

    #[test]
    fn test_invalid_training_config_fails() {
        let store = Arc::new(TheoremStore::in_memory().unwrap());
        let ctx = Arc::new(group_theory());
        let shared = Arc::new(SharedModel::new(HmmModel::uniform(2, observations::alphabet_size(&ctx))));
        let mut bad = settings();
        bad.training.decay = 0.0;

        let mut process = TrainHmmProcess::new(store, ctx, shared, bad);
        assert!(process.advance().is_err());
    }
}
