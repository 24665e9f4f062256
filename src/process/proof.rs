//! Proof process
//!
//! Proves a batch of statements in one context with one search profile:
//! seeds a kernel snapshot with stored theorems, runs the solver in slices,
//! then commits every attempt, proof and theorem usage as one batch and makes
//! the new theorems visible to later processes.
//!
//! An internal fault in the solver ends the whole attempt: every target not
//! yet decided is reported as aborted, what was found is still committed,
//! and the process then fails with the solver's error.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{AtpError, AtpResult};
use crate::hmm::{observations, HmmSettings, SharedModel};
use crate::logic::{KnowledgeKernel, ProofRecord, ProofState, RuleId, SharedKernel, Statement};
use crate::search::{
    Heuristic, HeuristicKind, HmmHeuristic, IterativeDeepeningSolver, ProofStatus, SearchSettings, SearchStats,
    SideDistanceHeuristic, Solver,
};
use crate::store::{
    statement_key, AttemptBatch, AttemptRecord, ContextId, ProofEntry, SettingsId, TheoremId, TheoremStore,
    UsageRecord,
};
use super::Process;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofPhase {
    LoadKernel,
    Searching,
    SaveResults,
    Done,
}

/// Final state of one target
#[derive(Debug, Clone)]
pub struct TargetResult {
    pub statement: Statement,
    /// Canonical text the theorem is stored under
    pub key: String,
    pub status: ProofStatus,
    pub stats: SearchStats,
    pub proof: Option<ProofRecord>,
}

struct Ids {
    context: ContextId,
    settings: SettingsId,
    targets: Vec<TheoremId>,
}

pub struct ProofProcess {
    store: Arc<TheoremStore>,
    kernel: SharedKernel,
    model: Option<Arc<SharedModel>>,
    hmm: HmmSettings,
    settings: SearchSettings,
    targets: Vec<Statement>,
    phase: ProofPhase,
    ids: Option<Ids>,
    snapshot: Option<KnowledgeKernel>,
    solver: Option<Box<dyn Solver>>,
    steps_taken: usize,
    results: Vec<TargetResult>,
    failure: Option<AtpError>,
}

impl ProofProcess {
    pub fn new(
        store: Arc<TheoremStore>,
        kernel: SharedKernel,
        settings: SearchSettings,
        targets: Vec<Statement>,
    ) -> Self {
        ProofProcess {
            store,
            kernel,
            model: None,
            hmm: HmmSettings::default(),
            settings,
            targets,
            phase: ProofPhase::LoadKernel,
            ids: None,
            snapshot: None,
            solver: None,
            steps_taken: 0,
            results: Vec::new(),
            failure: None,
        }
    }

    /// Score with this model when the profile asks for the HMM heuristic
    pub fn with_model(mut self, model: Arc<SharedModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Replace the batch before the process has started
    pub fn with_targets(mut self, targets: Vec<Statement>) -> Self {
        self.targets = targets;
        self
    }

    /// Shape of the fallback model when none is shared or stored
    pub fn with_hmm_settings(mut self, hmm: HmmSettings) -> Self {
        self.hmm = hmm;
        self
    }

    pub fn phase(&self) -> ProofPhase {
        self.phase
    }

    pub fn results(&self) -> &[TargetResult] {
        &self.results
    }

    /// The fault that aborted the search, if any
    pub fn failure(&self) -> Option<&AtpError> {
        self.failure.as_ref()
    }

    fn read_kernel(&self) -> AtpResult<KnowledgeKernel> {
        self.kernel
            .read()
            .map(|k| k.clone())
            .map_err(|_| AtpError::internal("knowledge kernel lock poisoned"))
    }

    fn heuristic(&self, ctx_id: ContextId, kernel: &KnowledgeKernel) -> AtpResult<Option<Arc<dyn Heuristic>>> {
        let heuristic: Arc<dyn Heuristic> = match self.settings.heuristic {
            HeuristicKind::None => return Ok(None),
            HeuristicKind::SideDistance => Arc::new(SideDistanceHeuristic),
            HeuristicKind::Hmm => {
                let ctx = kernel.context();
                let model = match &self.model {
                    Some(shared) => shared.snapshot(),
                    None => match self.store.load_hmm(ctx_id)? {
                        Some(m) => Arc::new(m),
                        None => Arc::new(self.hmm.initial_model(observations::alphabet_size(ctx))),
                    },
                };
                Arc::new(HmmHeuristic::new(model, ctx.num_symbols()))
            }
        };
        Ok(Some(heuristic))
    }

    fn load_kernel(&mut self) -> AtpResult<()> {
        let snapshot = self.read_kernel()?;
        let ctx = Arc::clone(snapshot.context());

        let context = self.store.ensure_context(ctx.name())?;
        self.store.ensure_axioms(context, &ctx)?;
        let settings = self
            .store
            .ensure_search_settings(&self.settings.name, &self.settings.description)?;
        let targets = self
            .targets
            .iter()
            .map(|t| self.store.ensure_theorem(context, &statement_key(t, &ctx)))
            .collect::<AtpResult<Vec<_>>>()?;

        let selection = &self.settings.helpers;
        let mut sampled = Vec::new();
        for stored in self.store.proven_theorems(context, selection.load_limit())? {
            match ctx.parse_statement(&stored.statement) {
                Ok(s) => sampled.push(s),
                Err(e) => warn!(theorem = stored.id.0, error = %e, "skipping unparsable stored theorem"),
            }
        }
        let helpers = selection.select(sampled, &self.targets);

        let snapshot = {
            let mut kernel = self
                .kernel
                .write()
                .map_err(|_| AtpError::internal("knowledge kernel lock poisoned"))?;
            let added = kernel.add_theorems(helpers);
            debug!(added, rules = kernel.len(), "kernel seeded from store");
            kernel.clone()
        };

        let heuristic = self.heuristic(context, &snapshot)?;
        let mut solver = IterativeDeepeningSolver::from_settings(snapshot.clone(), &self.settings, heuristic)?;
        solver.set_targets(self.targets.clone());

        self.ids = Some(Ids { context, settings, targets });
        self.snapshot = Some(snapshot);
        self.solver = Some(Box::new(solver));
        Ok(())
    }

    /// One slice of search; returns whether searching is over
    fn search(&mut self) -> AtpResult<bool> {
        let max_steps = self.settings.max_steps;
        let step_size = self.settings.step_size;
        let solver = self
            .solver
            .as_mut()
            .ok_or_else(|| AtpError::internal("proof process searching without a solver"))?;
        if !solver.any_proof_not_done() || self.steps_taken >= max_steps {
            return Ok(true);
        }

        if let Err(e) = solver.step(step_size) {
            warn!(error = %e, "search aborted; saving results found so far");
            self.failure = Some(e);
            return Ok(true);
        }
        self.steps_taken += 1;
        let remaining = solver.statuses().iter().filter(|s| !s.is_done()).count();
        info!("Step {}/{} : {} proof(s) remaining", self.steps_taken, max_steps, remaining);
        Ok(remaining == 0 || self.steps_taken >= max_steps)
    }

    /// Usage rows for the rules `proof` rewrote with
    fn usage_of(
        &self,
        kernel: &KnowledgeKernel,
        ids: &Ids,
        theorem: TheoremId,
        proof: &ProofState,
    ) -> AtpResult<Vec<UsageRecord>> {
        let ctx = kernel.context();
        let mut uses: HashMap<RuleId, i64> = HashMap::new();
        for step in proof.steps() {
            *uses.entry(step.rule).or_default() += 1;
        }
        let mut usage = Vec::with_capacity(uses.len());
        for (rule, count) in uses {
            let Some(rule) = kernel.rule(rule) else { continue };
            let key = statement_key(rule.statement(), ctx);
            match self.store.theorem_id(ids.context, &key) {
                Ok(Some(used)) => usage.push(UsageRecord { target: theorem, used, count }),
                Ok(None) => debug!(rule = %key, "rule has no stored theorem"),
                Err(e) => {
                    return Err(AtpError::store("could not resolve a theorem used by a proof")
                        .with_context("rule", key)
                        .with_cause(e.to_string()));
                }
            }
        }
        Ok(usage)
    }

    fn save_results(&mut self) -> AtpResult<()> {
        let (Some(solver), Some(ids), Some(kernel)) = (self.solver.as_ref(), self.ids.as_ref(), self.snapshot.as_ref())
        else {
            return Err(AtpError::internal("proof process saving before the kernel was loaded"));
        };
        let ctx = kernel.context();
        let statuses = solver.statuses();
        let mut batch = AttemptBatch::new();
        let mut results = Vec::with_capacity(self.targets.len());
        let mut proved = Vec::new();

        for (i, target) in self.targets.iter().enumerate() {
            let theorem = ids.targets[i];
            let stats = solver.stats(i).cloned().unwrap_or_default();
            batch.attempts.push(AttemptRecord {
                theorem,
                settings: ids.settings,
                time_cost: stats.elapsed.as_secs_f64(),
                max_mem: stats.peak_memory as i64,
                num_expansions: stats.expansions as i64,
            });

            let mut record = None;
            if let Some(proof) = solver.proof(i) {
                batch.usage.extend(self.usage_of(kernel, ids, theorem, proof)?);
                let proof = proof.to_record(kernel);
                batch.proofs.push(ProofEntry { theorem, proof: proof.clone(), is_axiom: false });
                proved.push(target.clone());
                record = Some(proof);
            }

            let status = match statuses.get(i).copied() {
                Some(ProofStatus::Searching) if self.failure.is_some() => ProofStatus::Aborted,
                Some(status) => status,
                None => ProofStatus::Aborted,
            };
            results.push(TargetResult {
                statement: target.clone(),
                key: statement_key(target, ctx),
                status,
                stats,
                proof: record,
            });
        }

        self.store.save_attempt_batch(&batch)?;
        let added = self
            .kernel
            .write()
            .map_err(|_| AtpError::internal("knowledge kernel lock poisoned"))?
            .add_theorems(proved);
        info!(
            attempts = batch.attempts.len(),
            proofs = batch.proofs.len(),
            added,
            "proof results saved"
        );
        self.results = results;
        Ok(())
    }
}

impl Process for ProofProcess {
    fn name(&self) -> String {
        format!("prove[{}] x{}", self.settings.name, self.targets.len())
    }

    fn advance(&mut self) -> AtpResult<bool> {
        match self.phase {
            ProofPhase::LoadKernel => {
                self.load_kernel()?;
                self.phase = ProofPhase::Searching;
            }
            ProofPhase::Searching => {
                if self.search()? {
                    self.phase = ProofPhase::SaveResults;
                }
            }
            ProofPhase::SaveResults => {
                self.save_results()?;
                self.solver = None;
                self.snapshot = None;
                self.phase = ProofPhase::Done;
                if let Some(e) = &self.failure {
                    return Err(e.clone());
                }
            }
            ProofPhase::Done => {}
        }
        Ok(self.phase == ProofPhase::Done)
    }

    fn summary(&self) -> Vec<String> {
        let count = |f: fn(&ProofStatus) -> bool| self.results.iter().filter(|r| f(&r.status)).count();
        let proven = count(|s| *s == ProofStatus::Proved);
        let failed = count(|s| *s == ProofStatus::Exhausted);
        let unfinished = count(|s| *s == ProofStatus::Searching);
        let aborted = count(|s| *s == ProofStatus::Aborted);

        let mut header = format!(
            "Proof process finished proving! Results: {} theorem(s) were proven true, \
             {} theorem(s) have no proof, {} theorem(s) did not finish in the allotted time.",
            proven, failed, unfinished
        );
        if aborted > 0 {
            header.push_str(&format!(" {} theorem(s) were aborted by an internal fault.", aborted));
        }
        let mut lines = vec![header];
        for result in &self.results {
            let verdict = match result.status {
                ProofStatus::Proved => "was successful; the statement is true.",
                ProofStatus::Exhausted => {
                    "was unsuccessful; it was impossible to prove using the given solver and the current settings."
                }
                ProofStatus::Searching => "was unsuccessful; not enough time allocated.",
                ProofStatus::Aborted => "was aborted; the search hit an internal fault.",
            };
            lines.push(format!("Proof of \"{}\" {}", result.key, verdict));
            lines.push(format!("Total time taken: {:.3}s", result.stats.elapsed.as_secs_f64()));
            lines.push(format!("Max nodes in memory: {}", result.stats.peak_memory));
            lines.push(format!("Total node expansions: {}", result.stats.expansions));
            if let Some(proof) = &result.proof {
                lines.extend(proof.lines());
            }
        }
        lines
    }
}
