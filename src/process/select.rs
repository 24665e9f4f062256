//! Unproven theorem selection
//!
//! Picks theorems the store holds without a proof, least attempted first,
//! and hands them to the next stage of a [`ProcessSequence`] through a
//! shared [`Selection`].
//!
//! [`ProcessSequence`]: super::ProcessSequence

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::error::{AtpError, AtpResult, ErrorCode};
use crate::logic::{ModelContext, Statement};
use crate::store::TheoremStore;
use super::Process;

/// Statements chosen by one process for another to consume
#[derive(Debug, Clone, Default)]
pub struct Selection {
    inner: Arc<Mutex<Option<Vec<Statement>>>>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(&self, statements: Vec<Statement>) -> AtpResult<()> {
        let mut slot = self
            .inner
            .lock()
            .map_err(|_| AtpError::internal("selection lock poisoned"))?;
        *slot = Some(statements);
        Ok(())
    }

    /// Remove the selected statements; fails if nothing was selected yet
    pub fn take(&self) -> AtpResult<Vec<Statement>> {
        self.inner
            .lock()
            .map_err(|_| AtpError::internal("selection lock poisoned"))?
            .take()
            .ok_or_else(|| AtpError::internal("selection taken before it was made"))
    }
}

pub struct UnprovenSelectorProcess {
    store: Arc<TheoremStore>,
    context: Arc<ModelContext>,
    count: usize,
    selection: Selection,
    selected: Vec<String>,
    done: bool,
}

impl UnprovenSelectorProcess {
    pub fn new(store: Arc<TheoremStore>, context: Arc<ModelContext>, count: usize, selection: Selection) -> Self {
        UnprovenSelectorProcess {
            store,
            context,
            count,
            selection,
            selected: Vec::new(),
            done: false,
        }
    }

    /// Canonical text of the chosen theorems
    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    fn select(&mut self) -> AtpResult<()> {
        let ctx_id = self.store.ensure_context(self.context.name())?;
        let mut statements = Vec::new();
        for stored in self.store.unproven_theorems(ctx_id, self.count)? {
            match self.context.parse_statement(&stored.statement) {
                Ok(s) => {
                    statements.push(s);
                    self.selected.push(stored.statement);
                }
                Err(e) => warn!(theorem = stored.id.0, error = %e, "skipping unparsable stored theorem"),
            }
        }
        if statements.is_empty() {
            return Err(AtpError::new(ErrorCode::NotFound, "no unproven theorems to select")
                .with_context("context", self.context.name())
                .with_hint("store statements first, e.g. with `atp prove`"));
        }
        info!(context = self.context.name(), selected = statements.len(), "unproven theorems selected");
        self.selection.put(statements)
    }
}

impl Process for UnprovenSelectorProcess {
    fn name(&self) -> String {
        format!("select-unproven[{}]", self.context.name())
    }

    fn advance(&mut self) -> AtpResult<bool> {
        if !self.done {
            self.select()?;
            self.done = true;
        }
        Ok(true)
    }

    fn summary(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Selected {} unproven theorem(s) in context \"{}\".",
            self.selected.len(),
            self.context.name()
        )];
        lines.extend(self.selected.iter().map(|s| format!("  {}", s)));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::fixtures::group_theory;
    use crate::logic::KnowledgeKernel;
    use crate::process::{ProcessManager, ProcessSequence, ProofProcess};
    use crate::search::{FixedLimits, SearchSettings, StoppingSettings};
    use crate::store::{statement_key, AttemptBatch, AttemptRecord};

    fn setup() -> (Arc<TheoremStore>, Arc<ModelContext>) {
        (Arc::new(TheoremStore::in_memory().unwrap()), Arc::new(group_theory()))
    }

    fn store_statement(store: &TheoremStore, ctx: &ModelContext, text: &str) -> crate::store::TheoremId {
        let ctx_id = store.ensure_context(ctx.name()).unwrap();
        let stmt = ctx.parse_statement(text).unwrap();
        store.ensure_theorem(ctx_id, &statement_key(&stmt, ctx)).unwrap()
    }

    #[test]
    fn test_selects_least_attempted() {
        let (store, ctx) = setup();
        let tried = store_statement(&store, &ctx, "i(e) = e");
        store_statement(&store, &ctx, "*(e, e) = e");
        let settings = store.ensure_search_settings("default", "").unwrap();
        store
            .save_attempt_batch(&AttemptBatch {
                attempts: vec![AttemptRecord {
                    theorem: tried,
                    settings,
                    time_cost: 0.1,
                    max_mem: 1,
                    num_expansions: 10,
                }],
                ..AttemptBatch::default()
            })
            .unwrap();

        let selection = Selection::new();
        let mut process = UnprovenSelectorProcess::new(store, ctx.clone(), 1, selection.clone());
        assert!(process.advance().unwrap());

        let chosen = selection.take().unwrap();
        let expected = statement_key(&ctx.parse_statement("*(e, e) = e").unwrap(), &ctx);
        assert_eq!(chosen.len(), 1);
        assert_eq!(statement_key(&chosen[0], &ctx), expected);
        assert_eq!(process.selected(), &[expected]);
        let summary = process.summary();
        assert!(summary[0].starts_with("Selected 1 unproven theorem(s)"));
        assert_eq!(summary.len(), 2);
        // a selection is consumed once
        assert!(selection.take().is_err());
    }

    #[test]
    fn test_no_unproven_theorems_is_not_found() {
        let (store, ctx) = setup();
        let selection = Selection::new();
        let mut process = UnprovenSelectorProcess::new(store, ctx, 5, selection.clone());
        let err = process.advance().unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert!(err.hint.is_some());
        assert!(selection.take().is_err());
    }

    #[test]
    fn test_selection_feeds_a_proof_process() {
        let (store, ctx) = setup();
        store_statement(&store, &ctx, "*(e, e) = e");
        let kernel = KnowledgeKernel::new(ctx.clone()).into_shared();
        let settings = SearchSettings::named("quick")
            .with_depths(1, 3)
            .with_steps(50, 40)
            .with_stopping(StoppingSettings::Fixed(FixedLimits {
                max_expansions: Some(10_000),
                ..FixedLimits::default()
            }));

        let selection = Selection::new();
        let selector = UnprovenSelectorProcess::new(store.clone(), ctx.clone(), 10, selection.clone());
        let prover = ProofProcess::new(store.clone(), kernel, settings, Vec::new());
        let sequence = ProcessSequence::new("prove-unproven", Box::new(selector))
            .then(move || Ok(Box::new(prover.with_targets(selection.take()?)) as Box<dyn Process>));

        let mut manager = ProcessManager::new();
        manager.add(Box::new(sequence));
        let reports = manager.run();
        assert!(reports[0].succeeded());
        assert!(reports[0].lines[0].starts_with("Selected 1"));
        assert!(reports[0].lines.iter().any(|l| l.contains("was successful")));

        let ctx_id = store.context_id(ctx.name()).unwrap().unwrap();
        assert!(store.unproven_theorems(ctx_id, 10).unwrap().is_empty());
    }
}
