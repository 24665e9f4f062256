//! Theorem bookkeeping
//!
//! Everything the prover remembers between runs: model contexts, theorems
//! and their proofs, every proof attempt with its cost, which theorems each
//! proof relied on, pending tasks, and trained heuristic models.
//!
//! The results of one proof process are written as one [`AttemptBatch`],
//! which commits all-or-nothing.

pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logic::{ModelContext, ProofRecord, Statement};

pub use sqlite::TheoremStore;

/// Row id of a model context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(pub i64);

/// Row id of a theorem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TheoremId(pub i64);

/// Row id of a search profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SettingsId(pub i64);

/// Text a statement is stored under: its canonical form
pub fn statement_key(statement: &Statement, ctx: &ModelContext) -> String {
    statement.canonical().to_text(ctx)
}

/// Cost of one attempt at one theorem
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub theorem: TheoremId,
    pub settings: SettingsId,
    /// Seconds spent
    pub time_cost: f64,
    /// Peak search stack depth
    pub max_mem: i64,
    pub num_expansions: i64,
}

/// A proof found by an attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ProofEntry {
    pub theorem: TheoremId,
    pub proof: ProofRecord,
    pub is_axiom: bool,
}

/// How often a proof of `target` used theorem `used`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRecord {
    pub target: TheoremId,
    pub used: TheoremId,
    pub count: i64,
}

/// Results of one proof process, committed atomically
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptBatch {
    pub attempts: Vec<AttemptRecord>,
    pub proofs: Vec<ProofEntry>,
    pub usage: Vec<UsageRecord>,
}

impl AttemptBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty() && self.proofs.is_empty() && self.usage.is_empty()
    }

    /// Every theorem id the batch refers to
    pub fn theorem_ids(&self) -> Vec<TheoremId> {
        let mut ids: Vec<TheoremId> = self
            .attempts
            .iter()
            .map(|a| a.theorem)
            .chain(self.proofs.iter().map(|p| p.theorem))
            .chain(self.usage.iter().flat_map(|u| [u.target, u.used]))
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn settings_ids(&self) -> Vec<SettingsId> {
        let mut ids: Vec<SettingsId> = self.attempts.iter().map(|a| a.settings).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

/// A theorem row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTheorem {
    pub id: TheoremId,
    /// Canonical statement text
    pub statement: String,
}

/// A theorem waiting to be proved
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub theorem: StoredTheorem,
    pub deadline: Option<DateTime<Utc>>,
    pub priority: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_ids_deduplicated() {
        let batch = AttemptBatch {
            attempts: vec![AttemptRecord {
                theorem: TheoremId(2),
                settings: SettingsId(1),
                time_cost: 0.1,
                max_mem: 3,
                num_expansions: 10,
            }],
            proofs: vec![],
            usage: vec![UsageRecord { target: TheoremId(2), used: TheoremId(1), count: 2 }],
        };
        assert_eq!(batch.theorem_ids(), vec![TheoremId(1), TheoremId(2)]);
        assert_eq!(batch.settings_ids(), vec![SettingsId(1)]);
        assert!(!batch.is_empty());
        assert!(AttemptBatch::new().is_empty());
    }
}
