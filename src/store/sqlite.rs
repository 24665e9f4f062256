//! SQLite-backed theorem store
//!
//! # Usage
//!
//! ```ignore
//! use atp::store::TheoremStore;
//!
//! let store = TheoremStore::open("atp.db")?;
//! let ctx_id = store.ensure_context("group-theory")?;
//! let axioms = store.ensure_axioms(ctx_id, &context)?;
//! ```
//!
//! Statements are stored as canonical text, so a theorem is found again
//! whatever orientation or variable names it is written with.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, warn};

use crate::error::{AtpError, AtpResult, ErrorCode};
use crate::hmm::{HmmModel, Matrix};
use crate::logic::{ModelContext, ProofRecord};
use super::{
    statement_key, AttemptBatch, ContextId, SettingsId, StoredTheorem, Task, TheoremId,
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS model_contexts (
        ctx_id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS theorems (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        stmt TEXT NOT NULL,
        ctx INTEGER NOT NULL REFERENCES model_contexts(ctx_id),
        thm_date TEXT NOT NULL,
        UNIQUE(ctx, stmt)
    );

    CREATE TABLE IF NOT EXISTS proofs (
        thm_id INTEGER PRIMARY KEY REFERENCES theorems(id),
        proof TEXT NOT NULL,
        is_axiom INTEGER NOT NULL DEFAULT 0,
        proof_date TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS search_settings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS proof_attempts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        thm_id INTEGER NOT NULL REFERENCES theorems(id),
        search_settings_id INTEGER NOT NULL REFERENCES search_settings(id),
        time_cost REAL NOT NULL,
        max_mem INTEGER NOT NULL,
        num_expansions INTEGER NOT NULL,
        attempt_date TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_attempts_thm ON proof_attempts(thm_id);

    CREATE TABLE IF NOT EXISTS theorem_usage (
        target_thm_id INTEGER NOT NULL REFERENCES theorems(id),
        used_thm_id INTEGER NOT NULL REFERENCES theorems(id),
        cnt INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (target_thm_id, used_thm_id)
    );

    CREATE TABLE IF NOT EXISTS tasks (
        thm_id INTEGER PRIMARY KEY REFERENCES theorems(id),
        deadline TEXT,
        priority INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS hmm_models (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        ctx INTEGER NOT NULL REFERENCES model_contexts(ctx_id),
        num_states INTEGER NOT NULL,
        num_symbols INTEGER NOT NULL,
        initial TEXT NOT NULL,
        created TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS hmm_transitions (
        model_id INTEGER NOT NULL REFERENCES hmm_models(id),
        from_state INTEGER NOT NULL,
        to_state INTEGER NOT NULL,
        prob REAL NOT NULL,
        PRIMARY KEY (model_id, from_state, to_state)
    );

    CREATE TABLE IF NOT EXISTS hmm_emissions (
        model_id INTEGER NOT NULL REFERENCES hmm_models(id),
        state INTEGER NOT NULL,
        symbol INTEGER NOT NULL,
        prob REAL NOT NULL,
        PRIMARY KEY (model_id, state, symbol)
    );
"#;

/// Transactions retried this many times when the database is busy
pub const DEFAULT_RETRIES: u32 = 3;

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn parse_date(text: Option<String>) -> Option<DateTime<Utc>> {
    text.and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Persistent store of contexts, theorems, proofs and attempts
pub struct TheoremStore {
    /// Database connection (wrapped in Mutex for Send/Sync)
    conn: Mutex<Connection>,
    retries: u32,
}

impl TheoremStore {
    /// Open or create a database file
    pub fn open<P: AsRef<Path>>(path: P) -> AtpResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            AtpError::from(e).with_context("path", path.display().to_string())
        })?;
        Self::from_connection(conn)
    }

    /// Private in-memory database
    pub fn in_memory() -> AtpResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> AtpResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        conn.busy_timeout(Duration::from_millis(250))?;
        conn.execute_batch(SCHEMA)?;
        Ok(TheoremStore {
            conn: Mutex::new(conn),
            retries: DEFAULT_RETRIES,
        })
    }

    /// Number of retries of a busy or locked transaction
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    fn conn(&self) -> AtpResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AtpError::store("database connection lock poisoned"))
    }

    /// Run `work` in a transaction, retrying when the database is busy
    fn with_transaction<T, F>(&self, what: &str, mut work: F) -> AtpResult<T>
    where
        F: FnMut(&Transaction<'_>) -> AtpResult<T>,
    {
        let mut conn = self.conn()?;
        let mut attempt = 0;
        loop {
            let result = conn
                .transaction()
                .map_err(AtpError::from)
                .and_then(|tx| {
                    let value = work(&tx)?;
                    tx.commit()?;
                    Ok(value)
                });
            match result {
                Err(e) if e.code == ErrorCode::TransactionFailed && attempt < self.retries => {
                    attempt += 1;
                    warn!(operation = what, attempt, error = %e, "transaction busy, retrying");
                    thread::sleep(Duration::from_millis(10 << attempt));
                }
                Err(e) => return Err(e.with_context("operation", what)),
                Ok(value) => return Ok(value),
            }
        }
    }

    // ------------------------------------------------------------------
    // Contexts and settings
    // ------------------------------------------------------------------

    pub fn ensure_context(&self, name: &str) -> AtpResult<ContextId> {
        let conn = self.conn()?;
        conn.execute("INSERT OR IGNORE INTO model_contexts (name) VALUES (?1)", params![name])?;
        let id = conn.query_row(
            "SELECT ctx_id FROM model_contexts WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(ContextId(id))
    }

    pub fn context_id(&self, name: &str) -> AtpResult<Option<ContextId>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT ctx_id FROM model_contexts WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(ContextId))
    }

    /// Insert or update a search profile row
    pub fn ensure_search_settings(&self, name: &str, description: &str) -> AtpResult<SettingsId> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO search_settings (name, description) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET description = excluded.description",
            params![name, description],
        )?;
        let id = conn.query_row(
            "SELECT id FROM search_settings WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(SettingsId(id))
    }

    pub fn search_settings_id(&self, name: &str) -> AtpResult<Option<SettingsId>> {
        let conn = self.conn()?;
        let id = conn
            .query_row("SELECT id FROM search_settings WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        Ok(id.map(SettingsId))
    }

    // ------------------------------------------------------------------
    // Theorems
    // ------------------------------------------------------------------

    /// Theorem row for canonical statement text, created if missing
    pub fn ensure_theorem(&self, ctx: ContextId, statement: &str) -> AtpResult<TheoremId> {
        let conn = self.conn()?;
        Self::ensure_theorem_in(&conn, ctx, statement)
    }

    fn ensure_theorem_in(conn: &Connection, ctx: ContextId, statement: &str) -> AtpResult<TheoremId> {
        conn.execute(
            "INSERT OR IGNORE INTO theorems (stmt, ctx, thm_date) VALUES (?1, ?2, ?3)",
            params![statement, ctx.0, now()],
        )?;
        let id = conn.query_row(
            "SELECT id FROM theorems WHERE ctx = ?1 AND stmt = ?2",
            params![ctx.0, statement],
            |row| row.get(0),
        )?;
        Ok(TheoremId(id))
    }

    pub fn theorem_id(&self, ctx: ContextId, statement: &str) -> AtpResult<Option<TheoremId>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM theorems WHERE ctx = ?1 AND stmt = ?2",
                params![ctx.0, statement],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(TheoremId))
    }

    /// Store the context's axioms as theorems proved by assumption
    pub fn ensure_axioms(&self, ctx_id: ContextId, ctx: &ModelContext) -> AtpResult<Vec<TheoremId>> {
        let entries: Vec<(String, String)> = ctx
            .axioms()
            .iter()
            .map(|a| Ok((statement_key(a, ctx), ProofRecord::axiom(a, ctx).to_json()?)))
            .collect::<AtpResult<_>>()?;

        self.with_transaction("ensure_axioms", |tx| {
            let mut ids = Vec::with_capacity(entries.len());
            for (key, proof) in &entries {
                let id = Self::ensure_theorem_in(tx, ctx_id, key)?;
                tx.execute(
                    "INSERT OR IGNORE INTO proofs (thm_id, proof, is_axiom, proof_date) VALUES (?1, ?2, 1, ?3)",
                    params![id.0, proof, now()],
                )?;
                ids.push(id);
            }
            Ok(ids)
        })
    }

    // ------------------------------------------------------------------
    // Attempts and proofs
    // ------------------------------------------------------------------

    /// Commit the results of one proof process as a single transaction.
    ///
    /// Fails with `ConstraintViolation`, writing nothing, if the batch
    /// refers to a theorem or search profile that does not exist.
    pub fn save_attempt_batch(&self, batch: &AttemptBatch) -> AtpResult<()> {
        let proofs: Vec<String> = batch
            .proofs
            .iter()
            .map(|p| p.proof.to_json())
            .collect::<AtpResult<_>>()?;

        self.with_transaction("save_attempt_batch", |tx| {
            for id in batch.theorem_ids() {
                let exists: Option<i64> = tx
                    .query_row("SELECT 1 FROM theorems WHERE id = ?1", params![id.0], |row| row.get(0))
                    .optional()?;
                if exists.is_none() {
                    return Err(AtpError::constraint(format!("theorem {} does not exist", id.0)));
                }
            }
            for id in batch.settings_ids() {
                let exists: Option<i64> = tx
                    .query_row("SELECT 1 FROM search_settings WHERE id = ?1", params![id.0], |row| row.get(0))
                    .optional()?;
                if exists.is_none() {
                    return Err(AtpError::constraint(format!("search settings {} do not exist", id.0)));
                }
            }

            let date = now();
            for a in &batch.attempts {
                tx.execute(
                    "INSERT INTO proof_attempts
                        (thm_id, search_settings_id, time_cost, max_mem, num_expansions, attempt_date)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![a.theorem.0, a.settings.0, a.time_cost, a.max_mem, a.num_expansions, date],
                )?;
            }
            for (p, json) in batch.proofs.iter().zip(&proofs) {
                tx.execute(
                    "INSERT OR REPLACE INTO proofs (thm_id, proof, is_axiom, proof_date) VALUES (?1, ?2, ?3, ?4)",
                    params![p.theorem.0, json, p.is_axiom, date],
                )?;
                tx.execute("DELETE FROM tasks WHERE thm_id = ?1", params![p.theorem.0])?;
            }
            for u in &batch.usage {
                tx.execute(
                    "INSERT INTO theorem_usage (target_thm_id, used_thm_id, cnt) VALUES (?1, ?2, ?3)
                     ON CONFLICT(target_thm_id, used_thm_id) DO UPDATE SET cnt = cnt + excluded.cnt",
                    params![u.target.0, u.used.0, u.count],
                )?;
            }
            debug!(
                attempts = batch.attempts.len(),
                proofs = batch.proofs.len(),
                usage = batch.usage.len(),
                "attempt batch committed"
            );
            Ok(())
        })
    }

    /// Record a single proof outside a batch
    pub fn record_proof(&self, theorem: TheoremId, proof: &ProofRecord, is_axiom: bool) -> AtpResult<()> {
        let json = proof.to_json()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO proofs (thm_id, proof, is_axiom, proof_date) VALUES (?1, ?2, ?3, ?4)",
            params![theorem.0, json, is_axiom, now()],
        )?;
        Ok(())
    }

    pub fn proof(&self, theorem: TheoremId) -> AtpResult<Option<ProofRecord>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row("SELECT proof FROM proofs WHERE thm_id = ?1", params![theorem.0], |row| row.get(0))
            .optional()?;
        json.map(|j| ProofRecord::from_json(&j)).transpose()
    }

    /// Random sample of proved, non-axiom theorems, for seeding a kernel
    pub fn proven_theorems(&self, ctx: ContextId, limit: usize) -> AtpResult<Vec<StoredTheorem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.stmt FROM theorems t JOIN proofs p ON p.thm_id = t.id
             WHERE t.ctx = ?1 AND p.is_axiom = 0
             ORDER BY RANDOM() LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![ctx.0, limit as i64], |row| {
            Ok(StoredTheorem { id: TheoremId(row.get(0)?), statement: row.get(1)? })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Up to `limit` theorems without a proof, least attempted first and
    /// in random order among equally attempted ones
    pub fn unproven_theorems(&self, ctx: ContextId, limit: usize) -> AtpResult<Vec<StoredTheorem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.stmt FROM theorems t LEFT JOIN proofs p ON p.thm_id = t.id
             WHERE t.ctx = ?1 AND p.thm_id IS NULL
             ORDER BY (SELECT COUNT(*) FROM proof_attempts a WHERE a.thm_id = t.id), RANDOM()
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![ctx.0, limit as i64], |row| {
            Ok(StoredTheorem { id: TheoremId(row.get(0)?), statement: row.get(1)? })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Schedule a theorem for proving
    pub fn add_task(&self, theorem: TheoremId, deadline: Option<DateTime<Utc>>, priority: i64) -> AtpResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO tasks (thm_id, deadline, priority) VALUES (?1, ?2, ?3)",
            params![theorem.0, deadline.map(|d| d.to_rfc3339()), priority],
        )?;
        Ok(())
    }

    /// Unproved tasks, highest priority and earliest deadline first
    pub fn pending_tasks(&self, ctx: ContextId) -> AtpResult<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT t.id, t.stmt, k.deadline, k.priority FROM tasks k
             JOIN theorems t ON t.id = k.thm_id
             LEFT JOIN proofs p ON p.thm_id = t.id
             WHERE t.ctx = ?1 AND p.thm_id IS NULL
             ORDER BY k.priority DESC, k.deadline IS NULL, k.deadline, t.id",
        )?;
        let rows = stmt.query_map(params![ctx.0], |row| {
            Ok(Task {
                theorem: StoredTheorem { id: TheoremId(row.get(0)?), statement: row.get(1)? },
                deadline: parse_date(row.get(2)?),
                priority: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Non-axiom proofs of a context, the training data of the heuristic
    pub fn training_corpus(&self, ctx: ContextId) -> AtpResult<Vec<ProofRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT p.proof FROM proofs p JOIN theorems t ON t.id = p.thm_id
             WHERE t.ctx = ?1 AND p.is_axiom = 0 ORDER BY p.thm_id",
        )?;
        let rows = stmt.query_map(params![ctx.0], |row| row.get::<_, String>(0))?;
        let mut records = Vec::new();
        for json in rows {
            let json = json?;
            match ProofRecord::from_json(&json) {
                Ok(r) => records.push(r),
                Err(e) => warn!(error = %e, "skipping unreadable proof"),
            }
        }
        Ok(records)
    }

    pub fn attempt_count(&self) -> AtpResult<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM proof_attempts", [], |row| row.get(0))?)
    }

    /// Theorems a proof of `target` used, with counts
    pub fn theorem_usage(&self, target: TheoremId) -> AtpResult<Vec<(TheoremId, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT used_thm_id, cnt FROM theorem_usage WHERE target_thm_id = ?1 ORDER BY used_thm_id",
        )?;
        let rows = stmt.query_map(params![target.0], |row| Ok((TheoremId(row.get(0)?), row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ------------------------------------------------------------------
    // Heuristic models
    // ------------------------------------------------------------------

    /// Persist a trained model; returns its row id
    pub fn save_hmm(&self, ctx: ContextId, model: &HmmModel) -> AtpResult<i64> {
        let initial = serde_json::to_string(model.initial())?;
        self.with_transaction("save_hmm", |tx| {
            tx.execute(
                "INSERT INTO hmm_models (ctx, num_states, num_symbols, initial, created) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![ctx.0, model.num_states() as i64, model.num_symbols() as i64, initial, now()],
            )?;
            let model_id = tx.last_insert_rowid();

            let mut transition = tx.prepare_cached(
                "INSERT INTO hmm_transitions (model_id, from_state, to_state, prob) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for i in 0..model.num_states() {
                for j in 0..model.num_states() {
                    transition.execute(params![model_id, i as i64, j as i64, model.transition().get(i, j)])?;
                }
            }
            let mut emission = tx.prepare_cached(
                "INSERT INTO hmm_emissions (model_id, state, symbol, prob) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for i in 0..model.num_states() {
                for k in 0..model.num_symbols() {
                    emission.execute(params![model_id, i as i64, k as i64, model.emission().get(i, k)])?;
                }
            }
            Ok(model_id)
        })
    }

    /// Most recently saved model of a context
    pub fn load_hmm(&self, ctx: ContextId) -> AtpResult<Option<HmmModel>> {
        let conn = self.conn()?;
        let header: Option<(i64, i64, i64, String)> = conn
            .query_row(
                "SELECT id, num_states, num_symbols, initial FROM hmm_models WHERE ctx = ?1 ORDER BY id DESC LIMIT 1",
                params![ctx.0],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let Some((model_id, states, symbols, initial)) = header else {
            return Ok(None);
        };
        let (states, symbols) = (states as usize, symbols as usize);
        let initial: Vec<f64> = serde_json::from_str(&initial)
            .map_err(|e| AtpError::invalid_model(format!("stored initial distribution: {}", e)))?;

        let mut transition = Matrix::zeros(states, states);
        let mut stmt = conn.prepare("SELECT from_state, to_state, prob FROM hmm_transitions WHERE model_id = ?1")?;
        let rows = stmt.query_map(params![model_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, f64>(2)?))
        })?;
        for row in rows {
            let (i, j, p) = row?;
            if i as usize >= states || j as usize >= states {
                return Err(AtpError::invalid_model("stored transition outside the model"));
            }
            transition.set(i as usize, j as usize, p);
        }

        let mut emission = Matrix::zeros(states, symbols);
        let mut stmt = conn.prepare("SELECT state, symbol, prob FROM hmm_emissions WHERE model_id = ?1")?;
        let rows = stmt.query_map(params![model_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, f64>(2)?))
        })?;
        for row in rows {
            let (i, k, p) = row?;
            if i as usize >= states || k as usize >= symbols {
                return Err(AtpError::invalid_model("stored emission outside the model"));
            }
            emission.set(i as usize, k as usize, p);
        }

        HmmModel::new(initial, transition, emission)
            .map(Some)
            .map_err(|e| e.with_context("model_id", model_id.to_string()))
    }
}

impl std::fmt::Debug for TheoremStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TheoremStore")
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::fixtures::group_theory;
    use crate::store::{AttemptRecord, ProofEntry, UsageRecord};

    fn setup() -> (TheoremStore, ContextId, ModelContext) {
        let store = TheoremStore::in_memory().unwrap();
        let ctx = group_theory();
        let ctx_id = store.ensure_context(ctx.name()).unwrap();
        (store, ctx_id, ctx)
    }

    fn attempt(theorem: TheoremId, settings: SettingsId) -> AttemptRecord {
        AttemptRecord {
            theorem,
            settings,
            time_cost: 0.5,
            max_mem: 4,
            num_expansions: 120,
        }
    }

    #[test]
    fn test_contexts_and_settings_idempotent() {
        let (store, ctx_id, _) = setup();
        assert_eq!(store.ensure_context("group-theory").unwrap(), ctx_id);
        assert_eq!(store.context_id("group-theory").unwrap(), Some(ctx_id));
        assert_eq!(store.context_id("rings").unwrap(), None);

        let s = store.ensure_search_settings("default", "first").unwrap();
        assert_eq!(store.ensure_search_settings("default", "second").unwrap(), s);
        assert_eq!(store.search_settings_id("default").unwrap(), Some(s));
    }

    #[test]
    fn test_axioms_stored_once() {
        let (store, ctx_id, ctx) = setup();
        let ids = store.ensure_axioms(ctx_id, &ctx).unwrap();
        assert_eq!(ids.len(), 3);
        assert_eq!(store.ensure_axioms(ctx_id, &ctx).unwrap(), ids);

        let key = statement_key(&ctx.parse_statement("q = *(q, e)").unwrap(), &ctx);
        assert_eq!(store.theorem_id(ctx_id, &key).unwrap(), Some(ids[0]));
        // axioms are neither pending nor training data
        assert!(store.unproven_theorems(ctx_id, 10).unwrap().is_empty());
        assert!(store.training_corpus(ctx_id).unwrap().is_empty());
        assert!(store.proven_theorems(ctx_id, 10).unwrap().is_empty());
    }

    #[test]
    fn test_save_attempt_batch() {
        let (store, ctx_id, ctx) = setup();
        let axioms = store.ensure_axioms(ctx_id, &ctx).unwrap();
        let settings = store.ensure_search_settings("default", "").unwrap();
        let target = store.ensure_theorem(ctx_id, "*(e, x0) = x0").unwrap();
        store.add_task(target, None, 1).unwrap();

        let proof = ProofRecord { target: "*(e, x0) = x0".to_string(), steps: vec![] };
        let batch = AttemptBatch {
            attempts: vec![attempt(target, settings)],
            proofs: vec![ProofEntry { theorem: target, proof: proof.clone(), is_axiom: false }],
            usage: vec![UsageRecord { target, used: axioms[1], count: 2 }],
        };
        store.save_attempt_batch(&batch).unwrap();
        store.save_attempt_batch(&AttemptBatch { proofs: vec![], ..batch }).unwrap();

        assert_eq!(store.attempt_count().unwrap(), 2);
        assert_eq!(store.proof(target).unwrap(), Some(proof));
        assert_eq!(store.theorem_usage(target).unwrap(), vec![(axioms[1], 4)]);
        assert!(store.pending_tasks(ctx_id).unwrap().is_empty());
        assert_eq!(store.proven_theorems(ctx_id, 5).unwrap().len(), 1);
        assert_eq!(store.training_corpus(ctx_id).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_batch_leaves_attempts_unchanged() {
        let (store, ctx_id, _) = setup();
        let settings = store.ensure_search_settings("default", "").unwrap();
        let target = store.ensure_theorem(ctx_id, "i(i(x0)) = x0").unwrap();
        store.save_attempt_batch(&AttemptBatch {
            attempts: vec![attempt(target, settings)],
            ..AttemptBatch::default()
        })
        .unwrap();
        let before = store.attempt_count().unwrap();

        let batch = AttemptBatch {
            attempts: vec![attempt(target, settings), attempt(TheoremId(999), settings)],
            ..AttemptBatch::default()
        };
        let err = store.save_attempt_batch(&batch).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConstraintViolation);
        assert_eq!(store.attempt_count().unwrap(), before);

        let batch = AttemptBatch {
            attempts: vec![attempt(target, SettingsId(42))],
            ..AttemptBatch::default()
        };
        let err = store.save_attempt_batch(&batch).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConstraintViolation);
        assert_eq!(store.attempt_count().unwrap(), before);
    }

    #[test]
    fn test_tasks_ordered_by_priority_then_deadline() {
        let (store, ctx_id, _) = setup();
        let a = store.ensure_theorem(ctx_id, "i(e) = e").unwrap();
        let b = store.ensure_theorem(ctx_id, "i(i(x0)) = x0").unwrap();
        let c = store.ensure_theorem(ctx_id, "*(e, x0) = x0").unwrap();
        let soon = Utc::now();
        store.add_task(a, None, 1).unwrap();
        store.add_task(b, Some(soon), 1).unwrap();
        store.add_task(c, None, 5).unwrap();

        let tasks = store.pending_tasks(ctx_id).unwrap();
        let order: Vec<TheoremId> = tasks.iter().map(|t| t.theorem.id).collect();
        assert_eq!(order, vec![c, b, a]);
        assert!(tasks[1].deadline.is_some());
        assert_eq!(store.unproven_theorems(ctx_id, 10).unwrap().len(), 3);
    }

    #[test]
    fn test_unproven_least_attempted_first() {
        let (store, ctx_id, _) = setup();
        let settings = store.ensure_search_settings("default", "").unwrap();
        let tried = store.ensure_theorem(ctx_id, "i(e) = e").unwrap();
        let fresh = store.ensure_theorem(ctx_id, "i(i(x0)) = x0").unwrap();
        let proved = store.ensure_theorem(ctx_id, "*(e, x0) = x0").unwrap();
        store
            .save_attempt_batch(&AttemptBatch {
                attempts: vec![attempt(tried, settings), attempt(tried, settings)],
                proofs: vec![ProofEntry {
                    theorem: proved,
                    proof: ProofRecord { target: "*(e, x0) = x0".to_string(), steps: vec![] },
                    is_axiom: false,
                }],
                ..AttemptBatch::default()
            })
            .unwrap();

        let first: Vec<TheoremId> = store.unproven_theorems(ctx_id, 1).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(first, vec![fresh]);
        let all: Vec<TheoremId> = store.unproven_theorems(ctx_id, 10).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(all, vec![fresh, tried]);
        assert!(store.unproven_theorems(ctx_id, 0).unwrap().is_empty());
    }

    #[test]
    fn test_hmm_round_trip() {
        let (store, ctx_id, _) = setup();
        assert!(store.load_hmm(ctx_id).unwrap().is_none());
        let model = HmmModel::seeded(3, 4, 9);
        store.save_hmm(ctx_id, &model).unwrap();
        let newer = HmmModel::seeded(3, 4, 10);
        store.save_hmm(ctx_id, &newer).unwrap();
        assert_eq!(store.load_hmm(ctx_id).unwrap(), Some(newer));
    }

    #[test]
    fn test_on_disk_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atp.db");
        let ctx = group_theory();
        {
            let store = TheoremStore::open(&path).unwrap();
            let ctx_id = store.ensure_context(ctx.name()).unwrap();
            store.ensure_axioms(ctx_id, &ctx).unwrap();
        }
        let store = TheoremStore::open(&path).unwrap();
        let ctx_id = store.context_id(ctx.name()).unwrap().unwrap();
        let key = statement_key(&ctx.axioms()[2], &ctx);
        assert!(store.theorem_id(ctx_id, &key).unwrap().is_some());
    }
}
