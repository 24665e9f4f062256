//! Observation alphabet
//!
//! Every proof step emits one observation: the context id of the head
//! symbol at the rewritten position. A rewritten free variable emits the
//! extra slot `num_symbols`, so the alphabet of a context with `n` symbols
//! has `n + 1` letters.

use crate::logic::{ModelContext, ProofRecord, SymbolId};
use super::model::Observation;

/// Alphabet size for `ctx`
pub fn alphabet_size(ctx: &ModelContext) -> usize {
    ctx.num_symbols() + 1
}

pub fn observe(head: Option<SymbolId>, num_symbols: usize) -> Observation {
    match head {
        Some(id) if id.index() < num_symbols => id.index(),
        _ => num_symbols,
    }
}

/// Observation sequence of a chain of rewritten heads
pub fn from_heads(heads: &[Option<SymbolId>], num_symbols: usize) -> Vec<Observation> {
    heads.iter().map(|h| observe(*h, num_symbols)).collect()
}

/// Observation sequence of a persisted proof
pub fn from_record(record: &ProofRecord, ctx: &ModelContext) -> Vec<Observation> {
    record
        .steps
        .iter()
        .map(|step| observe(step.head.as_deref().and_then(|h| ctx.symbol_id(h)), ctx.num_symbols()))
        .collect()
}

/// Training corpus from persisted proofs; axioms and trivial proofs contribute nothing
pub fn corpus_from_records(records: &[ProofRecord], ctx: &ModelContext) -> Vec<Vec<Observation>> {
    records
        .iter()
        .map(|r| from_record(r, ctx))
        .filter(|seq| !seq.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::fixtures::group_theory;
    use crate::logic::{Orientation, Side, StepRecord};

    fn step(head: Option<&str>) -> StepRecord {
        StepRecord {
            statement: "x0 = x0".to_string(),
            rule: "*(x0, e) = x0".to_string(),
            orientation: Orientation::Forward,
            side: Side::Lhs,
            path: vec![],
            head: head.map(str::to_string),
        }
    }

    #[test]
    fn test_alphabet_includes_variable_slot() {
        let ctx = group_theory();
        assert_eq!(alphabet_size(&ctx), 4);
        assert_eq!(observe(None, 3), 3);
        assert_eq!(observe(Some(SymbolId(2)), 3), 2);
        assert_eq!(from_heads(&[Some(SymbolId(0)), None], 3), vec![0, 3]);
    }

    #[test]
    fn test_corpus_from_records() {
        let ctx = group_theory();
        let records = vec![
            ProofRecord { target: "e = e".to_string(), steps: vec![] },
            ProofRecord {
                target: "i(e) = e".to_string(),
                steps: vec![step(Some("i")), step(Some("*")), step(None)],
            },
        ];
        assert_eq!(corpus_from_records(&records, &ctx), vec![vec![2, 0, 3]]);
    }
}
