//! One-way matching of rule patterns against sub-expressions
//!
//! Rule variables and the variables of the statement being rewritten live
//! in separate namespaces: a match binds rule variables to sub-expressions of
//! the subject and never instantiates the subject itself.

use super::expr::Expression;

/// Assignment of expressions to rule variables, indexed by variable number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment {
    slots: Vec<Option<Expression>>,
}

impl Assignment {
    /// Empty assignment able to hold variables `0..n`
    pub fn with_slots(n: usize) -> Self {
        Assignment { slots: vec![None; n] }
    }

    pub fn get(&self, var: u32) -> Option<&Expression> {
        self.slots.get(var as usize).and_then(Option::as_ref)
    }

    /// Bind `var`, growing the slot table if needed
    pub fn bind(&mut self, var: u32, value: Expression) {
        let slot = var as usize;
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(value);
    }

    pub fn is_bound(&self, var: u32) -> bool {
        self.get(var).is_some()
    }

    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Extend `assignment` so that `pattern` instantiated by it equals `subject`.
///
/// Returns `false` if no such extension exists; the assignment may then hold
/// partial bindings and should be discarded.
pub fn match_into(pattern: &Expression, subject: &Expression, assignment: &mut Assignment) -> bool {
    let mut pending = vec![(pattern, subject)];

    while let Some((p, s)) = pending.pop() {
        match p {
            Expression::Var(v) => {
                if let Some(existing) = assignment.get(*v) {
                    if existing != s {
                        return false;
                    }
                } else {
                    assignment.bind(*v, s.clone());
                }
            }
            Expression::Const(c) => {
                if s.head() != Some(*c) || !s.args().is_empty() {
                    return false;
                }
            }
            Expression::Apply(_) => {
                if s.head() != p.head() || s.args().len() != p.args().len() || s.is_var() {
                    return false;
                }
                for pair in p.args().iter().zip(s.args().iter()) {
                    pending.push(pair);
                }
            }
        }
    }

    true
}

/// Match a rule side with `num_vars` variables against `subject`
pub fn match_pattern(pattern: &Expression, subject: &Expression, num_vars: usize) -> Option<Assignment> {
    let mut assignment = Assignment::with_slots(num_vars);
    match_into(pattern, subject, &mut assignment).then_some(assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::expr::SymbolId;

    fn mul(a: Expression, b: Expression) -> Expression {
        Expression::apply_unchecked(SymbolId(0), vec![a, b])
    }

    fn e() -> Expression {
        Expression::Const(SymbolId(1))
    }

    #[test]
    fn test_match_binds_variables() {
        // pattern *(x0, e) against *(*(x3, x4), e)
        let pattern = mul(Expression::var(0), e());
        let subject = mul(mul(Expression::var(3), Expression::var(4)), e());
        let a = match_pattern(&pattern, &subject, 1).unwrap();
        assert_eq!(a.get(0), Some(&mul(Expression::var(3), Expression::var(4))));
    }

    #[test]
    fn test_match_respects_repeated_variables() {
        let pattern = mul(Expression::var(0), Expression::var(0));
        assert!(match_pattern(&pattern, &mul(e(), e()), 1).is_some());
        assert!(match_pattern(&pattern, &mul(e(), Expression::var(0)), 1).is_none());
    }

    #[test]
    fn test_match_does_not_instantiate_subject() {
        // a subject variable is not a wildcard
        let pattern = mul(Expression::var(0), e());
        let subject = mul(Expression::var(0), Expression::var(1));
        assert!(match_pattern(&pattern, &subject, 1).is_none());
    }

    #[test]
    fn test_bare_variable_matches_anything_once() {
        let subject = mul(Expression::var(2), e());
        let a = match_pattern(&Expression::var(0), &subject, 1).unwrap();
        assert_eq!(a.bound_count(), 1);
        assert_eq!(a.get(0), Some(&subject));
    }

    #[test]
    fn test_constant_mismatch() {
        assert!(match_pattern(&e(), &Expression::Const(SymbolId(2)), 0).is_none());
        assert!(match_pattern(&e(), &Expression::var(0), 0).is_none());
    }
}
