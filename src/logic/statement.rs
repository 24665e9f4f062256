//! Equational statements
//!
//! A statement is a universally quantified equality `lhs = rhs`. Free
//! variables are always numbered `0..k` in order of first appearance (left
//! side first, pre-order), so renamed copies of a statement compare equal.
//!
//! Because equality is symmetric, duplicate detection goes through
//! [`Statement::canonical`], which also fixes the orientation.

use std::fmt;

use super::context::ModelContext;
use super::expr::{ExprPath, Expression, Renaming};

/// Which side of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Lhs,
    Rhs,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Lhs => "lhs",
            Side::Rhs => "rhs",
        }
    }
}

/// A universally quantified equality between two expressions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Statement {
    lhs: Expression,
    rhs: Expression,
    num_vars: u32,
}

impl Statement {
    /// Build a statement, renumbering its free variables
    pub fn new(lhs: Expression, rhs: Expression) -> Self {
        let mut renaming = Renaming::new();
        let lhs = lhs.renumber(&mut renaming);
        let rhs = rhs.renumber(&mut renaming);
        Statement {
            lhs,
            rhs,
            num_vars: renaming.count(),
        }
    }

    pub fn lhs(&self) -> &Expression {
        &self.lhs
    }

    pub fn rhs(&self) -> &Expression {
        &self.rhs
    }

    pub fn side(&self, side: Side) -> &Expression {
        match side {
            Side::Lhs => &self.lhs,
            Side::Rhs => &self.rhs,
        }
    }

    /// Number of distinct free variables
    pub fn num_vars(&self) -> usize {
        self.num_vars as usize
    }

    /// Total node count of both sides
    pub fn size(&self) -> usize {
        self.lhs.size() + self.rhs.size()
    }

    /// Whether both sides are the same expression
    pub fn is_reflexive(&self) -> bool {
        self.lhs == self.rhs
    }

    /// Swap the two sides (sound because equality is symmetric)
    pub fn transpose(&self) -> Statement {
        Statement::new(self.rhs.clone(), self.lhs.clone())
    }

    /// Orientation-independent normal form
    ///
    /// Of the two orientations, the one whose renumbered `(lhs, rhs)` pair is
    /// smaller under the expression order wins. Idempotent.
    pub fn canonical(&self) -> Statement {
        let flipped = self.transpose();
        if flipped < *self {
            flipped
        } else {
            self.clone()
        }
    }

    pub fn is_canonical(&self) -> bool {
        *self == self.canonical()
    }

    /// Equality up to variable renaming and orientation
    pub fn alpha_eq(&self, other: &Statement) -> bool {
        self == other || self.canonical() == other.canonical()
    }

    /// Copy with the node at `path` on `side` replaced, variables renumbered
    pub fn replace_at(&self, side: Side, path: &[usize], replacement: Expression) -> Option<Statement> {
        let (lhs, rhs) = match side {
            Side::Lhs => (self.lhs.replace_at(path, replacement)?, self.rhs.clone()),
            Side::Rhs => (self.lhs.clone(), self.rhs.replace_at(path, replacement)?),
        };
        Some(Statement::new(lhs, rhs))
    }

    /// Pre-order positions over the left side, then the right side
    pub fn positions(&self) -> Vec<(Side, ExprPath)> {
        self.lhs
            .paths()
            .into_iter()
            .map(|p| (Side::Lhs, p))
            .chain(self.rhs.paths().into_iter().map(|p| (Side::Rhs, p)))
            .collect()
    }

    /// Distinct free variables as expressions, `x0..xk`
    pub fn var_exprs(&self) -> impl Iterator<Item = Expression> {
        (0..self.num_vars).map(Expression::var)
    }

    /// Render with the symbol names of `ctx`
    pub fn display<'a>(&'a self, ctx: &'a ModelContext) -> StatementDisplay<'a> {
        StatementDisplay { stmt: self, ctx }
    }

    /// Canonical text, e.g. `*(x0, e) = x0`
    pub fn to_text(&self, ctx: &ModelContext) -> String {
        self.display(ctx).to_string()
    }
}

/// Display adapter pairing a statement with its context
pub struct StatementDisplay<'a> {
    stmt: &'a Statement,
    ctx: &'a ModelContext,
}

impl fmt::Display for StatementDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = {}",
            self.stmt.lhs.display(self.ctx),
            self.stmt.rhs.display(self.ctx)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::expr::SymbolId;
    use crate::logic::fixtures::group_theory;
    use proptest::prelude::*;

    fn mul(a: Expression, b: Expression) -> Expression {
        Expression::apply_unchecked(SymbolId(0), vec![a, b])
    }

    fn inv(a: Expression) -> Expression {
        Expression::apply_unchecked(SymbolId(2), vec![a])
    }

    fn e() -> Expression {
        Expression::Const(SymbolId(1))
    }

    #[test]
    fn test_variables_renumbered_on_construction() {
        let s = Statement::new(mul(Expression::var(5), Expression::var(2)), Expression::var(5));
        assert_eq!(s.lhs(), &mul(Expression::var(0), Expression::var(1)));
        assert_eq!(s.rhs(), &Expression::var(0));
        assert_eq!(s.num_vars(), 2);
    }

    #[test]
    fn test_renamed_statements_are_equal() {
        let a = Statement::new(mul(Expression::var(0), e()), Expression::var(0));
        let b = Statement::new(mul(Expression::var(9), e()), Expression::var(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_canonical_orientation_independent() {
        let a = Statement::new(mul(Expression::var(0), e()), Expression::var(0));
        let b = Statement::new(Expression::var(0), mul(Expression::var(0), e()));
        assert_ne!(a, b);
        assert_eq!(a.canonical(), b.canonical());
        assert!(a.alpha_eq(&b));
        // smaller side goes first
        assert_eq!(a.canonical().lhs(), &Expression::var(0));
    }

    #[test]
    fn test_transpose_swaps_and_renumbers() {
        let s = Statement::new(mul(Expression::var(0), Expression::var(1)), Expression::var(1));
        let t = s.transpose();
        assert_eq!(t.lhs(), &Expression::var(0));
        assert_eq!(t.rhs(), &mul(Expression::var(1), Expression::var(0)));
    }

    #[test]
    fn test_display_uses_context_names() {
        let ctx = group_theory();
        let s = Statement::new(mul(Expression::var(0), inv(Expression::var(0))), e());
        assert_eq!(s.to_text(&ctx), "*(x0, i(x0)) = e");
    }

    #[test]
    fn test_positions_cover_both_sides() {
        let s = Statement::new(mul(Expression::var(0), e()), Expression::var(0));
        let positions = s.positions();
        assert_eq!(positions.len(), 4);
        assert_eq!(positions[0], (Side::Lhs, vec![]));
        assert_eq!(positions[3], (Side::Rhs, vec![]));
    }

    fn arb_expr() -> impl Strategy<Value = Expression> {
        let leaf = prop_oneof![
            (0u32..4).prop_map(Expression::var),
            Just(e()),
        ];
        leaf.prop_recursive(4, 24, 2, |inner| {
            prop_oneof![
                (inner.clone(), inner.clone()).prop_map(|(a, b)| mul(a, b)),
                inner.prop_map(inv),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_canonical_idempotent(a in arb_expr(), b in arb_expr()) {
            let c = Statement::new(a, b).canonical();
            prop_assert_eq!(c.canonical(), c);
        }

        #[test]
        fn prop_canonical_orientation_independent(a in arb_expr(), b in arb_expr()) {
            let ab = Statement::new(a.clone(), b.clone()).canonical();
            let ba = Statement::new(b, a).canonical();
            prop_assert_eq!(ab, ba);
        }
    }
}
