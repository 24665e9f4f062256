//! Expression representation
//!
//! Expressions are immutable trees built from free variables, constant
//! symbols and function applications. Application nodes are reference
//! counted, so cloning an expression is cheap and rewrites share every
//! subtree they do not touch.
//!
//! Symbol ids are only meaningful relative to the [`ModelContext`] that
//! issued them; checked construction lives on the context.
//!
//! [`ModelContext`]: super::context::ModelContext

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::ModelContext;
use super::matching::Assignment;

/// Index of a function or constant symbol in its model context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Path from the root of an expression to a sub-expression (child indices)
pub type ExprPath = Vec<usize>;

/// An immutable equational expression
#[derive(Debug, Clone, Hash)]
pub enum Expression {
    /// A free variable, numbered within its statement
    Var(u32),
    /// A constant (0-arity) symbol
    Const(SymbolId),
    /// A function symbol applied to its arguments
    Apply(Arc<Application>),
}

/// A function application node
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Application {
    size: usize,
    head: SymbolId,
    args: Vec<Expression>,
}

impl Expression {
    /// Create a free variable reference
    pub fn var(index: u32) -> Self {
        Expression::Var(index)
    }

    /// Build an application without consulting a context.
    ///
    /// Callers must already know that `args.len()` equals the arity of `head`.
    pub(crate) fn apply_unchecked(head: SymbolId, args: Vec<Expression>) -> Self {
        let size = 1 + args.iter().map(Expression::size).sum::<usize>();
        Expression::Apply(Arc::new(Application { size, head, args }))
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Expression::Var(_))
    }

    pub fn as_var(&self) -> Option<u32> {
        match self {
            Expression::Var(v) => Some(*v),
            _ => None,
        }
    }

    /// The head symbol, or `None` for a free variable
    pub fn head(&self) -> Option<SymbolId> {
        match self {
            Expression::Var(_) => None,
            Expression::Const(c) => Some(*c),
            Expression::Apply(app) => Some(app.head),
        }
    }

    /// Children of this node (empty for variables and constants)
    pub fn args(&self) -> &[Expression] {
        match self {
            Expression::Apply(app) => &app.args,
            _ => &[],
        }
    }

    /// Number of nodes in the tree
    pub fn size(&self) -> usize {
        match self {
            Expression::Apply(app) => app.size,
            _ => 1,
        }
    }

    /// Length of the longest root-to-leaf path, counting the root
    pub fn height(&self) -> usize {
        1 + self.args().iter().map(Expression::height).max().unwrap_or(0)
    }

    /// Whether the expression contains no free variables
    pub fn is_ground(&self) -> bool {
        match self {
            Expression::Var(_) => false,
            Expression::Const(_) => true,
            Expression::Apply(app) => app.args.iter().all(Expression::is_ground),
        }
    }

    /// Append the free variables of this expression to `out`, in pre-order of
    /// first appearance, skipping ones already present.
    pub fn collect_vars(&self, out: &mut Vec<u32>) {
        match self {
            Expression::Var(v) => {
                if !out.contains(v) {
                    out.push(*v);
                }
            }
            Expression::Const(_) => {}
            Expression::Apply(app) => {
                for arg in &app.args {
                    arg.collect_vars(out);
                }
            }
        }
    }

    /// Free variables in order of first appearance
    pub fn free_vars(&self) -> Vec<u32> {
        let mut vars = Vec::new();
        self.collect_vars(&mut vars);
        vars
    }

    /// Largest variable index, if any variable occurs
    pub fn max_var(&self) -> Option<u32> {
        match self {
            Expression::Var(v) => Some(*v),
            Expression::Const(_) => None,
            Expression::Apply(app) => app.args.iter().filter_map(Expression::max_var).max(),
        }
    }

    /// Sub-expression at `path`
    pub fn subexpr(&self, path: &[usize]) -> Option<&Expression> {
        let mut node = self;
        for &i in path {
            node = node.args().get(i)?;
        }
        Some(node)
    }

    /// Copy of this expression with the node at `path` replaced.
    ///
    /// Only the spine from the root to `path` is rebuilt.
    pub fn replace_at(&self, path: &[usize], replacement: Expression) -> Option<Expression> {
        match path.split_first() {
            None => Some(replacement),
            Some((&i, rest)) => {
                let app = match self {
                    Expression::Apply(app) => app,
                    _ => return None,
                };
                let child = app.args.get(i)?.replace_at(rest, replacement)?;
                let mut args = app.args.clone();
                args[i] = child;
                Some(Expression::apply_unchecked(app.head, args))
            }
        }
    }

    /// Replace every variable bound in `assignment`.
    ///
    /// Unbound variables are kept. Subtrees without bound variables are
    /// shared with the source.
    pub fn substitute(&self, assignment: &Assignment) -> Expression {
        self.substitute_changed(assignment)
            .unwrap_or_else(|| self.clone())
    }

    fn substitute_changed(&self, assignment: &Assignment) -> Option<Expression> {
        match self {
            Expression::Var(v) => assignment.get(*v).cloned(),
            Expression::Const(_) => None,
            Expression::Apply(app) => {
                let mut changed: Option<Vec<Expression>> = None;
                for (i, arg) in app.args.iter().enumerate() {
                    if let Some(new_arg) = arg.substitute_changed(assignment) {
                        let args = changed.get_or_insert_with(|| app.args.clone());
                        args[i] = new_arg;
                    }
                }
                changed.map(|args| Expression::apply_unchecked(app.head, args))
            }
        }
    }

    /// Rename variables through `renaming`, allocating new indices on first
    /// sight.
    pub(crate) fn renumber(&self, renaming: &mut Renaming) -> Expression {
        self.renumber_changed(renaming)
            .unwrap_or_else(|| self.clone())
    }

    fn renumber_changed(&self, renaming: &mut Renaming) -> Option<Expression> {
        match self {
            Expression::Var(v) => {
                let new = renaming.map(*v);
                (new != *v).then_some(Expression::Var(new))
            }
            Expression::Const(_) => None,
            Expression::Apply(app) => {
                let mut changed: Option<Vec<Expression>> = None;
                for (i, arg) in app.args.iter().enumerate() {
                    if let Some(new_arg) = arg.renumber_changed(renaming) {
                        let args = changed.get_or_insert_with(|| app.args.clone());
                        args[i] = new_arg;
                    }
                }
                changed.map(|args| Expression::apply_unchecked(app.head, args))
            }
        }
    }

    /// Pre-order paths of every node, the root first
    pub fn paths(&self) -> Vec<ExprPath> {
        let mut out = Vec::with_capacity(self.size());
        let mut stack = vec![Vec::new()];
        while let Some(path) = stack.pop() {
            if let Some(node) = self.subexpr(&path) {
                for i in (0..node.args().len()).rev() {
                    let mut child = path.clone();
                    child.push(i);
                    stack.push(child);
                }
            }
            out.push(path);
        }
        out
    }

    /// Render with the symbol names of `ctx`
    pub fn display<'a>(&'a self, ctx: &'a ModelContext) -> ExprDisplay<'a> {
        ExprDisplay { expr: self, ctx }
    }

    fn rank(&self) -> u8 {
        match self {
            Expression::Var(_) => 0,
            Expression::Const(_) => 1,
            Expression::Apply(_) => 2,
        }
    }

    fn cmp_structure(&self, other: &Expression) -> Ordering {
        match (self, other) {
            (Expression::Var(a), Expression::Var(b)) => a.cmp(b),
            (Expression::Const(a), Expression::Const(b)) => a.cmp(b),
            (Expression::Apply(a), Expression::Apply(b)) => {
                if Arc::ptr_eq(a, b) {
                    return Ordering::Equal;
                }
                a.head
                    .cmp(&b.head)
                    .then_with(|| a.args.len().cmp(&b.args.len()))
                    .then_with(|| a.args.iter().cmp(b.args.iter()))
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expression::Var(a), Expression::Var(b)) => a == b,
            (Expression::Const(a), Expression::Const(b)) => a == b,
            (Expression::Apply(a), Expression::Apply(b)) => Arc::ptr_eq(a, b) || **a == **b,
            _ => false,
        }
    }
}

impl Eq for Expression {}

/// Total order: size first, then variables < constants < applications, then
/// symbol ids and children lexicographically.
impl Ord for Expression {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size()
            .cmp(&other.size())
            .then_with(|| self.cmp_structure(other))
    }
}

impl PartialOrd for Expression {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Variable renaming that hands out dense indices in order of first use
#[derive(Debug, Default)]
pub(crate) struct Renaming {
    map: Vec<Option<u32>>,
    next: u32,
}

impl Renaming {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn map(&mut self, var: u32) -> u32 {
        let slot = var as usize;
        if slot >= self.map.len() {
            self.map.resize(slot + 1, None);
        }
        match self.map[slot] {
            Some(v) => v,
            None => {
                let v = self.next;
                self.map[slot] = Some(v);
                self.next += 1;
                v
            }
        }
    }

    /// Number of distinct variables seen so far
    pub(crate) fn count(&self) -> u32 {
        self.next
    }
}

/// Display adapter pairing an expression with its context
pub struct ExprDisplay<'a> {
    expr: &'a Expression,
    ctx: &'a ModelContext,
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.expr {
            Expression::Var(v) => write!(f, "x{}", v),
            Expression::Const(c) => write!(f, "{}", self.ctx.symbol_name(*c).unwrap_or("?")),
            Expression::Apply(app) => {
                write!(f, "{}(", self.ctx.symbol_name(app.head).unwrap_or("?"))?;
                for (i, arg) in app.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg.display(self.ctx))?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MUL: SymbolId = SymbolId(0);
    const INV: SymbolId = SymbolId(2);

    fn mul(a: Expression, b: Expression) -> Expression {
        Expression::apply_unchecked(MUL, vec![a, b])
    }

    fn inv(a: Expression) -> Expression {
        Expression::apply_unchecked(INV, vec![a])
    }

    #[test]
    fn test_size_and_height() {
        let e = mul(Expression::var(0), inv(Expression::var(1)));
        assert_eq!(e.size(), 4);
        assert_eq!(e.height(), 3);
        assert!(!e.is_ground());
        assert!(Expression::Const(SymbolId(1)).is_ground());
    }

    #[test]
    fn test_subexpr_and_replace() {
        let e = mul(Expression::var(0), inv(Expression::var(1)));
        assert_eq!(e.subexpr(&[1, 0]), Some(&Expression::var(1)));
        assert_eq!(e.subexpr(&[2]), None);

        let replaced = e.replace_at(&[1], Expression::var(0)).unwrap();
        assert_eq!(replaced, mul(Expression::var(0), Expression::var(0)));
        // the untouched left child is shared, not copied
        assert_eq!(replaced.args()[0], e.args()[0]);
        assert!(Expression::var(0).replace_at(&[0], Expression::var(1)).is_none());
    }

    #[test]
    fn test_substitute_leaves_source_untouched() {
        let e = mul(Expression::var(0), Expression::var(1));
        let mut a = Assignment::with_slots(2);
        a.bind(0, inv(Expression::var(5)));
        let s = e.substitute(&a);
        assert_eq!(s, mul(inv(Expression::var(5)), Expression::var(1)));
        assert_eq!(e, mul(Expression::var(0), Expression::var(1)));
    }

    #[test]
    fn test_paths_preorder() {
        let e = mul(Expression::var(0), inv(Expression::var(1)));
        let paths = e.paths();
        assert_eq!(paths, vec![vec![], vec![0], vec![1], vec![1, 0]]);
    }

    #[test]
    fn test_order_is_size_first() {
        let small = mul(Expression::var(0), Expression::var(1));
        let big = mul(Expression::var(0), inv(Expression::var(1)));
        assert!(small < big);
        assert!(Expression::var(3) < Expression::Const(SymbolId(0)));
        assert_eq!(big.cmp(&big.clone()), Ordering::Equal);
    }

    #[test]
    fn test_collect_vars_first_appearance() {
        let e = mul(Expression::var(3), mul(Expression::var(1), Expression::var(3)));
        let mut vars = Vec::new();
        e.collect_vars(&mut vars);
        assert_eq!(vars, vec![3, 1]);
        assert_eq!(e.max_var(), Some(3));
    }

    #[test]
    fn test_renumber_dense() {
        let e = mul(Expression::var(7), Expression::var(2));
        let mut r = Renaming::new();
        assert_eq!(e.renumber(&mut r), mul(Expression::var(0), Expression::var(1)));
        assert_eq!(r.count(), 2);
    }
}
