//! Model contexts
//!
//! A model context is the immutable symbol table of one theory (function
//! and constant symbols with fixed arities) together with its axioms.
//! Symbol ids are assigned in definition order.
//!
//! Contexts are usually loaded from JSON:
//!
//! ```json
//! {
//!     "name": "group-theory",
//!     "definitions": [
//!         { "name": "*", "arity": 2 },
//!         { "name": "e", "arity": 0 },
//!         { "name": "i", "arity": 1 }
//!     ],
//!     "axioms": [
//!         "*(x, e) = x",
//!         "*(x, i(x)) = e",
//!         "*(*(x, y), z) = *(x, *(y, z))"
//!     ]
//! }
//! ```

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{AtpError, AtpResult, ErrorCode};
use crate::atp_bail;
use super::expr::{Expression, SymbolId};
use super::parser::{self, is_ident_char};
use super::statement::Statement;

/// One symbol definition in a context file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDefinition {
    pub name: String,
    pub arity: usize,
}

/// Serialized form of a model context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextDefinition {
    pub name: String,
    #[serde(default)]
    pub definitions: Vec<SymbolDefinition>,
    #[serde(default)]
    pub axioms: Vec<String>,
}

/// Immutable symbol table and axiom list for one theory
#[derive(Debug, Clone)]
pub struct ModelContext {
    name: String,
    symbols: IndexMap<String, usize>,
    axioms: Vec<Statement>,
}

impl ModelContext {
    /// Build a context, validating symbols and parsing axioms
    pub fn from_definition(def: &ContextDefinition) -> AtpResult<Self> {
        if def.name.trim().is_empty() {
            atp_bail!(ErrorCode::InvalidContext, "context name cannot be empty");
        }

        let mut symbols = IndexMap::with_capacity(def.definitions.len());
        for sym in &def.definitions {
            if sym.name.is_empty() || !sym.name.chars().all(is_ident_char) {
                atp_bail!(ErrorCode::InvalidContext, "invalid symbol name '{}'", sym.name);
            }
            if is_variable_name(&sym.name) {
                return Err(AtpError::new(
                    ErrorCode::InvalidContext,
                    format!("symbol name '{}' is reserved for free variables", sym.name),
                ));
            }
            if symbols.insert(sym.name.clone(), sym.arity).is_some() {
                return Err(AtpError::new(
                    ErrorCode::DuplicateSymbol,
                    format!("symbol '{}' is defined more than once", sym.name),
                )
                .with_context("context", def.name.as_str()));
            }
        }

        let mut ctx = ModelContext {
            name: def.name.clone(),
            symbols,
            axioms: Vec::new(),
        };

        let mut axioms = Vec::with_capacity(def.axioms.len());
        for text in &def.axioms {
            let stmt = parser::parse_statement(&ctx, text)
                .map_err(|e| e.with_context("axiom", text.as_str()))?;
            axioms.push(stmt);
        }
        ctx.axioms = axioms;
        Ok(ctx)
    }

    /// Parse a context from JSON text
    pub fn from_json(json: &str) -> AtpResult<Self> {
        let def: ContextDefinition = serde_json::from_str(json)?;
        Self::from_definition(&def)
    }

    /// Load a context from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> AtpResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AtpError::from(e)
                .with_code(ErrorCode::InvalidContext)
                .with_context("path", path.display().to_string())
        })?;
        Self::from_json(&content).map_err(|e| e.with_context("path", path.display().to_string()))
    }

    /// Serializable definition of this context
    pub fn to_definition(&self) -> ContextDefinition {
        ContextDefinition {
            name: self.name.clone(),
            definitions: self
                .symbols
                .iter()
                .map(|(name, arity)| SymbolDefinition { name: name.clone(), arity: *arity })
                .collect(),
            axioms: self.axioms.iter().map(|a| a.to_text(self)).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_symbols(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbol_id(&self, name: &str) -> Option<SymbolId> {
        self.symbols.get_index_of(name).map(|i| SymbolId(i as u32))
    }

    pub fn symbol_name(&self, id: SymbolId) -> Option<&str> {
        self.symbols.get_index(id.index()).map(|(name, _)| name.as_str())
    }

    pub fn arity(&self, id: SymbolId) -> Option<usize> {
        self.symbols.get_index(id.index()).map(|(_, arity)| *arity)
    }

    /// All symbols as `(id, name, arity)` in definition order
    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &str, usize)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, (name, arity))| (SymbolId(i as u32), name.as_str(), *arity))
    }

    /// Ids of all constant (0-arity) symbols
    pub fn constants(&self) -> Vec<SymbolId> {
        self.symbols()
            .filter(|(_, _, arity)| *arity == 0)
            .map(|(id, _, _)| id)
            .collect()
    }

    pub fn axioms(&self) -> &[Statement] {
        &self.axioms
    }

    /// Build a constant expression
    pub fn constant(&self, id: SymbolId) -> AtpResult<Expression> {
        self.make(id, Vec::new())
    }

    /// Build a function application
    pub fn apply(&self, id: SymbolId, args: Vec<Expression>) -> AtpResult<Expression> {
        self.make(id, args)
    }

    /// Build the expression for `id` applied to `args`, checking the symbol
    /// is registered and the argument count matches its arity.
    pub fn make(&self, id: SymbolId, args: Vec<Expression>) -> AtpResult<Expression> {
        let (name, arity) = self
            .symbols
            .get_index(id.index())
            .ok_or_else(|| AtpError::unknown_symbol(id.index()))?;
        if *arity != args.len() {
            return Err(AtpError::arity_mismatch(name, *arity, args.len()));
        }
        if let Some(bad) = args.iter().find_map(|a| self.first_unknown(a)) {
            return Err(AtpError::unknown_symbol(bad.index()));
        }
        if args.is_empty() {
            Ok(Expression::Const(id))
        } else {
            Ok(Expression::apply_unchecked(id, args))
        }
    }

    fn first_unknown(&self, expr: &Expression) -> Option<SymbolId> {
        match expr.head() {
            Some(h) if h.index() >= self.symbols.len() => Some(h),
            _ => expr.args().iter().find_map(|a| self.first_unknown(a)),
        }
    }

    pub fn parse_statement(&self, text: &str) -> AtpResult<Statement> {
        parser::parse_statement(self, text)
    }

    pub fn parse_statements(&self, text: &str) -> AtpResult<Vec<Statement>> {
        parser::parse_statements(self, text)
    }

    pub fn parse_expression(&self, text: &str) -> AtpResult<Expression> {
        parser::parse_expression(self, text)
    }

    /// Parse a statement and render its canonical form
    pub fn normalize(&self, text: &str) -> AtpResult<String> {
        Ok(self.parse_statement(text)?.canonical().to_text(self))
    }
}

/// `x` followed by digits, the form free variables are printed in
fn is_variable_name(name: &str) -> bool {
    name.len() > 1
        && name.starts_with('x')
        && name[1..].chars().all(|c| c.is_ascii_digit())
}
