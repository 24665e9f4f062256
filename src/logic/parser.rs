//! Statement text parser
//!
//! Grammar (whitespace insensitive, `#` starts a comment running to the end
//! of the line):
//!
//! ```text
//! statement  := expr '=' expr
//! expr       := ident | ident '(' expr (',' expr)* ')'
//! ident      := [A-Za-z0-9+\-*/._?^%&]+
//! ```
//!
//! Identifiers registered in the context are symbols and must be used with
//! their exact arity. Any other identifier used without arguments is a free
//! variable; used with arguments it is an undefined symbol.

use nom::{
    IResult,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::opt,
    multi::separated_list1,
    sequence::{delimited, preceded},
};

use crate::error::{AtpError, AtpResult};
use super::context::ModelContext;
use super::expr::Expression;
use super::statement::Statement;

/// Characters allowed in identifiers
pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '+' | '-' | '*' | '/' | '.' | '_' | '?' | '^' | '%' | '&')
}

/// Unresolved syntax tree
#[derive(Debug)]
struct RawExpr<'a> {
    name: &'a str,
    args: Option<Vec<RawExpr<'a>>>,
}

fn ident(input: &str) -> IResult<&str, &str> {
    preceded(multispace0, take_while1(is_ident_char))(input)
}

fn raw_expr(input: &str) -> IResult<&str, RawExpr<'_>> {
    let (input, name) = ident(input)?;
    let (input, args) = opt(delimited(
        preceded(multispace0, char('(')),
        separated_list1(preceded(multispace0, char(',')), raw_expr),
        preceded(multispace0, char(')')),
    ))(input)?;
    Ok((input, RawExpr { name, args }))
}

fn raw_statement(input: &str) -> IResult<&str, (RawExpr<'_>, RawExpr<'_>)> {
    let (input, lhs) = raw_expr(input)?;
    let (input, _) = preceded(multispace0, char('='))(input)?;
    let (input, rhs) = raw_expr(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, (lhs, rhs)))
}

/// Strip a trailing `#` comment
fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

/// Resolves raw identifiers against a context, numbering free variables
struct Resolver<'c, 'a> {
    ctx: &'c ModelContext,
    vars: Vec<&'a str>,
}

impl<'c, 'a> Resolver<'c, 'a> {
    fn new(ctx: &'c ModelContext) -> Self {
        Resolver { ctx, vars: Vec::new() }
    }

    fn resolve(&mut self, raw: &RawExpr<'a>) -> AtpResult<Expression> {
        let given = raw.args.as_ref().map_or(0, Vec::len);

        match self.ctx.symbol_id(raw.name) {
            Some(id) => {
                let arity = self.ctx.arity(id).unwrap_or(0);
                if arity != given {
                    return Err(AtpError::arity_mismatch(raw.name, arity, given));
                }
                let args = match &raw.args {
                    Some(args) => args
                        .iter()
                        .map(|a| self.resolve(a))
                        .collect::<AtpResult<Vec<_>>>()?,
                    None => Vec::new(),
                };
                self.ctx.make(id, args)
            }
            None if raw.args.is_some() => Err(AtpError::undefined_symbol(raw.name)),
            None => {
                let index = match self.vars.iter().position(|v| *v == raw.name) {
                    Some(i) => i,
                    None => {
                        self.vars.push(raw.name);
                        self.vars.len() - 1
                    }
                };
                Ok(Expression::var(index as u32))
            }
        }
    }
}

fn syntax_error(text: &str, rest: &str, what: &str) -> AtpError {
    let position = text.len() - rest.len();
    AtpError::syntax(format!("{} at position {}", what, position))
        .with_context("input", text.trim())
}

/// Parse a single statement
pub fn parse_statement(ctx: &ModelContext, text: &str) -> AtpResult<Statement> {
    let body = strip_comment(text);
    let (rest, (lhs, rhs)) = raw_statement(body).map_err(|e| match e {
        nom::Err::Error(err) | nom::Err::Failure(err) => {
            syntax_error(body, err.input, "expected 'expr = expr'")
        }
        nom::Err::Incomplete(_) => AtpError::syntax("unexpected end of input"),
    })?;
    if !rest.is_empty() {
        return Err(syntax_error(body, rest, "unexpected trailing input"));
    }

    let mut resolver = Resolver::new(ctx);
    let lhs = resolver.resolve(&lhs)?;
    let rhs = resolver.resolve(&rhs)?;
    Ok(Statement::new(lhs, rhs))
}

/// Parse a single expression
pub fn parse_expression(ctx: &ModelContext, text: &str) -> AtpResult<Expression> {
    let body = strip_comment(text);
    let (rest, raw) = raw_expr(body).map_err(|_| syntax_error(body, body, "expected expression"))?;
    let (rest, _) = multispace0::<&str, nom::error::Error<&str>>(rest)
        .map_err(|_| AtpError::syntax("unexpected end of input"))?;
    if !rest.is_empty() {
        return Err(syntax_error(body, rest, "unexpected trailing input"));
    }
    Resolver::new(ctx).resolve(&raw)
}

/// Parse one statement per line, skipping blank and comment-only lines
pub fn parse_statements(ctx: &ModelContext, text: &str) -> AtpResult<Vec<Statement>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !strip_comment(line).trim().is_empty())
        .map(|(n, line)| {
            parse_statement(ctx, line).map_err(|e| e.with_context("line", (n + 1).to_string()))
        })
        .collect()
}
