//! The example language driver
//!
//! A deliberately tiny front-end that exercises the whole driver contract:
//! it parses files of global definitions, forward-declares each one, and
//! compiles initializer expressions lazily from the resolver so that
//! references between globals (including cycles) flow through the
//! resolution stack.
//!
//! The grammar is one definition per line:
//!
//! ```text
//! # comment
//! answer = 41 + 1
//! export doubled = answer * 2
//! ```
//!
//! Every value is a signed machine integer. Names refer to other globals in
//! the same file.

use crate::driver::{Context, Driver, VersionInfo};
use crate::errors::{self, ErrorKind};
use crate::mediator::Lifetime;
use crate::ops::BinaryOp;
use crate::sema::{self, Tag};
use crate::tree::{Attributes, Resolver, TreeContext, TreeId};
use crate::types::{Sign, Width};
use cthulhu_core::reports::Severity;
use cthulhu_core::scan::{ScanRef, Span};
use num_bigint::BigInt;
use std::rc::Rc;

pub struct ExampleDriver;

impl Driver for ExampleDriver {
    fn id(&self) -> &str {
        "example"
    }

    fn display_name(&self) -> &str {
        "Example"
    }

    fn version(&self) -> VersionInfo {
        VersionInfo::new(1, 0, 1)
    }

    fn extensions(&self) -> &[&str] {
        &["e", "example"]
    }

    fn create(&self, lifetime: &mut Lifetime) {
        // the driver's builtin root module, registered once at load
        let Some(me) = lifetime.language_for("e") else {
            return;
        };
        let root = lifetime.tcx.module_root(Span::builtin(), "lang", 0);
        let ctx = Context::new(me, vec!["example".into(), "lang".into()], root);
        lifetime.add_context(ctx);
    }

    fn parse(&self, lifetime: &mut Lifetime, scan: ScanRef) {
        let stem = scan
            .path()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "module".to_string());
        let Some(me) = lifetime.language_for("e") else {
            return;
        };

        let root = lifetime
            .tcx
            .module_root(Span::point(scan.clone(), 1, 0), stem.clone(), 0);
        let mut ctx = Context::new(me, vec![stem], root);
        ctx.scan = Some(scan.clone());
        match parse_source(scan.text()) {
            Ok(ast) => ctx.ast = Some(Box::new(ast)),
            Err(err) => {
                lifetime.reports().report(
                    Severity::Error,
                    Some(Span::point(scan, err.line, err.column)),
                    err.message,
                );
            }
        }
        lifetime.add_context(ctx);
    }

    fn forward_symbols(&self, tcx: &mut TreeContext, ctx: &mut Context) {
        let Some(scan) = ctx.scan.clone() else {
            return;
        };
        let Some(ast) = ctx.ast_ref::<Ast>() else {
            return;
        };
        let defs: Vec<GlobalDef> = ast.globals.clone();
        let root = ctx.root;
        let int = tcx.types.digit(Sign::Signed, Width::Int);

        for def in defs {
            let span = Span::point(scan.clone(), def.line, def.column);
            let expr = def.expr.clone();
            let expr_scan = scan.clone();
            let decl = tcx.open_global(
                span.clone(),
                def.name.clone(),
                int,
                Resolver::new(move |tcx, id| {
                    let init = compile_expr(tcx, root, &expr_scan, &expr);
                    tcx.close_global(id, Some(init));
                }),
            );
            if def.export {
                tcx.set_attribs(decl, Attributes::exported());
            }
            if let Some(existing) = tcx.module_add(root, Tag::Values, &def.name, decl) {
                let previous = tcx.span_of(existing);
                errors::report_redefinition(&tcx.reports, &def.name, span, previous);
            }
        }
    }
}

/// Compile one initializer expression against the module namespace
fn compile_expr(tcx: &mut TreeContext, root: TreeId, scan: &ScanRef, expr: &Expr) -> TreeId {
    match expr {
        Expr::Digit { value, line, column } => {
            let span = Span::point(scan.clone(), *line, *column);
            let int = tcx.types.digit(Sign::Signed, Width::Int);
            tcx.digit_literal(span, int, value.clone())
        }
        Expr::Name { name, line, column } => {
            let span = Span::point(scan.clone(), *line, *column);
            match tcx.module_lookup(root, Tag::Values, name) {
                Some(decl) => {
                    let resolved = sema::resolve(tcx, decl);
                    tcx.name(span, resolved)
                }
                None => {
                    errors::report(
                        &tcx.reports,
                        ErrorKind::UndefinedReference,
                        span.clone(),
                        format!("`{}` is not defined", name),
                    );
                    tcx.error(span, "undefined reference")
                }
            }
        }
        Expr::Binary {
            op,
            lhs,
            rhs,
            line,
            column,
        } => {
            let span = Span::point(scan.clone(), *line, *column);
            let lhs = compile_expr(tcx, root, scan, lhs);
            let rhs = compile_expr(tcx, root, scan, rhs);
            tcx.binary(span, *op, lhs, rhs)
        }
    }
}

// ---------------------------------------------------------------------------
// parsing

/// Parsed translation unit
struct Ast {
    globals: Vec<GlobalDef>,
}

#[derive(Clone)]
struct GlobalDef {
    name: String,
    export: bool,
    expr: Rc<Expr>,
    line: u32,
    column: u32,
}

enum Expr {
    Digit {
        value: BigInt,
        line: u32,
        column: u32,
    },
    Name {
        name: String,
        line: u32,
        column: u32,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        line: u32,
        column: u32,
    },
}

struct ParseError {
    line: u32,
    column: u32,
    message: String,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    text: String,
    line: u32,
    column: u32,
}

fn parse_source(source: &str) -> Result<Ast, ParseError> {
    let mut globals = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let line = index as u32 + 1;
        // strip comments
        let text = raw.split('#').next().unwrap_or("");
        if text.trim().is_empty() {
            continue;
        }
        let tokens = tokenize_line(text, line)?;
        globals.push(parse_def(&tokens, line)?);
    }
    Ok(Ast { globals })
}

fn tokenize_line(text: &str, line: u32) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let column = start as u32;
        if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token {
                text: digits,
                line,
                column,
            });
        } else if c.is_alphabetic() || c == '_' {
            let mut word = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    word.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token {
                text: word,
                line,
                column,
            });
        } else if matches!(c, '=' | '+' | '-' | '*' | '(' | ')') {
            chars.next();
            tokens.push(Token {
                text: c.to_string(),
                line,
                column,
            });
        } else {
            return Err(ParseError {
                line,
                column,
                message: format!("unexpected character `{}`", c),
            });
        }
    }
    Ok(tokens)
}

/// `[export] name = expr`
fn parse_def(tokens: &[Token], line: u32) -> Result<GlobalDef, ParseError> {
    let mut pos = 0;
    let export = tokens.first().is_some_and(|t| t.text == "export");
    if export {
        pos += 1;
    }

    let name = tokens.get(pos).ok_or_else(|| ParseError {
        line,
        column: 0,
        message: "expected a definition name".to_string(),
    })?;
    pos += 1;

    match tokens.get(pos) {
        Some(eq) if eq.text == "=" => pos += 1,
        other => {
            let column = other.map_or(name.column, |t| t.column);
            return Err(ParseError {
                line,
                column,
                message: format!("expected `=` after `{}`", name.text),
            });
        }
    }

    let (expr, rest) = parse_expr(&tokens[pos..], line)?;
    if let Some(extra) = rest.first() {
        return Err(ParseError {
            line,
            column: extra.column,
            message: format!("unexpected `{}` after the definition", extra.text),
        });
    }

    Ok(GlobalDef {
        name: name.text.clone(),
        export,
        expr: Rc::new(expr),
        line,
        column: name.column,
    })
}

/// `expr := term (('+' | '-') term)*`
fn parse_expr<'a>(tokens: &'a [Token], line: u32) -> Result<(Expr, &'a [Token]), ParseError> {
    let (mut lhs, mut rest) = parse_term(tokens, line)?;
    while let Some(op_token) = rest.first() {
        let op = match op_token.text.as_str() {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            _ => break,
        };
        let (rhs, after) = parse_term(&rest[1..], line)?;
        lhs = Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            line: op_token.line,
            column: op_token.column,
        };
        rest = after;
    }
    Ok((lhs, rest))
}

/// `term := factor ('*' factor)*`
fn parse_term<'a>(tokens: &'a [Token], line: u32) -> Result<(Expr, &'a [Token]), ParseError> {
    let (mut lhs, mut rest) = parse_factor(tokens, line)?;
    while let Some(op_token) = rest.first() {
        if op_token.text != "*" {
            break;
        }
        let (rhs, after) = parse_factor(&rest[1..], line)?;
        lhs = Expr::Binary {
            op: BinaryOp::Mul,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            line: op_token.line,
            column: op_token.column,
        };
        rest = after;
    }
    Ok((lhs, rest))
}

/// `factor := INT | IDENT | '(' expr ')'`
fn parse_factor<'a>(tokens: &'a [Token], line: u32) -> Result<(Expr, &'a [Token]), ParseError> {
    let Some(token) = tokens.first() else {
        return Err(ParseError {
            line,
            column: 0,
            message: "expected an expression".to_string(),
        });
    };

    if token.text == "(" {
        let (inner, rest) = parse_expr(&tokens[1..], line)?;
        match rest.first() {
            Some(close) if close.text == ")" => return Ok((inner, &rest[1..])),
            _ => {
                return Err(ParseError {
                    line,
                    column: token.column,
                    message: "unclosed `(`".to_string(),
                });
            }
        }
    }

    if token.text.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        let value: BigInt = token.text.parse().map_err(|_| ParseError {
            line,
            column: token.column,
            message: format!("`{}` is not a number", token.text),
        })?;
        return Ok((
            Expr::Digit {
                value,
                line: token.line,
                column: token.column,
            },
            &tokens[1..],
        ));
    }

    Ok((
        Expr::Name {
            name: token.text.clone(),
            line: token.line,
            column: token.column,
        },
        &tokens[1..],
    ))
}
