//! Textual dump of tree modules
//!
//! The tree-side counterpart of the SSA dump: renders resolved modules with
//! their declarations and bodies for the `--emit-tree` flag and for tests.
//! This is a debugging surface; nothing parses it back.

use crate::sema::Tag;
use crate::tree::{TreeContext, TreeId, TreeKind};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Render every module, in canonical-path order
pub fn render(tcx: &TreeContext, modules: &BTreeMap<String, TreeId>) -> String {
    let mut out = String::new();
    for (path, &module) in modules {
        render_module(&mut out, tcx, path, module);
    }
    out
}

fn render_module(out: &mut String, tcx: &TreeContext, path: &str, module: TreeId) {
    let _ = writeln!(out, "module {}", path);
    for tag in [Tag::Values, Tag::Types, Tag::Procs] {
        for (_, decl) in tcx.module_tag(module, tag) {
            render_decl(out, tcx, decl);
        }
    }
    out.push('\n');
    for (name, submodule) in tcx.module_tag(module, Tag::Modules) {
        render_module(out, tcx, &format!("{}.{}", path, name), submodule);
    }
}

fn render_decl(out: &mut String, tcx: &TreeContext, decl: TreeId) {
    let node = tcx.node(decl);
    let ty = tcx.types.display(node.ty);
    match &node.kind {
        TreeKind::Global { name, init } => match init {
            Some(init) => {
                let _ = writeln!(out, "  global {}: {} = {}", name, ty, render_expr(tcx, *init));
            }
            None => {
                let _ = writeln!(out, "  global {}: {}", name, ty);
            }
        },
        TreeKind::Function { name, body, .. } => match body {
            Some(body) => {
                let _ = writeln!(out, "  def {}: {} =", name, ty);
                render_stmt(out, tcx, *body, 2);
            }
            None => {
                let _ = writeln!(out, "  def {}: {}", name, ty);
            }
        },
        TreeKind::Resolve { name, expected, .. } => {
            let _ = writeln!(out, "  forward {}: {} ({})", name, ty, expected);
        }
        TreeKind::Error { message } => {
            let _ = writeln!(out, "  error {:?}", message);
        }
        _ => {
            let name = tcx.name_of(decl).unwrap_or("<unnamed>");
            let _ = writeln!(out, "  decl {}: {}", name, ty);
        }
    }
}

fn render_stmt(out: &mut String, tcx: &TreeContext, id: TreeId, indent: usize) {
    let pad = "  ".repeat(indent);
    match &tcx.node(id).kind {
        TreeKind::Stmts { stmts } => {
            let _ = writeln!(out, "{}{{", pad);
            for &stmt in stmts {
                render_stmt(out, tcx, stmt, indent + 1);
            }
            let _ = writeln!(out, "{}}}", pad);
        }
        TreeKind::Branch { cond, then, other } => {
            let _ = writeln!(out, "{}if {}", pad, render_expr(tcx, *cond));
            render_stmt(out, tcx, *then, indent + 1);
            if let Some(other) = other {
                let _ = writeln!(out, "{}else", pad);
                render_stmt(out, tcx, *other, indent + 1);
            }
        }
        TreeKind::Loop { cond, body, other } => {
            let _ = writeln!(out, "{}while {}", pad, render_expr(tcx, *cond));
            render_stmt(out, tcx, *body, indent + 1);
            if let Some(other) = other {
                let _ = writeln!(out, "{}else", pad);
                render_stmt(out, tcx, *other, indent + 1);
            }
        }
        TreeKind::Break { .. } => {
            let _ = writeln!(out, "{}break", pad);
        }
        TreeKind::Continue { .. } => {
            let _ = writeln!(out, "{}continue", pad);
        }
        TreeKind::Assign { dst, src } => {
            let _ = writeln!(out, "{}{} = {}", pad, render_expr(tcx, *dst), render_expr(tcx, *src));
        }
        TreeKind::Return { value } => match value {
            Some(value) => {
                let _ = writeln!(out, "{}return {}", pad, render_expr(tcx, *value));
            }
            None => {
                let _ = writeln!(out, "{}return", pad);
            }
        },
        TreeKind::Local { name } => {
            let ty = tcx.types.display(tcx.ty_of(id));
            let _ = writeln!(out, "{}local {}: {}", pad, name, ty);
        }
        // an expression in statement position
        _ => {
            let _ = writeln!(out, "{}{}", pad, render_expr(tcx, id));
        }
    }
}

fn render_expr(tcx: &TreeContext, id: TreeId) -> String {
    let node = tcx.node(id);
    match &node.kind {
        TreeKind::Error { message } => format!("<error {:?}>", message),
        TreeKind::Digit { value } => value.to_string(),
        TreeKind::Bool { value } => value.to_string(),
        TreeKind::String { value } => format!("{:?}", String::from_utf8_lossy(value)),
        TreeKind::Name { decl } => tcx.name_of(*decl).unwrap_or("<unnamed>").to_string(),
        TreeKind::Unary { op, operand } => {
            format!("{}{}", op.symbol(), render_expr(tcx, *operand))
        }
        TreeKind::Binary { op, lhs, rhs } => format!(
            "({} {} {})",
            render_expr(tcx, *lhs),
            op.symbol(),
            render_expr(tcx, *rhs)
        ),
        TreeKind::Compare { op, lhs, rhs } => format!(
            "({} {} {})",
            render_expr(tcx, *lhs),
            op.symbol(),
            render_expr(tcx, *rhs)
        ),
        TreeKind::Call { callee, args } => {
            let rendered: Vec<String> = args.iter().map(|&arg| render_expr(tcx, arg)).collect();
            format!("{}({})", render_expr(tcx, *callee), rendered.join(", "))
        }
        TreeKind::Index { array, index } => {
            format!("{}[{}]", render_expr(tcx, *array), render_expr(tcx, *index))
        }
        TreeKind::Member { object, field } => {
            format!("{}.{}", render_expr(tcx, *object), field)
        }
        TreeKind::Cast { operand } => format!(
            "cast({} as {})",
            render_expr(tcx, *operand),
            tcx.types.display(node.ty)
        ),
        TreeKind::AddrOf { operand } => format!("&{}", render_expr(tcx, *operand)),
        TreeKind::Load { operand } => format!("*{}", render_expr(tcx, *operand)),
        _ => "<stmt>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::BinaryOp;
    use crate::types::{Sign, Width};
    use cthulhu_core::reports::Reports;
    use cthulhu_core::scan::Span;

    fn context() -> TreeContext {
        TreeContext::new(Reports::new())
    }

    #[test]
    fn test_render_globals() {
        let mut tcx = context();
        let int = tcx.types.digit(Sign::Signed, Width::Int);
        let root = tcx.module_root(Span::builtin(), "main", 0);
        let forty_one = tcx.digit_literal(Span::builtin(), int, 41.into());
        let one = tcx.digit_literal(Span::builtin(), int, 1.into());
        let sum = tcx.binary(Span::builtin(), BinaryOp::Add, forty_one, one);
        let x = tcx.global(Span::builtin(), "x", int, Some(sum));
        tcx.module_add(root, Tag::Values, "x", x);

        let mut modules = BTreeMap::new();
        modules.insert("main".to_string(), root);
        let text = render(&tcx, &modules);
        assert!(text.contains("module main"));
        assert!(text.contains("global x: int = (41 + 1)"));
    }

    #[test]
    fn test_render_function_body() {
        let mut tcx = context();
        let int = tcx.types.digit(Sign::Signed, Width::Int);
        let sig = tcx.types.closure(vec![("v".into(), int)], int, false);
        let root = tcx.module_root(Span::builtin(), "main", 0);

        let param = tcx.param(Span::builtin(), "v", int);
        let value = tcx.name(Span::builtin(), param);
        let ret = tcx.ret(Span::builtin(), int, Some(value));
        let body = tcx.stmts(Span::builtin(), vec![ret]);
        let id = tcx.function(Span::builtin(), "id", sig, vec![param], Some(body));
        tcx.module_add(root, Tag::Procs, "id", id);

        let mut modules = BTreeMap::new();
        modules.insert("main".to_string(), root);
        let text = render(&tcx, &modules);
        assert!(text.contains("def id: def(int) -> int ="));
        assert!(text.contains("return v"));
    }

    #[test]
    fn test_render_signature_only_function() {
        let mut tcx = context();
        let int = tcx.types.digit(Sign::Signed, Width::Int);
        let sig = tcx.types.closure(vec![], int, false);
        let root = tcx.module_root(Span::builtin(), "main", 0);
        let external = tcx.function(Span::builtin(), "external", sig, vec![], None);
        tcx.module_add(root, Tag::Procs, "external", external);

        let mut modules = BTreeMap::new();
        modules.insert("main".to_string(), root);
        let text = render(&tcx, &modules);
        assert!(text.contains("def external: def() -> int\n"));
    }
}
