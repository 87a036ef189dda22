//! Textual dump of lowered SSA
//!
//! A deterministic, human-oriented rendering of a lowered module for the
//! `--emit-ssa` flag and for tests. This is not the backend contract; it is
//! a debugging surface that walks symbols, blocks and steps in order.

use crate::ssa::{SsaModule, SsaOp, SsaOperand, SsaSymbol, SsaType};
use std::fmt::Write;

/// Render a whole module
pub fn render(module: &SsaModule) -> String {
    let mut out = String::new();
    for symbol in module.values() {
        render_symbol(&mut out, symbol);
        out.push('\n');
    }
    out
}

fn render_symbol(out: &mut String, symbol: &SsaSymbol) {
    if symbol.entry.is_none() {
        // a closure-typed symbol without blocks is a signature-only
        // function, not a data symbol
        if matches!(symbol.ty, SsaType::Closure { .. }) {
            let _ = writeln!(out, "declare {}: {}", symbol.name, symbol.ty);
            return;
        }
        let _ = write!(out, "global {}: {}", symbol.name, symbol.ty);
        if let Some(value) = &symbol.value {
            let _ = write!(out, " = {}", value);
        }
        out.push('\n');
        return;
    }

    let _ = writeln!(out, "def {}: {} {{", symbol.name, symbol.ty);
    if !symbol.params.is_empty() {
        let rendered: Vec<String> = symbol
            .params
            .iter()
            .map(|(name, ty)| format!("{}: {}", name, ty))
            .collect();
        let _ = writeln!(out, "  params: [{}]", rendered.join(", "));
    }
    if !symbol.locals.is_empty() {
        let rendered: Vec<String> = symbol
            .locals
            .iter()
            .map(|(name, ty)| format!("{}: {}", name, ty))
            .collect();
        let _ = writeln!(out, "  locals: [{}]", rendered.join(", "));
    }
    for (index, block) in symbol.blocks.iter().enumerate() {
        let _ = writeln!(out, ".{}:", block.name);
        for (step_index, step) in block.steps.iter().enumerate() {
            let text = render_step(symbol, &step.op);
            if step.op.produces_value() {
                let _ = writeln!(out, "  %{}.{} = {}", index, step_index, text);
            } else {
                let _ = writeln!(out, "  {}", text);
            }
        }
    }
    out.push_str("}\n");
}

fn render_step(symbol: &SsaSymbol, op: &SsaOp) -> String {
    match op {
        SsaOp::Store { dst, src } => {
            format!("store {} {}", operand(symbol, dst), operand(symbol, src))
        }
        SsaOp::Load { src } => format!("load {}", operand(symbol, src)),
        SsaOp::Address { symbol: slot } => format!("addr {}", operand(symbol, slot)),
        SsaOp::Unary { op, operand: value } => {
            format!("unary {} {}", op, operand(symbol, value))
        }
        SsaOp::Binary { op, lhs, rhs } => {
            format!("binary {} {} {}", op, operand(symbol, lhs), operand(symbol, rhs))
        }
        SsaOp::Compare { op, lhs, rhs } => {
            format!("compare {} {} {}", op, operand(symbol, lhs), operand(symbol, rhs))
        }
        SsaOp::Cast { operand: value } => format!("cast {}", operand(symbol, value)),
        SsaOp::Call { callee, args } => {
            let rendered: Vec<String> = args.iter().map(|arg| operand(symbol, arg)).collect();
            format!("call {} [{}]", operand(symbol, callee), rendered.join(", "))
        }
        SsaOp::Index { array, index } => {
            format!("index {} {}", operand(symbol, array), operand(symbol, index))
        }
        SsaOp::Member { object, field } => {
            format!("member {} `{}`", operand(symbol, object), field)
        }
        SsaOp::Return { value } => {
            let value = operand(symbol, value);
            if value.is_empty() {
                "ret".to_string()
            } else {
                format!("ret {}", value)
            }
        }
        SsaOp::Branch { cond, then, other } => format!(
            "branch {} .{} .{}",
            operand(symbol, cond),
            symbol.block(*then).name,
            symbol.block(*other).name
        ),
        SsaOp::Jump { target } => format!("jump .{}", symbol.block(*target).name),
    }
}

fn operand(symbol: &SsaSymbol, op: &SsaOperand) -> String {
    match op {
        SsaOperand::Empty => String::new(),
        SsaOperand::Imm(value) => value.to_string(),
        SsaOperand::Block(block) => format!(".{}", symbol.block(*block).name),
        SsaOperand::Global(name) => format!("@{}", name),
        SsaOperand::Function(name) => format!("@{}", name),
        SsaOperand::Local(index) => format!("local({})", index),
        SsaOperand::Param(index) => format!("param({})", index),
        SsaOperand::Reg(reg) => format!("%{}.{}", reg.block.0, reg.index),
    }
}
