//! Tree to SSA lowering
//!
//! Input is a set of fully-resolved tree modules; output is a flat
//! [`SsaModule`] keyed by mangled-qualified name (module path segments
//! joined with `.`, overridden by an explicit mangle attribute). Lowering
//! never mutates the trees.
//!
//! Expressions lower to an [`SsaOperand`]; statements append steps and may
//! redirect the current block. The current block is optional: fully
//! terminated control flow (both arms of a branch returning) leaves no live
//! block, and join blocks are only created when some path actually falls
//! through.
//!
//! An `Error` node anywhere in a symbol aborts that symbol. The condition
//! was reported where the poison was produced, so lowering stays silent
//! unless the sink has no errors at all, which is an internal invariant
//! break.

use crate::errors::{self, ErrorKind};
use crate::sema::Tag;
use crate::ssa::{
    BlockId, SsaBlock, SsaConst, SsaModule, SsaOp, SsaOperand, SsaStep, SsaSymbol, SsaType, SsaValue,
    StepRef,
};
use crate::tree::{TreeContext, TreeId, TreeKind};
use crate::types::{TypeId, TypeKind, Types};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Lower every module of a lifetime into one flat symbol map
pub fn lower(tcx: &TreeContext, modules: &BTreeMap<String, TreeId>) -> SsaModule {
    let mut decls: Vec<(TreeId, String)> = Vec::new();
    for (path, &module) in modules {
        collect_decls(tcx, path, module, &mut decls);
    }

    let names: HashMap<TreeId, String> = decls.iter().cloned().collect();

    let mut out = SsaModule::new();
    for (decl, qualified) in decls {
        debug!(symbol = %qualified, "lowering");
        if let Some(symbol) = lower_symbol(tcx, &names, decl, &qualified) {
            out.insert(qualified, symbol);
        }
    }
    out
}

/// Map a tree type to its SSA counterpart
pub fn lower_type(types: &Types, ty: TypeId) -> SsaType {
    match types.kind(ty) {
        TypeKind::Meta | TypeKind::Empty => SsaType::Empty,
        TypeKind::Unit | TypeKind::Void => SsaType::Unit,
        TypeKind::Bool => SsaType::Bool,
        TypeKind::Digit { sign, width } => SsaType::Digit {
            sign: *sign,
            width: *width,
        },
        TypeKind::String => SsaType::String,
        TypeKind::Closure {
            params,
            result,
            variadic,
        } => SsaType::Closure {
            params: params.iter().map(|(_, p)| lower_type(types, *p)).collect(),
            result: Box::new(lower_type(types, *result)),
            variadic: *variadic,
        },
        TypeKind::Alias {
            target,
            opaque: false,
            ..
        } => lower_type(types, *target),
        TypeKind::Pointer { .. }
        | TypeKind::Array { .. }
        | TypeKind::Record { .. }
        | TypeKind::Union { .. }
        | TypeKind::Alias { .. } => SsaType::Qualify {
            name: types.display(ty),
        },
    }
}

fn qualify(path: &str, name: &str, mangle: Option<&String>) -> String {
    if let Some(mangled) = mangle {
        return mangled.clone();
    }
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

fn collect_decls(tcx: &TreeContext, path: &str, module: TreeId, out: &mut Vec<(TreeId, String)>) {
    for tag in [Tag::Values, Tag::Procs] {
        for (name, decl) in tcx.module_tag(module, tag) {
            let node = tcx.node(decl);
            match &node.kind {
                TreeKind::Global { .. } | TreeKind::Function { .. } => {
                    out.push((decl, qualify(path, &name, node.attribs.mangle.as_ref())));
                }
                // reported where the poison was produced
                TreeKind::Error { .. } => {}
                TreeKind::Resolve { .. } => {
                    errors::report(
                        &tcx.reports,
                        ErrorKind::InternalInvariant,
                        node.span.clone(),
                        format!("`{}` is still forward-declared at lowering", name),
                    );
                }
                _ => {}
            }
        }
    }
    for (name, submodule) in tcx.module_tag(module, Tag::Modules) {
        let sub_path = qualify(path, &name, None);
        collect_decls(tcx, &sub_path, submodule, out);
    }
}

fn lower_symbol(
    tcx: &TreeContext,
    names: &HashMap<TreeId, String>,
    decl: TreeId,
    qualified: &str,
) -> Option<SsaSymbol> {
    let result = match &tcx.node(decl).kind {
        TreeKind::Global { init, .. } => lower_global(tcx, names, decl, qualified, *init),
        TreeKind::Function { params, locals, body, .. } => {
            lower_function(tcx, names, decl, qualified, params, locals, *body)
        }
        _ => return None,
    };
    match result {
        Ok(symbol) => Some(symbol),
        Err(Poison) => {
            if !tcx.reports.has_errors() {
                errors::report(
                    &tcx.reports,
                    ErrorKind::InternalInvariant,
                    tcx.span_of(decl),
                    format!("`{}` contains an unreported error node", qualified),
                );
            }
            None
        }
    }
}

fn lower_global(
    tcx: &TreeContext,
    names: &HashMap<TreeId, String>,
    decl: TreeId,
    qualified: &str,
    init: Option<TreeId>,
) -> Result<SsaSymbol, Poison> {
    let ty = lower_type(&tcx.types, tcx.ty_of(decl));
    let mut symbol = SsaSymbol {
        name: qualified.to_string(),
        ty,
        value: None,
        entry: None,
        blocks: Vec::new(),
        locals: Vec::new(),
        params: Vec::new(),
    };

    let Some(init) = init else {
        return Ok(symbol);
    };

    // spin a scratch entry block; keep it only when the initializer does
    // real work
    let mut fl = FnLower::new(tcx, names);
    let entry = fl.new_block("entry");
    fl.current = Some(entry);
    let operand = fl.lower_rvalue(init)?;

    let pure_imm = fl.blocks.len() == 1 && fl.blocks[0].steps.is_empty();
    match operand {
        SsaOperand::Imm(value) if pure_imm => {
            symbol.value = Some(value);
        }
        operand => {
            let ret_ty = symbol.ty.clone();
            fl.push(SsaOp::Return { value: operand }, ret_ty);
            symbol.entry = Some(entry);
            symbol.blocks = fl.blocks;
            symbol.locals = fl.locals;
        }
    }
    Ok(symbol)
}

fn lower_function(
    tcx: &TreeContext,
    names: &HashMap<TreeId, String>,
    decl: TreeId,
    qualified: &str,
    params: &[TreeId],
    locals: &[TreeId],
    body: Option<TreeId>,
) -> Result<SsaSymbol, Poison> {
    let signature = tcx.ty_of(decl);
    let result_ty = match tcx.types.as_closure(signature) {
        Some((_, result, _)) => result,
        None => {
            errors::report(
                &tcx.reports,
                ErrorKind::InternalInvariant,
                tcx.span_of(decl),
                format!("`{}` has a non-closure signature", qualified),
            );
            return Err(Poison);
        }
    };

    let mut fl = FnLower::new(tcx, names);
    for (index, &param) in params.iter().enumerate() {
        fl.param_index.insert(param, index);
        fl.params.push((
            tcx.name_of(param).unwrap_or("<param>").to_string(),
            lower_type(&tcx.types, tcx.ty_of(param)),
        ));
    }
    for &local in locals {
        fl.register_local(local);
    }

    let mut symbol = SsaSymbol {
        name: qualified.to_string(),
        ty: lower_type(&tcx.types, signature),
        value: None,
        entry: None,
        blocks: Vec::new(),
        locals: Vec::new(),
        params: fl.params.clone(),
    };

    let Some(body) = body else {
        // imported function: signature only
        return Ok(symbol);
    };

    let entry = fl.new_block("entry");
    fl.current = Some(entry);
    fl.lower_stmt(body, result_ty)?;
    fl.finish(decl, result_ty);

    symbol.entry = Some(entry);
    symbol.locals = fl.locals;
    symbol.blocks = fl.blocks;
    Ok(symbol)
}

/// Marker for a symbol aborted by poison
struct Poison;

/// Per-function lowering state
struct FnLower<'a, 't> {
    tcx: &'t TreeContext,
    names: &'a HashMap<TreeId, String>,
    blocks: Vec<SsaBlock>,
    /// `None` when all paths out of the lowered code are terminated
    current: Option<BlockId>,
    params: Vec<(String, SsaType)>,
    param_index: HashMap<TreeId, usize>,
    locals: Vec<(String, SsaType)>,
    local_index: HashMap<TreeId, usize>,
    /// Loop node to (head block, exit block), for break/continue
    loops: HashMap<TreeId, (BlockId, BlockId)>,
}

impl<'a, 't> FnLower<'a, 't> {
    fn new(tcx: &'t TreeContext, names: &'a HashMap<TreeId, String>) -> Self {
        FnLower {
            tcx,
            names,
            blocks: Vec::new(),
            current: None,
            params: Vec::new(),
            param_index: HashMap::new(),
            locals: Vec::new(),
            local_index: HashMap::new(),
            loops: HashMap::new(),
        }
    }

    fn new_block(&mut self, base: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let name = if self.blocks.is_empty() {
            "entry".to_string()
        } else {
            format!("{}{}", base, self.blocks.len())
        };
        self.blocks.push(SsaBlock {
            name,
            steps: Vec::new(),
        });
        id
    }

    fn ensure_current(&mut self) -> BlockId {
        match self.current {
            Some(block) => block,
            None => {
                let block = self.new_block("bb");
                self.current = Some(block);
                block
            }
        }
    }

    fn push(&mut self, op: SsaOp, ty: SsaType) -> StepRef {
        let block = self.ensure_current();
        let steps = &mut self.blocks[block.0 as usize].steps;
        let index = steps.len();
        steps.push(SsaStep { op, ty });
        StepRef { block, index }
    }

    fn current_terminated(&self) -> bool {
        match self.current {
            Some(block) => self.blocks[block.0 as usize].is_terminated(),
            None => true,
        }
    }

    fn register_local(&mut self, local: TreeId) -> usize {
        if let Some(&index) = self.local_index.get(&local) {
            return index;
        }
        let index = self.locals.len();
        self.local_index.insert(local, index);
        self.locals.push((
            self.tcx.name_of(local).unwrap_or("<local>").to_string(),
            lower_type(&self.tcx.types, self.tcx.ty_of(local)),
        ));
        index
    }

    fn internal(&self, id: TreeId, text: impl Into<String>) -> Poison {
        errors::report(
            &self.tcx.reports,
            ErrorKind::InternalInvariant,
            self.tcx.span_of(id),
            text,
        );
        Poison
    }

    fn node_type(&self, id: TreeId) -> SsaType {
        lower_type(&self.tcx.types, self.tcx.ty_of(id))
    }

    fn pointer_to(&self, element: TypeId) -> SsaType {
        SsaType::Qualify {
            name: format!("*{}", self.tcx.types.display(element)),
        }
    }

    /// The storage slot of a declaration, without loading from it
    fn decl_slot(&mut self, decl: TreeId) -> Result<SsaOperand, Poison> {
        match &self.tcx.node(decl).kind {
            TreeKind::Error { .. } => Err(Poison),
            TreeKind::Global { .. } => match self.names.get(&decl) {
                Some(name) => Ok(SsaOperand::Global(name.clone())),
                None => Err(self.internal(decl, "global is not registered in any module")),
            },
            TreeKind::Function { .. } => match self.names.get(&decl) {
                Some(name) => Ok(SsaOperand::Function(name.clone())),
                None => Err(self.internal(decl, "function is not registered in any module")),
            },
            TreeKind::Param { .. } => match self.param_index.get(&decl) {
                Some(&index) => Ok(SsaOperand::Param(index)),
                None => Err(self.internal(decl, "parameter does not belong to this function")),
            },
            TreeKind::Local { .. } => {
                let index = self.register_local(decl);
                Ok(SsaOperand::Local(index))
            }
            TreeKind::Resolve { .. } => Err(self.internal(decl, "unresolved declaration at lowering")),
            _ => Err(self.internal(decl, "name does not reference storage")),
        }
    }

    /// Lower an expression to an operand holding its value
    fn lower_rvalue(&mut self, id: TreeId) -> Result<SsaOperand, Poison> {
        let node = self.tcx.node(id);
        match &node.kind {
            TreeKind::Error { .. } => Err(Poison),

            TreeKind::Digit { value } => Ok(SsaOperand::Imm(SsaValue {
                ty: self.node_type(id),
                value: SsaConst::Digit(value.clone()),
            })),
            TreeKind::Bool { value } => Ok(SsaOperand::Imm(SsaValue {
                ty: SsaType::Bool,
                value: SsaConst::Bool(*value),
            })),
            TreeKind::String { value } => Ok(SsaOperand::Imm(SsaValue {
                ty: SsaType::String,
                value: SsaConst::String(value.clone()),
            })),

            TreeKind::Name { decl } => {
                let decl = *decl;
                if matches!(self.tcx.node(decl).kind, TreeKind::Function { .. }) {
                    return self.decl_slot(decl);
                }
                let slot = self.decl_slot(decl)?;
                let ty = self.node_type(id);
                let reg = self.push(SsaOp::Load { src: slot }, ty);
                Ok(SsaOperand::Reg(reg))
            }

            TreeKind::Unary { op, operand } => {
                let (op, operand) = (*op, *operand);
                let lowered = self.lower_rvalue(operand)?;
                let ty = self.node_type(id);
                let reg = self.push(SsaOp::Unary { op, operand: lowered }, ty);
                Ok(SsaOperand::Reg(reg))
            }

            TreeKind::Binary { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let lhs = self.lower_rvalue(lhs)?;
                let rhs = self.lower_rvalue(rhs)?;
                let ty = self.node_type(id);
                let reg = self.push(SsaOp::Binary { op, lhs, rhs }, ty);
                Ok(SsaOperand::Reg(reg))
            }

            TreeKind::Compare { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let lhs = self.lower_rvalue(lhs)?;
                let rhs = self.lower_rvalue(rhs)?;
                let reg = self.push(SsaOp::Compare { op, lhs, rhs }, SsaType::Bool);
                Ok(SsaOperand::Reg(reg))
            }

            TreeKind::Call { callee, args } => {
                let (callee, args) = (*callee, args.clone());
                let callee_op = match &self.tcx.node(callee).kind {
                    TreeKind::Name { decl }
                        if matches!(self.tcx.node(*decl).kind, TreeKind::Function { .. }) =>
                    {
                        self.decl_slot(*decl)?
                    }
                    _ => self.lower_rvalue(callee)?,
                };
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower_rvalue(arg)?);
                }
                let ty = self.node_type(id);
                let void = self.tcx.types.is_unit_result(self.tcx.ty_of(id));
                let reg = self.push(
                    SsaOp::Call {
                        callee: callee_op,
                        args: lowered,
                    },
                    ty,
                );
                if void {
                    Ok(SsaOperand::Empty)
                } else {
                    Ok(SsaOperand::Reg(reg))
                }
            }

            TreeKind::Cast { operand } => {
                let operand = *operand;
                let lowered = self.lower_rvalue(operand)?;
                let ty = self.node_type(id);
                let reg = self.push(SsaOp::Cast { operand: lowered }, ty);
                Ok(SsaOperand::Reg(reg))
            }

            TreeKind::AddrOf { operand } => {
                let operand = *operand;
                let slot = self.lower_address(operand)?;
                let ty = self.node_type(id);
                let reg = self.push(SsaOp::Address { symbol: slot }, ty);
                Ok(SsaOperand::Reg(reg))
            }

            TreeKind::Load { operand } => {
                let operand = *operand;
                let pointer = self.lower_rvalue(operand)?;
                let ty = self.node_type(id);
                let reg = self.push(SsaOp::Load { src: pointer }, ty);
                Ok(SsaOperand::Reg(reg))
            }

            // element and field accesses produce an address; reading the
            // value is a load through it
            TreeKind::Index { .. } | TreeKind::Member { .. } => {
                let address = self.lower_address(id)?;
                let ty = self.node_type(id);
                let reg = self.push(SsaOp::Load { src: address }, ty);
                Ok(SsaOperand::Reg(reg))
            }

            _ => Err(self.internal(id, "expected an expression")),
        }
    }

    /// Lower an expression to the address it names
    fn lower_address(&mut self, id: TreeId) -> Result<SsaOperand, Poison> {
        let node = self.tcx.node(id);
        match &node.kind {
            TreeKind::Error { .. } => Err(Poison),

            TreeKind::Name { decl } => self.decl_slot(*decl),

            TreeKind::Index { array, index } => {
                let (array, index) = (*array, *index);
                let array_ty = self.tcx.types.follow(self.tcx.ty_of(array));
                // an indexable pointer is already an address value
                let base = match self.tcx.types.kind(array_ty) {
                    TypeKind::Pointer { .. } => self.lower_rvalue(array)?,
                    _ => self.lower_address(array)?,
                };
                let index_op = self.lower_rvalue(index)?;
                let ty = self.pointer_to(self.tcx.ty_of(id));
                let reg = self.push(
                    SsaOp::Index {
                        array: base,
                        index: index_op,
                    },
                    ty,
                );
                Ok(SsaOperand::Reg(reg))
            }

            TreeKind::Member { object, field } => {
                let (object, field) = (*object, field.clone());
                let base = self.lower_address(object)?;
                let ty = self.pointer_to(self.tcx.ty_of(id));
                let reg = self.push(SsaOp::Member { object: base, field }, ty);
                Ok(SsaOperand::Reg(reg))
            }

            // the address an address-of expression evaluates to
            TreeKind::AddrOf { .. } => self.lower_rvalue(id),

            // storing through a dereference: the pointer value is the address
            TreeKind::Load { operand } => self.lower_rvalue(*operand),

            _ => Err(self.internal(id, "expression is not addressable")),
        }
    }

    /// Lower a statement; may redirect the current block
    fn lower_stmt(&mut self, id: TreeId, result_ty: TypeId) -> Result<(), Poison> {
        let node = self.tcx.node(id);
        match &node.kind {
            TreeKind::Error { .. } => Err(Poison),

            TreeKind::Stmts { stmts } => {
                for stmt in stmts.clone() {
                    self.lower_stmt(stmt, result_ty)?;
                }
                Ok(())
            }

            TreeKind::Assign { dst, src } => {
                let (dst, src) = (*dst, *src);
                let value = self.lower_rvalue(src)?;
                let address = self.lower_address(dst)?;
                self.push(
                    SsaOp::Store {
                        dst: address,
                        src: value,
                    },
                    SsaType::Unit,
                );
                Ok(())
            }

            TreeKind::Return { value } => {
                let value = *value;
                let operand = match value {
                    Some(value) => self.lower_rvalue(value)?,
                    None => SsaOperand::Empty,
                };
                self.push(SsaOp::Return { value: operand }, SsaType::Unit);
                // anything after a return starts a fresh (unreachable) block
                self.current = None;
                Ok(())
            }

            TreeKind::Branch { cond, then, other } => {
                let (cond, then, other) = (*cond, *then, *other);
                let cond_op = self.lower_rvalue(cond)?;

                let then_bb = self.new_block("then");
                let else_bb = other.map(|_| self.new_block("else"));
                // without an else clause the false edge needs a landing
                // block, which doubles as the join
                let mut join = None;
                let false_target = match else_bb {
                    Some(block) => block,
                    None => {
                        let block = self.new_block("join");
                        join = Some(block);
                        block
                    }
                };
                self.push(
                    SsaOp::Branch {
                        cond: cond_op,
                        then: then_bb,
                        other: false_target,
                    },
                    SsaType::Unit,
                );

                self.current = Some(then_bb);
                self.lower_stmt(then, result_ty)?;
                if !self.current_terminated() {
                    let target = match join {
                        Some(block) => block,
                        None => {
                            let block = self.new_block("join");
                            join = Some(block);
                            block
                        }
                    };
                    self.push(SsaOp::Jump { target }, SsaType::Unit);
                }

                if let Some(else_block) = else_bb {
                    self.current = Some(else_block);
                    self.lower_stmt(other.expect("else block implies else stmt"), result_ty)?;
                    if !self.current_terminated() {
                        let target = match join {
                            Some(block) => block,
                            None => {
                                let block = self.new_block("join");
                                join = Some(block);
                                block
                            }
                        };
                        self.push(SsaOp::Jump { target }, SsaType::Unit);
                    }
                }

                self.current = join;
                Ok(())
            }

            TreeKind::Loop { cond, body, other } => {
                let (cond, body, other) = (*cond, *body, *other);
                let head = self.new_block("head");
                self.push(SsaOp::Jump { target: head }, SsaType::Unit);

                self.current = Some(head);
                let cond_op = self.lower_rvalue(cond)?;
                let body_bb = self.new_block("body");
                let exit_bb = self.new_block("exit");
                // the else clause runs on natural exit only; break jumps
                // straight to the exit
                let else_bb = other.map(|_| self.new_block("else"));
                let false_target = else_bb.unwrap_or(exit_bb);
                self.push(
                    SsaOp::Branch {
                        cond: cond_op,
                        then: body_bb,
                        other: false_target,
                    },
                    SsaType::Unit,
                );

                self.loops.insert(id, (head, exit_bb));

                self.current = Some(body_bb);
                self.lower_stmt(body, result_ty)?;
                if !self.current_terminated() {
                    self.push(SsaOp::Jump { target: head }, SsaType::Unit);
                }

                if let Some(else_block) = else_bb {
                    self.current = Some(else_block);
                    self.lower_stmt(other.expect("else block implies else stmt"), result_ty)?;
                    if !self.current_terminated() {
                        self.push(SsaOp::Jump { target: exit_bb }, SsaType::Unit);
                    }
                }

                self.current = Some(exit_bb);
                Ok(())
            }

            TreeKind::Break { target } => {
                let target = *target;
                match self.loops.get(&target) {
                    Some(&(_, exit)) => {
                        self.push(SsaOp::Jump { target: exit }, SsaType::Unit);
                        self.current = None;
                        Ok(())
                    }
                    None => Err(self.internal(id, "break targets a loop that is not open")),
                }
            }

            TreeKind::Continue { target } => {
                let target = *target;
                match self.loops.get(&target) {
                    Some(&(head, _)) => {
                        self.push(SsaOp::Jump { target: head }, SsaType::Unit);
                        self.current = None;
                        Ok(())
                    }
                    None => Err(self.internal(id, "continue targets a loop that is not open")),
                }
            }

            // a local declaration in statement position only claims a slot
            TreeKind::Local { .. } => {
                self.register_local(id);
                Ok(())
            }

            // an expression in statement position is lowered for effect
            _ => self.lower_rvalue(id).map(|_| ()),
        }
    }

    /// Seal the function: a live unterminated block gets an implicit bare
    /// return when the result type has none, otherwise the fall-through is
    /// an internal invariant break.
    fn finish(&mut self, decl: TreeId, result_ty: TypeId) {
        if self.current_terminated() {
            return;
        }
        if !self.tcx.types.is_unit_result(result_ty) {
            errors::report(
                &self.tcx.reports,
                ErrorKind::InternalInvariant,
                self.tcx.span_of(decl),
                "control reaches the end of a value-producing function",
            );
        }
        self.push(
            SsaOp::Return {
                value: SsaOperand::Empty,
            },
            SsaType::Unit,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{BinaryOp, CompareOp};
    use crate::tree::TreeContext;
    use crate::types::{Sign, Width};
    use cthulhu_core::reports::Reports;
    use cthulhu_core::scan::Span;

    fn context() -> TreeContext {
        TreeContext::new(Reports::new())
    }

    fn modules_of(root: TreeId, path: &str) -> BTreeMap<String, TreeId> {
        let mut modules = BTreeMap::new();
        modules.insert(path.to_string(), root);
        modules
    }

    /// §8 scenario 1: a global with a constant initializer folds to a value
    #[test]
    fn test_single_global_folds_to_imm() {
        let mut tcx = context();
        let int = tcx.types.digit(Sign::Signed, Width::Int);
        let root = tcx.module_root(Span::builtin(), "main", 0);
        let init = tcx.digit_literal(Span::builtin(), int, 41.into());
        let global = tcx.global(Span::builtin(), "x", int, Some(init));
        tcx.module_add(root, Tag::Values, "x", global);

        let modules = modules_of(root, "main");
        let ssa = lower(&tcx, &modules);

        let symbol = &ssa["main.x"];
        assert_eq!(
            symbol.ty,
            SsaType::Digit {
                sign: Sign::Signed,
                width: Width::Int
            }
        );
        assert_eq!(
            symbol.value,
            Some(SsaValue {
                ty: SsaType::Digit {
                    sign: Sign::Signed,
                    width: Width::Int
                },
                value: SsaConst::Digit(41.into()),
            })
        );
        assert!(symbol.entry.is_none());
        assert!(symbol.blocks.is_empty());
    }

    /// §8 scenario 2: the identity function loads its parameter and returns
    #[test]
    fn test_identity_function() {
        let mut tcx = context();
        let int = tcx.types.digit(Sign::Signed, Width::Int);
        let sig = tcx.types.closure(vec![("v".into(), int)], int, false);
        let root = tcx.module_root(Span::builtin(), "main", 0);

        let param = tcx.param(Span::builtin(), "v", int);
        let value = tcx.name(Span::builtin(), param);
        let body = tcx.ret(Span::builtin(), int, Some(value));
        let function = tcx.function(Span::builtin(), "id", sig, vec![param], Some(body));
        tcx.module_add(root, Tag::Procs, "id", function);

        let modules = modules_of(root, "main");
        let ssa = lower(&tcx, &modules);

        let symbol = &ssa["main.id"];
        assert_eq!(symbol.params.len(), 1);
        let entry = symbol.block(symbol.entry.unwrap());
        assert_eq!(entry.steps.len(), 2);
        assert_eq!(
            entry.steps[0].op,
            SsaOp::Load {
                src: SsaOperand::Param(0)
            }
        );
        assert_eq!(
            entry.steps[1].op,
            SsaOp::Return {
                value: SsaOperand::Reg(StepRef {
                    block: BlockId(0),
                    index: 0
                })
            }
        );
    }

    /// §8 scenario 4: both arms returning leaves no join block
    #[test]
    fn test_branch_with_both_returns_has_no_join() {
        let mut tcx = context();
        let int = tcx.types.digit(Sign::Signed, Width::Int);
        let sig = tcx.types.closure(vec![("x".into(), int)], int, false);
        let root = tcx.module_root(Span::builtin(), "main", 0);

        let param = tcx.param(Span::builtin(), "x", int);
        let x = tcx.name(Span::builtin(), param);
        let zero = tcx.digit_literal(Span::builtin(), int, 0.into());
        let cond = tcx.compare(Span::builtin(), CompareOp::Eq, x, zero);
        let one = tcx.digit_literal(Span::builtin(), int, 1.into());
        let two = tcx.digit_literal(Span::builtin(), int, 2.into());
        let ret_one = tcx.ret(Span::builtin(), int, Some(one));
        let ret_two = tcx.ret(Span::builtin(), int, Some(two));
        let body = tcx.branch(Span::builtin(), cond, ret_one, Some(ret_two));
        let function = tcx.function(Span::builtin(), "pick", sig, vec![param], Some(body));
        tcx.module_add(root, Tag::Procs, "pick", function);

        let modules = modules_of(root, "main");
        let ssa = lower(&tcx, &modules);
        let symbol = &ssa["main.pick"];

        // entry, then, else; no join
        assert_eq!(symbol.blocks.len(), 3);
        let entry = symbol.block(BlockId(0));
        assert!(matches!(
            entry.steps.last().unwrap().op,
            SsaOp::Branch {
                then: BlockId(1),
                other: BlockId(2),
                ..
            }
        ));
        for block in &symbol.blocks[1..] {
            assert_eq!(block.steps.len(), 1);
            assert!(matches!(block.steps[0].op, SsaOp::Return { .. }));
        }
    }

    /// §8 scenario 5: a loop whose body breaks
    #[test]
    fn test_loop_with_break() {
        let mut tcx = context();
        let int = tcx.types.digit(Sign::Signed, Width::Int);
        let void = tcx.types.void_t();
        let sig = tcx.types.closure(vec![], void, false);
        let root = tcx.module_root(Span::builtin(), "main", 0);

        let running = tcx.local(Span::builtin(), "running", tcx.types.bool_t());
        let i = tcx.local(Span::builtin(), "i", int);

        let cond = tcx.name(Span::builtin(), running);
        let i_ref = tcx.name(Span::builtin(), i);
        let one = tcx.digit_literal(Span::builtin(), int, 1.into());
        let sum = tcx.binary(Span::builtin(), BinaryOp::Add, i_ref, one);
        let dst = tcx.name(Span::builtin(), i);
        let assign = tcx.assign(Span::builtin(), dst, sum);

        // the loop node must exist before break can target it; build the
        // body in two steps
        let placeholder = tcx.stmts(Span::builtin(), vec![assign]);
        let loop_node = tcx.loop_(Span::builtin(), cond, placeholder, None);
        let brk = tcx.break_(Span::builtin(), loop_node);
        match &mut tcx.node_mut(placeholder).kind {
            TreeKind::Stmts { stmts } => stmts.push(brk),
            _ => unreachable!(),
        }

        let function = tcx.function(Span::builtin(), "spin", sig, vec![], Some(loop_node));
        match &mut tcx.node_mut(function).kind {
            TreeKind::Function { locals, .. } => {
                locals.push(running);
                locals.push(i);
            }
            _ => unreachable!(),
        }
        tcx.module_add(root, Tag::Procs, "spin", function);

        let modules = modules_of(root, "main");
        let ssa = lower(&tcx, &modules);
        let symbol = &ssa["main.spin"];

        // entry, head, body, exit
        assert_eq!(symbol.blocks.len(), 4);
        let head = symbol.block(BlockId(1));
        assert!(matches!(
            head.steps.last().unwrap().op,
            SsaOp::Branch {
                then: BlockId(2),
                other: BlockId(3),
                ..
            }
        ));
        let body = symbol.block(BlockId(2));
        assert!(
            body.steps
                .iter()
                .any(|step| matches!(step.op, SsaOp::Store { .. }))
        );
        assert!(matches!(
            body.steps.last().unwrap().op,
            SsaOp::Jump { target: BlockId(3) }
        ));
        // exit is live at the end, so the implicit bare return lands there
        let exit = symbol.block(BlockId(3));
        assert!(matches!(
            exit.steps.last().unwrap().op,
            SsaOp::Return {
                value: SsaOperand::Empty
            }
        ));
    }

    /// §8 scenario 6: a cross-module initializer loads the other global
    #[test]
    fn test_cross_module_reference() {
        let mut tcx = context();
        let int = tcx.types.digit(Sign::Signed, Width::Int);

        let m1 = tcx.module_root(Span::builtin(), "m1", 0);
        let k_init = tcx.digit_literal(Span::builtin(), int, 7.into());
        let k = tcx.global(Span::builtin(), "k", int, Some(k_init));
        tcx.module_add(m1, Tag::Values, "k", k);

        let m2 = tcx.module_root(Span::builtin(), "m2", 0);
        let k_ref = tcx.name(Span::builtin(), k);
        let k2 = tcx.global(Span::builtin(), "k2", int, Some(k_ref));
        tcx.module_add(m2, Tag::Values, "k2", k2);

        let mut modules = BTreeMap::new();
        modules.insert("m1".to_string(), m1);
        modules.insert("m2".to_string(), m2);
        let ssa = lower(&tcx, &modules);

        assert_eq!(ssa["m1.k"].value.as_ref().unwrap().value, SsaConst::Digit(7.into()));

        let k2_symbol = &ssa["m2.k2"];
        assert!(k2_symbol.value.is_none());
        let entry = k2_symbol.block(k2_symbol.entry.unwrap());
        assert_eq!(
            entry.steps[0].op,
            SsaOp::Load {
                src: SsaOperand::Global("m1.k".into())
            }
        );
        assert!(matches!(entry.steps[1].op, SsaOp::Return { .. }));
    }

    /// Lowering the same input twice yields structurally equal output
    #[test]
    fn test_lowering_is_deterministic() {
        let mut tcx = context();
        let int = tcx.types.digit(Sign::Signed, Width::Int);
        let root = tcx.module_root(Span::builtin(), "main", 0);
        for (name, value) in [("a", 1), ("b", 2), ("c", 3)] {
            let init = tcx.digit_literal(Span::builtin(), int, value.into());
            let global = tcx.global(Span::builtin(), name, int, Some(init));
            tcx.module_add(root, Tag::Values, name, global);
        }
        let modules = modules_of(root, "main");
        let first = lower(&tcx, &modules);
        let second = lower(&tcx, &modules);
        assert_eq!(first, second);
    }

    /// Poisoned declarations lower to nothing and stay silent when their
    /// diagnostics were already reported
    #[test]
    fn test_error_symbol_is_skipped() {
        let mut tcx = context();
        let int = tcx.types.digit(Sign::Signed, Width::Int);
        let root = tcx.module_root(Span::builtin(), "main", 0);

        // an already-reported failure site
        errors::report(
            &tcx.reports,
            ErrorKind::TypeMismatch,
            Span::builtin(),
            "operands disagree",
        );
        let poison = tcx.error(Span::builtin(), "operands disagree");
        let global = tcx.global(Span::builtin(), "bad", int, Some(poison));
        tcx.module_add(root, Tag::Values, "bad", global);

        let before = tcx.reports.len();
        let modules = modules_of(root, "main");
        let ssa = lower(&tcx, &modules);
        assert!(ssa.is_empty());
        assert_eq!(tcx.reports.len(), before);
    }

    /// A mangle attribute overrides the qualified name
    #[test]
    fn test_mangle_override() {
        let mut tcx = context();
        let int = tcx.types.digit(Sign::Signed, Width::Int);
        let root = tcx.module_root(Span::builtin(), "main", 0);
        let init = tcx.digit_literal(Span::builtin(), int, 5.into());
        let global = tcx.global(Span::builtin(), "errno_slot", int, Some(init));
        tcx.node_mut(global).attribs.mangle = Some("errno".into());
        tcx.module_add(root, Tag::Values, "errno_slot", global);

        let modules = modules_of(root, "main");
        let ssa = lower(&tcx, &modules);
        assert!(ssa.contains_key("errno"));
        assert!(!ssa.contains_key("main.errno_slot"));
    }
}
