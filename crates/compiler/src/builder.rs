//! Typed constructors for tree nodes
//!
//! Every constructor takes a span and enforces the shape of the node it
//! builds: operand types must agree, calls must match their signature,
//! assignments need an lvalue. A violated shape reports through the sink and
//! returns a fresh `Error` node so the surrounding analysis keeps going; a
//! constructor handed an `Error` operand propagates the poison without
//! reporting again.
//!
//! Forward declarations are built with [`TreeContext::open_global`] /
//! [`TreeContext::open_function`] and finished by the matching `close_*`
//! call, which checks the promised kind.

use crate::errors::{self, ErrorKind};
use crate::ops::{BinaryOp, CompareOp, UnaryOp};
use crate::tree::{DeclKind, Resolver, TreeContext, TreeId, TreeKind};
use crate::types::{TypeId, TypeKind};
use cthulhu_core::scan::Span;
use num_bigint::BigInt;

impl TreeContext {
    /// First poisoned operand, if any
    fn poison_in(&self, operands: &[TreeId]) -> Option<TreeId> {
        operands.iter().copied().find(|&id| self.is_error(id))
    }

    /// Propagate poison: a fresh error node carrying the origin's message
    fn propagate(&mut self, span: Span, origin: TreeId) -> TreeId {
        let message = match &self.node(origin).kind {
            TreeKind::Error { message } => message.clone(),
            _ => "poisoned operand".into(),
        };
        self.error(span, message)
    }

    // literals

    /// Digit literal of the given digit type; out-of-range values are
    /// `InvalidLiteral` and produce poison
    pub fn digit_literal(&mut self, span: Span, ty: TypeId, value: BigInt) -> TreeId {
        let followed = self.types.follow(ty);
        let TypeKind::Digit { sign, width } = *self.types.kind(followed) else {
            errors::report(
                &self.reports,
                ErrorKind::TypeMismatch,
                span.clone(),
                format!("`{}` is not a digit type", self.types.display(ty)),
            );
            return self.error(span, "literal of non-digit type");
        };
        if !self.types.digit_fits(&value, sign, width) {
            errors::report(
                &self.reports,
                ErrorKind::InvalidLiteral,
                span.clone(),
                format!("literal `{}` does not fit in `{}`", value, self.types.display(ty)),
            );
            return self.error(span, "literal out of range");
        }
        self.alloc(TreeKind::Digit { value }, span, ty)
    }

    pub fn bool_literal(&mut self, span: Span, value: bool) -> TreeId {
        let ty = self.types.bool_t();
        self.alloc(TreeKind::Bool { value }, span, ty)
    }

    pub fn string_literal(&mut self, span: Span, value: Vec<u8>) -> TreeId {
        let ty = self.types.string_t();
        self.alloc(TreeKind::String { value }, span, ty)
    }

    // expressions

    /// Reference to a declaration; the node's type is the declaration's
    pub fn name(&mut self, span: Span, decl: TreeId) -> TreeId {
        if self.is_error(decl) {
            return self.propagate(span, decl);
        }
        let ty = self.ty_of(decl);
        self.alloc(TreeKind::Name { decl }, span, ty)
    }

    pub fn unary(&mut self, span: Span, op: UnaryOp, operand: TreeId) -> TreeId {
        if let Some(poison) = self.poison_in(&[operand]) {
            return self.propagate(span, poison);
        }
        let ty = self.ty_of(operand);
        let ok = match op {
            UnaryOp::Neg | UnaryOp::Flip => self.types.is_digit(ty),
            UnaryOp::Not => self.types.is_bool(ty),
        };
        if !ok {
            errors::report(
                &self.reports,
                ErrorKind::TypeMismatch,
                span.clone(),
                format!("unary `{}` cannot apply to `{}`", op.symbol(), self.types.display(ty)),
            );
            return self.error(span, "invalid unary operand");
        }
        let result = self.types.follow(ty);
        self.alloc(TreeKind::Unary { op, operand }, span, result)
    }

    /// Arithmetic; both operands must be the same digit type after alias
    /// folding
    pub fn binary(&mut self, span: Span, op: BinaryOp, lhs: TreeId, rhs: TreeId) -> TreeId {
        if let Some(poison) = self.poison_in(&[lhs, rhs]) {
            return self.propagate(span, poison);
        }
        let lty = self.ty_of(lhs);
        let rty = self.ty_of(rhs);
        if !self.types.equals(lty, rty) || !self.types.is_digit(lty) {
            errors::report(
                &self.reports,
                ErrorKind::TypeMismatch,
                span.clone(),
                format!(
                    "binary `{}` operands disagree: `{}` vs `{}`",
                    op.symbol(),
                    self.types.display(lty),
                    self.types.display(rty)
                ),
            );
            return self.error(span, "invalid binary operands");
        }
        let result = self.types.follow(lty);
        self.alloc(TreeKind::Binary { op, lhs, rhs }, span, result)
    }

    /// Comparison; operands must be equal types, result is `bool`
    pub fn compare(&mut self, span: Span, op: CompareOp, lhs: TreeId, rhs: TreeId) -> TreeId {
        if let Some(poison) = self.poison_in(&[lhs, rhs]) {
            return self.propagate(span, poison);
        }
        let lty = self.ty_of(lhs);
        let rty = self.ty_of(rhs);
        if !self.types.equals(lty, rty) {
            errors::report(
                &self.reports,
                ErrorKind::TypeMismatch,
                span.clone(),
                format!(
                    "cannot compare `{}` with `{}`",
                    self.types.display(lty),
                    self.types.display(rty)
                ),
            );
            return self.error(span, "invalid comparison operands");
        }
        let ty = self.types.bool_t();
        self.alloc(TreeKind::Compare { op, lhs, rhs }, span, ty)
    }

    /// Call through a closure-typed callee
    pub fn call(&mut self, span: Span, callee: TreeId, args: Vec<TreeId>) -> TreeId {
        if let Some(poison) = self.poison_in(&[callee]) {
            return self.propagate(span, poison);
        }
        if let Some(poison) = self.poison_in(&args) {
            return self.propagate(span, poison);
        }
        let callee_ty = self.ty_of(callee);
        let Some((params, result, variadic)) = self.types.as_closure(callee_ty) else {
            errors::report(
                &self.reports,
                ErrorKind::TypeMismatch,
                span.clone(),
                format!("`{}` is not callable", self.types.display(callee_ty)),
            );
            return self.error(span, "call of non-function");
        };
        let params: Vec<TypeId> = params.iter().map(|(_, ty)| *ty).collect();

        let arity_ok = if variadic {
            args.len() >= params.len()
        } else {
            args.len() == params.len()
        };
        if !arity_ok {
            errors::report(
                &self.reports,
                ErrorKind::ShapeMismatch,
                span.clone(),
                format!(
                    "call expects {}{} arguments, found {}",
                    params.len(),
                    if variadic { " or more" } else { "" },
                    args.len()
                ),
            );
            return self.error(span, "call arity mismatch");
        }

        for (arg, &param) in args.iter().zip(params.iter()) {
            let arg_ty = self.ty_of(*arg);
            if !self.types.assignable(param, arg_ty) {
                let arg_span = self.span_of(*arg);
                errors::report(
                    &self.reports,
                    ErrorKind::TypeMismatch,
                    arg_span,
                    format!(
                        "argument of type `{}` does not match parameter `{}`",
                        self.types.display(arg_ty),
                        self.types.display(param)
                    ),
                );
                return self.error(span, "call argument mismatch");
            }
        }

        self.alloc(TreeKind::Call { callee, args }, span, result)
    }

    /// Explicit conversion; the node's type is the target
    pub fn cast(&mut self, span: Span, operand: TreeId, target: TypeId) -> TreeId {
        if let Some(poison) = self.poison_in(&[operand]) {
            return self.propagate(span, poison);
        }
        let from = self.ty_of(operand);
        if !self.types.castable(from, target) {
            errors::report(
                &self.reports,
                ErrorKind::TypeMismatch,
                span.clone(),
                format!(
                    "cannot cast `{}` to `{}`",
                    self.types.display(from),
                    self.types.display(target)
                ),
            );
            return self.error(span, "invalid cast");
        }
        self.alloc(TreeKind::Cast { operand }, span, target)
    }

    /// Address of an lvalue; yields a non-indexable pointer
    pub fn addr_of(&mut self, span: Span, operand: TreeId) -> TreeId {
        if let Some(poison) = self.poison_in(&[operand]) {
            return self.propagate(span, poison);
        }
        if !self.is_lvalue(operand) {
            errors::report(
                &self.reports,
                ErrorKind::ShapeMismatch,
                span.clone(),
                "cannot take the address of this expression",
            );
            return self.error(span, "address of non-lvalue");
        }
        let inner = self.ty_of(operand);
        let ty = self.types.pointer(inner, false);
        self.alloc(TreeKind::AddrOf { operand }, span, ty)
    }

    /// Dereference a pointer-typed expression
    pub fn load(&mut self, span: Span, operand: TreeId) -> TreeId {
        if let Some(poison) = self.poison_in(&[operand]) {
            return self.propagate(span, poison);
        }
        let ty = self.ty_of(operand);
        let followed = self.types.follow(ty);
        let TypeKind::Pointer { element, .. } = *self.types.kind(followed) else {
            errors::report(
                &self.reports,
                ErrorKind::TypeMismatch,
                span.clone(),
                format!("cannot load through `{}`", self.types.display(ty)),
            );
            return self.error(span, "load of non-pointer");
        };
        self.alloc(TreeKind::Load { operand }, span, element)
    }

    /// Element access on an array or indexable pointer
    pub fn index(&mut self, span: Span, array: TreeId, index: TreeId) -> TreeId {
        if let Some(poison) = self.poison_in(&[array, index]) {
            return self.propagate(span, poison);
        }
        let array_ty = self.types.follow(self.ty_of(array));
        let element = match self.types.kind(array_ty) {
            TypeKind::Array { element, .. } => *element,
            TypeKind::Pointer {
                element,
                indexable: true,
            } => *element,
            _ => {
                errors::report(
                    &self.reports,
                    ErrorKind::TypeMismatch,
                    span.clone(),
                    format!("`{}` cannot be indexed", self.types.display(self.ty_of(array))),
                );
                return self.error(span, "index of non-array");
            }
        };
        let index_ty = self.ty_of(index);
        if !self.types.is_digit(index_ty) {
            errors::report(
                &self.reports,
                ErrorKind::TypeMismatch,
                span.clone(),
                format!("index must be a digit, found `{}`", self.types.display(index_ty)),
            );
            return self.error(span, "non-digit index");
        }
        self.alloc(TreeKind::Index { array, index }, span, element)
    }

    /// Field access on a record or union
    pub fn member(&mut self, span: Span, object: TreeId, field: impl Into<String>) -> TreeId {
        if let Some(poison) = self.poison_in(&[object]) {
            return self.propagate(span, poison);
        }
        let field = field.into();
        let object_ty = self.types.follow(self.ty_of(object));
        let fields = match self.types.kind(object_ty) {
            TypeKind::Record { fields, .. } | TypeKind::Union { fields, .. } => fields,
            _ => {
                errors::report(
                    &self.reports,
                    ErrorKind::TypeMismatch,
                    span.clone(),
                    format!("`{}` has no fields", self.types.display(self.ty_of(object))),
                );
                return self.error(span, "member of non-aggregate");
            }
        };
        let Some((_, field_ty)) = fields.iter().find(|(name, _)| *name == field) else {
            errors::report(
                &self.reports,
                ErrorKind::UndefinedReference,
                span.clone(),
                format!(
                    "`{}` has no field named `{}`",
                    self.types.display(object_ty),
                    field
                ),
            );
            return self.error(span, "unknown field");
        };
        let field_ty = *field_ty;
        self.alloc(TreeKind::Member { object, field }, span, field_ty)
    }

    // statements

    pub fn stmts(&mut self, span: Span, stmts: Vec<TreeId>) -> TreeId {
        let ty = self.types.unit();
        self.alloc(TreeKind::Stmts { stmts }, span, ty)
    }

    /// Two-way branch; the condition must be boolean
    pub fn branch(&mut self, span: Span, cond: TreeId, then: TreeId, other: Option<TreeId>) -> TreeId {
        if let Some(poison) = self.poison_in(&[cond]) {
            return self.propagate(span, poison);
        }
        let cond_ty = self.ty_of(cond);
        if !self.types.is_bool(cond_ty) {
            errors::report(
                &self.reports,
                ErrorKind::TypeMismatch,
                span.clone(),
                format!("branch condition must be `bool`, found `{}`", self.types.display(cond_ty)),
            );
            return self.error(span, "non-bool condition");
        }
        let ty = self.types.unit();
        self.alloc(TreeKind::Branch { cond, then, other }, span, ty)
    }

    /// Condition-guarded loop; `other` runs on natural exit only
    pub fn loop_(&mut self, span: Span, cond: TreeId, body: TreeId, other: Option<TreeId>) -> TreeId {
        if let Some(poison) = self.poison_in(&[cond]) {
            return self.propagate(span, poison);
        }
        let cond_ty = self.ty_of(cond);
        if !self.types.is_bool(cond_ty) {
            errors::report(
                &self.reports,
                ErrorKind::TypeMismatch,
                span.clone(),
                format!("loop condition must be `bool`, found `{}`", self.types.display(cond_ty)),
            );
            return self.error(span, "non-bool condition");
        }
        let ty = self.types.unit();
        self.alloc(TreeKind::Loop { cond, body, other }, span, ty)
    }

    /// Jump out of the target loop
    pub fn break_(&mut self, span: Span, target: TreeId) -> TreeId {
        let ty = self.types.unit();
        self.alloc(TreeKind::Break { target }, span, ty)
    }

    /// Jump back to the target loop's head
    pub fn continue_(&mut self, span: Span, target: TreeId) -> TreeId {
        let ty = self.types.unit();
        self.alloc(TreeKind::Continue { target }, span, ty)
    }

    /// Store into an lvalue of the same type
    pub fn assign(&mut self, span: Span, dst: TreeId, src: TreeId) -> TreeId {
        if let Some(poison) = self.poison_in(&[dst, src]) {
            return self.propagate(span, poison);
        }
        if !self.is_lvalue(dst) {
            errors::report(
                &self.reports,
                ErrorKind::ShapeMismatch,
                span.clone(),
                "left side of assignment is not assignable",
            );
            return self.error(span, "assignment to non-lvalue");
        }
        let dst_ty = self.ty_of(dst);
        let src_ty = self.ty_of(src);
        if !self.types.assignable(dst_ty, src_ty) {
            errors::report(
                &self.reports,
                ErrorKind::TypeMismatch,
                span.clone(),
                format!(
                    "cannot assign `{}` to `{}`",
                    self.types.display(src_ty),
                    self.types.display(dst_ty)
                ),
            );
            return self.error(span, "assignment type mismatch");
        }
        let ty = self.types.unit();
        self.alloc(TreeKind::Assign { dst, src }, span, ty)
    }

    /// Return from a function with the given result type
    pub fn ret(&mut self, span: Span, result: TypeId, value: Option<TreeId>) -> TreeId {
        if let Some(value) = value
            && let Some(poison) = self.poison_in(&[value])
        {
            return self.propagate(span, poison);
        }
        match value {
            Some(value) => {
                let value_ty = self.ty_of(value);
                if !self.types.equals(result, value_ty) {
                    errors::report(
                        &self.reports,
                        ErrorKind::TypeMismatch,
                        span.clone(),
                        format!(
                            "returning `{}` from a function producing `{}`",
                            self.types.display(value_ty),
                            self.types.display(result)
                        ),
                    );
                    return self.error(span, "return type mismatch");
                }
            }
            None => {
                if !self.types.is_unit_result(result) {
                    errors::report(
                        &self.reports,
                        ErrorKind::TypeMismatch,
                        span.clone(),
                        format!(
                            "bare return in a function producing `{}`",
                            self.types.display(result)
                        ),
                    );
                    return self.error(span, "missing return value");
                }
            }
        }
        let ty = self.types.unit();
        self.alloc(TreeKind::Return { value }, span, ty)
    }

    // declarations

    pub fn param(&mut self, span: Span, name: impl Into<String>, ty: TypeId) -> TreeId {
        self.alloc(TreeKind::Param { name: name.into() }, span, ty)
    }

    pub fn local(&mut self, span: Span, name: impl Into<String>, ty: TypeId) -> TreeId {
        self.alloc(TreeKind::Local { name: name.into() }, span, ty)
    }

    pub fn field(&mut self, span: Span, name: impl Into<String>, ty: TypeId) -> TreeId {
        self.alloc(TreeKind::Field { name: name.into() }, span, ty)
    }

    /// Complete global declaration
    pub fn global(&mut self, span: Span, name: impl Into<String>, ty: TypeId, init: Option<TreeId>) -> TreeId {
        let name = name.into();
        if let Some(init) = init {
            let init_ty = self.ty_of(init);
            if !self.is_error(init) && !self.types.assignable(ty, init_ty) {
                errors::report(
                    &self.reports,
                    ErrorKind::TypeMismatch,
                    span.clone(),
                    format!(
                        "initializer of type `{}` does not match `{}`",
                        self.types.display(init_ty),
                        self.types.display(ty)
                    ),
                );
                let poison = self.error(span.clone(), "initializer type mismatch");
                return self.alloc(
                    TreeKind::Global {
                        name,
                        init: Some(poison),
                    },
                    span,
                    ty,
                );
            }
        }
        self.alloc(TreeKind::Global { name, init }, span, ty)
    }

    /// Complete function declaration; `signature` must be a closure type
    pub fn function(
        &mut self,
        span: Span,
        name: impl Into<String>,
        signature: TypeId,
        params: Vec<TreeId>,
        body: Option<TreeId>,
    ) -> TreeId {
        self.alloc(
            TreeKind::Function {
                name: name.into(),
                params,
                locals: Vec::new(),
                body,
            },
            span,
            signature,
        )
    }

    /// Forward global; finished by `close_global` from its resolver
    pub fn open_global(&mut self, span: Span, name: impl Into<String>, ty: TypeId, resolver: Resolver) -> TreeId {
        self.alloc(
            TreeKind::Resolve {
                name: name.into(),
                expected: DeclKind::Global,
                resolver,
            },
            span,
            ty,
        )
    }

    /// Forward function; finished by `close_function` from its resolver
    pub fn open_function(
        &mut self,
        span: Span,
        name: impl Into<String>,
        signature: TypeId,
        resolver: Resolver,
    ) -> TreeId {
        self.alloc(
            TreeKind::Resolve {
                name: name.into(),
                expected: DeclKind::Function,
                resolver,
            },
            span,
            signature,
        )
    }

    /// Finish a forward global in place
    pub fn close_global(&mut self, decl: TreeId, init: Option<TreeId>) {
        self.close_decl(decl, DeclKind::Global, |name| TreeKind::Global { name, init });
    }

    /// Finish a forward function in place
    pub fn close_function(&mut self, decl: TreeId, params: Vec<TreeId>, body: Option<TreeId>) {
        self.close_decl(decl, DeclKind::Function, |name| TreeKind::Function {
            name,
            params,
            locals: Vec::new(),
            body,
        });
    }

    fn close_decl(&mut self, decl: TreeId, kind: DeclKind, finish: impl FnOnce(String) -> TreeKind) {
        match &self.node(decl).kind {
            // poisoned while resolving; leave the poison alone
            TreeKind::Error { .. } => {}
            TreeKind::Resolve { name, expected, .. } if *expected == kind => {
                let name = name.clone();
                self.node_mut(decl).kind = finish(name);
            }
            TreeKind::Resolve { name, expected, .. } => {
                let text = format!(
                    "`{}` was forward-declared as a {} but closed as a {}",
                    name, expected, kind
                );
                let span = self.span_of(decl);
                errors::report(&self.reports, ErrorKind::InternalInvariant, span, text);
            }
            _ => {
                let span = self.span_of(decl);
                errors::report(
                    &self.reports,
                    ErrorKind::InternalInvariant,
                    span,
                    format!("closing a declaration that is not forward ({})", kind),
                );
            }
        }
    }

    /// May this expression appear on the left of an assignment?
    pub fn is_lvalue(&self, id: TreeId) -> bool {
        match &self.node(id).kind {
            TreeKind::Name { decl } => matches!(
                self.node(*decl).kind,
                TreeKind::Global { .. }
                    | TreeKind::Local { .. }
                    | TreeKind::Param { .. }
                    | TreeKind::Resolve {
                        expected: DeclKind::Global,
                        ..
                    }
            ),
            TreeKind::Index { .. } | TreeKind::Member { .. } | TreeKind::Load { .. } => true,
            _ => false,
        }
    }
}
