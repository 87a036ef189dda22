//! The typed tree IR
//!
//! Every front-end lowers its language-specific AST into this uniform typed
//! representation. Nodes live in a [`TreeArena`] owned by the lifetime's
//! [`TreeContext`] and refer to each other by [`TreeId`], which makes the
//! cyclic shapes of real programs (a module containing a function whose body
//! names a global of that module) representable without ownership cycles.
//!
//! A node is a kind payload plus the data every node carries: the source
//! span, the type the node evaluates to (types themselves carry the `Meta`
//! sentinel), and declaration attributes. Forward declarations are nodes of
//! kind [`TreeKind::Resolve`] holding a resolver callback; resolution
//! rewrites the kind in place. The [`TreeKind::Error`] kind is poison: it
//! carries a message that was already reported and flows through every
//! constructor without producing further diagnostics.

use crate::sema::Cookie;
use crate::types::{TypeId, Types};
use cthulhu_core::reports::Reports;
use cthulhu_core::scan::Span;
use num_bigint::BigInt;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ops::{BinaryOp, CompareOp, UnaryOp};

/// Index of a node in the tree arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeId(pub u32);

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// How a declaration is visible across module boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Linkage {
    /// Only visible inside the defining module tree
    #[default]
    Internal,
    /// Declared here, defined elsewhere
    Import,
    /// Visible to importers
    Export,
}

/// Declaration visibility inside a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

/// Attributes attached to every node; meaningful on declarations
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    pub linkage: Linkage,
    pub visibility: Visibility,
    /// Overrides the qualified symbol name during lowering
    pub mangle: Option<String>,
}

impl Attributes {
    pub fn exported() -> Self {
        Attributes {
            linkage: Linkage::Export,
            visibility: Visibility::Public,
            mangle: None,
        }
    }
}

/// The kind a forward declaration promises to become
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Global,
    Function,
    Type,
}

impl DeclKind {
    pub fn name(self) -> &'static str {
        match self {
            DeclKind::Global => "global",
            DeclKind::Function => "function",
            DeclKind::Type => "type",
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolver callback stored in a forward declaration
///
/// Invoked at most once, when the declaration is first touched. The callback
/// is expected to finish the declaration with `close_global` /
/// `close_function` (or leave it poisoned).
#[derive(Clone)]
pub struct Resolver(Rc<dyn Fn(&mut TreeContext, TreeId)>);

impl Resolver {
    pub fn new(f: impl Fn(&mut TreeContext, TreeId) + 'static) -> Self {
        Resolver(Rc::new(f))
    }

    pub fn run(&self, tcx: &mut TreeContext, id: TreeId) {
        (self.0)(tcx, id)
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<resolver>")
    }
}

/// Node payloads
#[derive(Debug, Clone)]
pub enum TreeKind {
    /// Poison; the message was already reported where it was produced
    Error { message: String },

    // literals
    Digit { value: BigInt },
    Bool { value: bool },
    String { value: Vec<u8> },

    // expressions
    /// Reference to a declaration
    Name { decl: TreeId },
    Unary { op: UnaryOp, operand: TreeId },
    Binary { op: BinaryOp, lhs: TreeId, rhs: TreeId },
    Compare { op: CompareOp, lhs: TreeId, rhs: TreeId },
    Call { callee: TreeId, args: Vec<TreeId> },
    Index { array: TreeId, index: TreeId },
    Member { object: TreeId, field: String },
    /// The node's own type is the cast target
    Cast { operand: TreeId },
    AddrOf { operand: TreeId },
    Load { operand: TreeId },

    // statements
    Stmts { stmts: Vec<TreeId> },
    Branch { cond: TreeId, then: TreeId, other: Option<TreeId> },
    Loop { cond: TreeId, body: TreeId, other: Option<TreeId> },
    Break { target: TreeId },
    Continue { target: TreeId },
    Assign { dst: TreeId, src: TreeId },
    Return { value: Option<TreeId> },

    // declarations
    Global { name: String, init: Option<TreeId> },
    Function {
        name: String,
        params: Vec<TreeId>,
        locals: Vec<TreeId>,
        body: Option<TreeId>,
    },
    Param { name: String },
    Local { name: String },
    Field { name: String },

    /// A namespace: the tag table plus a weak parent reference
    Module {
        name: String,
        parent: Option<TreeId>,
        tags: Vec<HashMap<String, TreeId>>,
    },

    /// Forward declaration, finished on first touch
    Resolve {
        name: String,
        expected: DeclKind,
        resolver: Resolver,
    },
}

/// A node: kind payload plus the data every node carries
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub kind: TreeKind,
    pub span: Span,
    /// The type this node evaluates to
    pub ty: TypeId,
    pub attribs: Attributes,
}

/// Flat storage for tree nodes
#[derive(Default)]
pub struct TreeArena {
    nodes: Vec<TreeNode>,
}

impl TreeArena {
    pub fn alloc(&mut self, node: TreeNode) -> TreeId {
        let id = TreeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: TreeId) -> &TreeNode {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: TreeId) -> &mut TreeNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Shared state of one compilation lifetime
///
/// Owns the node arena, the type registry, the diagnostics sink, and the
/// resolution cookie. Drivers receive `&mut TreeContext` in every stage
/// callback and resolver.
pub struct TreeContext {
    pub arena: TreeArena,
    pub types: Types,
    pub reports: Rc<Reports>,
    pub cookie: Cookie,
}

impl TreeContext {
    pub fn new(reports: Rc<Reports>) -> Self {
        TreeContext {
            arena: TreeArena::default(),
            types: Types::new(),
            reports,
            cookie: Cookie::new(),
        }
    }

    pub fn alloc(&mut self, kind: TreeKind, span: Span, ty: TypeId) -> TreeId {
        self.arena.alloc(TreeNode {
            kind,
            span,
            ty,
            attribs: Attributes::default(),
        })
    }

    pub fn node(&self, id: TreeId) -> &TreeNode {
        self.arena.get(id)
    }

    pub fn node_mut(&mut self, id: TreeId) -> &mut TreeNode {
        self.arena.get_mut(id)
    }

    pub fn span_of(&self, id: TreeId) -> Span {
        self.node(id).span.clone()
    }

    pub fn ty_of(&self, id: TreeId) -> TypeId {
        self.node(id).ty
    }

    pub fn is_error(&self, id: TreeId) -> bool {
        matches!(self.node(id).kind, TreeKind::Error { .. })
    }

    /// Create a poison node. The caller must already have reported the
    /// condition; this emits no diagnostic.
    pub fn error(&mut self, span: Span, message: impl Into<String>) -> TreeId {
        let empty = self.types.empty();
        self.alloc(
            TreeKind::Error {
                message: message.into(),
            },
            span,
            empty,
        )
    }

    /// The declared name of a node, if its kind carries one
    pub fn name_of(&self, id: TreeId) -> Option<&str> {
        match &self.node(id).kind {
            TreeKind::Global { name, .. }
            | TreeKind::Function { name, .. }
            | TreeKind::Param { name }
            | TreeKind::Local { name }
            | TreeKind::Field { name }
            | TreeKind::Module { name, .. }
            | TreeKind::Resolve { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn set_attribs(&mut self, id: TreeId, attribs: Attributes) {
        self.node_mut(id).attribs = attribs;
    }

    pub fn is_imported(&self, id: TreeId) -> bool {
        self.node(id).attribs.linkage == Linkage::Import
    }

    pub fn is_exported(&self, id: TreeId) -> bool {
        self.node(id).attribs.linkage == Linkage::Export
    }

    /// Append a local to a function declaration
    pub fn add_local(&mut self, function: TreeId, local: TreeId) {
        match &mut self.node_mut(function).kind {
            TreeKind::Function { locals, .. } => locals.push(local),
            _ => {
                let span = self.span_of(function);
                self.reports.report(
                    cthulhu_core::reports::Severity::Internal,
                    Some(span),
                    "add_local on a non-function declaration",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cthulhu_core::reports::Reports;

    fn context() -> TreeContext {
        TreeContext::new(Reports::new())
    }

    #[test]
    fn test_arena_round_trip() {
        let mut tcx = context();
        let ty = tcx.types.bool_t();
        let id = tcx.alloc(TreeKind::Bool { value: true }, Span::builtin(), ty);
        assert!(matches!(tcx.node(id).kind, TreeKind::Bool { value: true }));
        assert_eq!(tcx.ty_of(id), ty);
    }

    #[test]
    fn test_error_nodes_are_poison() {
        let mut tcx = context();
        let id = tcx.error(Span::builtin(), "went wrong");
        assert!(tcx.is_error(id));
        // poison creation does not report
        assert!(tcx.reports.is_empty());
    }

    #[test]
    fn test_name_queries() {
        let mut tcx = context();
        let int = tcx.types.digit(crate::types::Sign::Signed, crate::types::Width::Int);
        let global = tcx.alloc(
            TreeKind::Global {
                name: "answer".into(),
                init: None,
            },
            Span::builtin(),
            int,
        );
        assert_eq!(tcx.name_of(global), Some("answer"));
        let lit = tcx.alloc(TreeKind::Digit { value: 1.into() }, Span::builtin(), int);
        assert_eq!(tcx.name_of(lit), None);
    }

    #[test]
    fn test_default_attribs_are_internal_private() {
        let mut tcx = context();
        let unit = tcx.types.unit();
        let id = tcx.alloc(
            TreeKind::Global {
                name: "g".into(),
                init: None,
            },
            Span::builtin(),
            unit,
        );
        assert_eq!(tcx.node(id).attribs.linkage, Linkage::Internal);
        assert_eq!(tcx.node(id).attribs.visibility, Visibility::Private);
        assert!(!tcx.is_exported(id));
    }
}
