//! Module namespaces and lazy resolution
//!
//! A module is a tree node holding a *tag table*: a fixed-size vector of
//! name-to-node maps, one per declaration category. The base categories are
//! [`Tag::Values`], [`Tag::Types`], [`Tag::Procs`] and [`Tag::Modules`];
//! front-ends that need more request extra slots when building the root
//! module. Lookup walks the parent chain; insertion is first-write-wins and
//! hands back the existing node so callers can report a redefinition.
//!
//! Forward declarations are finished lazily through the [`Cookie`]: a stack
//! of declarations currently being resolved. Touching a declaration that is
//! already on the stack is the cycle condition: one diagnostic names every
//! participant, all of them are poisoned to `Error`, and resolution
//! continues so later declarations still get their own diagnostics.

use crate::errors::{self, ErrorKind};
use crate::tree::{TreeContext, TreeId, TreeKind};
use cthulhu_core::scan::Span;
use std::collections::{HashMap, HashSet};

/// Declaration categories of a module's tag table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Values,
    Types,
    Procs,
    Modules,
    /// Front-end specific slot, counted from zero
    Extra(usize),
}

impl Tag {
    /// Number of slots every module carries
    pub const BASE: usize = 4;

    pub fn index(self) -> usize {
        match self {
            Tag::Values => 0,
            Tag::Types => 1,
            Tag::Procs => 2,
            Tag::Modules => 3,
            Tag::Extra(n) => Tag::BASE + n,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tag::Values => "values",
            Tag::Types => "types",
            Tag::Procs => "procs",
            Tag::Modules => "modules",
            Tag::Extra(_) => "extra",
        }
    }
}

/// The resolution stack
///
/// Tracks declarations whose resolvers are currently on the call stack, plus
/// the set poisoned by a detected cycle. One cookie is shared by the whole
/// lifetime.
#[derive(Default)]
pub struct Cookie {
    stack: Vec<TreeId>,
    poisoned: HashSet<TreeId>,
}

impl Cookie {
    pub fn new() -> Self {
        Cookie::default()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

impl TreeContext {
    /// Create a root module with `extra_tags` front-end specific slots
    pub fn module_root(&mut self, span: Span, name: impl Into<String>, extra_tags: usize) -> TreeId {
        let slots = Tag::BASE + extra_tags;
        let empty = self.types.empty();
        self.alloc(
            TreeKind::Module {
                name: name.into(),
                parent: None,
                tags: vec![HashMap::new(); slots],
            },
            span,
            empty,
        )
    }

    /// Create a submodule; inherits the parent's slot count
    pub fn module_new(&mut self, parent: TreeId, span: Span, name: impl Into<String>) -> TreeId {
        let slots = match &self.node(parent).kind {
            TreeKind::Module { tags, .. } => tags.len(),
            _ => Tag::BASE,
        };
        let empty = self.types.empty();
        self.alloc(
            TreeKind::Module {
                name: name.into(),
                parent: Some(parent),
                tags: vec![HashMap::new(); slots],
            },
            span,
            empty,
        )
    }

    /// Look a name up under a tag, walking the parent chain
    pub fn module_lookup(&self, module: TreeId, tag: Tag, name: &str) -> Option<TreeId> {
        let mut current = Some(module);
        while let Some(id) = current {
            let TreeKind::Module { parent, tags, .. } = &self.node(id).kind else {
                return None;
            };
            if let Some(map) = tags.get(tag.index())
                && let Some(&found) = map.get(name)
            {
                return Some(found);
            }
            current = *parent;
        }
        None
    }

    /// Insert a declaration; first write wins
    ///
    /// Returns the previously visible node (here or in a parent) when the
    /// name is already taken, leaving the table unchanged. Callers turn that
    /// into a redefinition diagnostic.
    pub fn module_add(&mut self, module: TreeId, tag: Tag, name: &str, node: TreeId) -> Option<TreeId> {
        if let Some(existing) = self.module_lookup(module, tag, name) {
            return Some(existing);
        }
        match &mut self.node_mut(module).kind {
            TreeKind::Module { tags, .. } => {
                if let Some(map) = tags.get_mut(tag.index()) {
                    map.insert(name.to_string(), node);
                    None
                } else {
                    let span = self.span_of(module);
                    errors::report(
                        &self.reports,
                        ErrorKind::InternalInvariant,
                        span,
                        format!("module has no tag slot {}", tag.index()),
                    );
                    None
                }
            }
            _ => {
                let span = self.span_of(module);
                errors::report(
                    &self.reports,
                    ErrorKind::InternalInvariant,
                    span,
                    "module_add on a non-module node",
                );
                None
            }
        }
    }

    /// Name-sorted snapshot of one tag map
    ///
    /// The sort keeps iteration deterministic across runs; callers must not
    /// read meaning into the order.
    pub fn module_tag(&self, module: TreeId, tag: Tag) -> Vec<(String, TreeId)> {
        let TreeKind::Module { tags, .. } = &self.node(module).kind else {
            return Vec::new();
        };
        let Some(map) = tags.get(tag.index()) else {
            return Vec::new();
        };
        let mut entries: Vec<(String, TreeId)> = map.iter().map(|(k, &v)| (k.clone(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn module_parent(&self, module: TreeId) -> Option<TreeId> {
        match &self.node(module).kind {
            TreeKind::Module { parent, .. } => *parent,
            _ => None,
        }
    }
}

/// Resolve a declaration, finishing it if it is still forward
///
/// Non-forward declarations return unchanged without touching their resolver.
/// A declaration already on the cookie stack is a cycle: one
/// [`ErrorKind::CyclicDependency`] diagnostic lists every participant, all of
/// them are poisoned (each frame rewrites its declaration to `Error` as it
/// unwinds), and a fresh poison node is returned to the inner caller.
pub fn resolve(tcx: &mut TreeContext, decl: TreeId) -> TreeId {
    if !matches!(tcx.node(decl).kind, TreeKind::Resolve { .. }) {
        return decl;
    }

    if let Some(at) = tcx.cookie.stack.iter().position(|&d| d == decl) {
        let cycle: Vec<TreeId> = tcx.cookie.stack[at..].to_vec();
        let span = tcx.span_of(decl);
        let name = tcx.name_of(decl).unwrap_or("<unnamed>").to_string();
        let message = errors::report(
            &tcx.reports,
            ErrorKind::CyclicDependency,
            span.clone(),
            format!("cyclic dependency while resolving `{}`", name),
        );
        for &part in &cycle {
            let part_span = tcx.span_of(part);
            let part_name = tcx.name_of(part).unwrap_or("<unnamed>").to_string();
            tcx.reports.append(
                message,
                Some(part_span),
                format!("`{}` is part of the cycle", part_name),
            );
        }
        for part in cycle {
            tcx.cookie.poisoned.insert(part);
        }
        return tcx.error(span, "cyclic dependency");
    }

    tcx.cookie.stack.push(decl);
    let resolver = match &tcx.node(decl).kind {
        TreeKind::Resolve { resolver, .. } => resolver.clone(),
        _ => unreachable!("checked above"),
    };
    resolver.run(tcx, decl);
    tcx.cookie.stack.pop();

    if tcx.cookie.poisoned.remove(&decl) {
        tcx.node_mut(decl).kind = TreeKind::Error {
            message: "cyclic dependency".into(),
        };
        return decl;
    }

    // a resolver that neither closed nor got poisoned broke its contract
    if let TreeKind::Resolve { name, expected, .. } = &tcx.node(decl).kind {
        let text = format!("resolver for `{}` did not produce a {}", name, expected);
        let span = tcx.span_of(decl);
        errors::report(&tcx.reports, ErrorKind::InternalInvariant, span, text);
        tcx.node_mut(decl).kind = TreeKind::Error {
            message: "unresolved declaration".into(),
        };
    }

    decl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{DeclKind, Resolver};
    use cthulhu_core::reports::Reports;
    use cthulhu_core::scan::Span;

    fn context() -> TreeContext {
        TreeContext::new(Reports::new())
    }

    #[test]
    fn test_lookup_walks_parents() {
        let mut tcx = context();
        let int = tcx.types.digit(crate::types::Sign::Signed, crate::types::Width::Int);
        let parent = tcx.module_root(Span::builtin(), "root", 0);
        let child = tcx.module_new(parent, Span::builtin(), "inner");

        let decl = tcx.alloc(
            TreeKind::Global {
                name: "k".into(),
                init: None,
            },
            Span::builtin(),
            int,
        );
        assert!(tcx.module_add(parent, Tag::Values, "k", decl).is_none());
        assert_eq!(tcx.module_lookup(child, Tag::Values, "k"), Some(decl));
        assert_eq!(
            tcx.module_lookup(child, Tag::Values, "k"),
            tcx.module_lookup(parent, Tag::Values, "k")
        );
    }

    #[test]
    fn test_first_write_wins() {
        let mut tcx = context();
        let unit = tcx.types.unit();
        let module = tcx.module_root(Span::builtin(), "root", 0);
        let first = tcx.alloc(
            TreeKind::Global {
                name: "x".into(),
                init: None,
            },
            Span::builtin(),
            unit,
        );
        let second = tcx.alloc(
            TreeKind::Global {
                name: "x".into(),
                init: None,
            },
            Span::builtin(),
            unit,
        );
        assert!(tcx.module_add(module, Tag::Values, "x", first).is_none());
        assert_eq!(tcx.module_add(module, Tag::Values, "x", second), Some(first));
        assert_eq!(tcx.module_lookup(module, Tag::Values, "x"), Some(first));
    }

    #[test]
    fn test_tags_are_independent() {
        let mut tcx = context();
        let unit = tcx.types.unit();
        let module = tcx.module_root(Span::builtin(), "root", 1);
        let decl = tcx.alloc(
            TreeKind::Global {
                name: "x".into(),
                init: None,
            },
            Span::builtin(),
            unit,
        );
        tcx.module_add(module, Tag::Values, "x", decl);
        assert_eq!(tcx.module_lookup(module, Tag::Types, "x"), None);
        assert_eq!(tcx.module_lookup(module, Tag::Extra(0), "x"), None);
        assert_eq!(tcx.module_lookup(module, Tag::Values, "x"), Some(decl));
    }

    #[test]
    fn test_tag_snapshot_is_sorted() {
        let mut tcx = context();
        let unit = tcx.types.unit();
        let module = tcx.module_root(Span::builtin(), "root", 0);
        for name in ["zeta", "alpha", "mid"] {
            let decl = tcx.alloc(
                TreeKind::Global {
                    name: name.into(),
                    init: None,
                },
                Span::builtin(),
                unit,
            );
            tcx.module_add(module, Tag::Values, name, decl);
        }
        let names: Vec<String> = tcx
            .module_tag(module, Tag::Values)
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        use std::cell::Cell;
        use std::rc::Rc;

        let mut tcx = context();
        let int = tcx.types.digit(crate::types::Sign::Signed, crate::types::Width::Int);
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let decl = tcx.open_global(
            Span::builtin(),
            "g",
            int,
            Resolver::new(move |tcx, id| {
                seen.set(seen.get() + 1);
                tcx.close_global(id, None);
            }),
        );

        assert_eq!(resolve(&mut tcx, decl), decl);
        assert!(matches!(tcx.node(decl).kind, TreeKind::Global { .. }));
        assert_eq!(calls.get(), 1);

        // second touch returns unchanged without invoking the resolver
        assert_eq!(resolve(&mut tcx, decl), decl);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_self_cycle_poisons_and_reports_once() {
        let mut tcx = context();
        let int = tcx.types.digit(crate::types::Sign::Signed, crate::types::Width::Int);
        let decl = tcx.open_global(
            Span::builtin(),
            "selfish",
            int,
            Resolver::new(|tcx, id| {
                // the declaration depends on itself
                let poisoned = resolve(tcx, id);
                assert!(tcx.is_error(poisoned));
                tcx.close_global(id, Some(poisoned));
            }),
        );

        resolve(&mut tcx, decl);
        assert!(tcx.is_error(decl));

        let cyclic: Vec<_> = tcx
            .reports
            .messages()
            .into_iter()
            .filter(|m| m.text.contains("cyclic-dependency"))
            .collect();
        assert_eq!(cyclic.len(), 1);
        assert!(cyclic[0].text.contains("selfish"));
    }

    #[test]
    fn test_unclosed_resolver_is_internal() {
        let mut tcx = context();
        let int = tcx.types.digit(crate::types::Sign::Signed, crate::types::Width::Int);
        let decl = tcx.open_global(Span::builtin(), "lazy", int, Resolver::new(|_, _| {}));
        resolve(&mut tcx, decl);
        assert!(tcx.is_error(decl));
        assert!(
            tcx.reports
                .messages()
                .iter()
                .any(|m| m.text.contains("internal-invariant"))
        );
    }

    #[test]
    fn test_expected_kind_is_checked_on_close() {
        let mut tcx = context();
        let int = tcx.types.digit(crate::types::Sign::Signed, crate::types::Width::Int);
        let decl = tcx.open_global(
            Span::builtin(),
            "g",
            int,
            Resolver::new(move |tcx, id| {
                // closing a forward global as a function breaks the contract
                tcx.close_function(id, vec![], None);
            }),
        );
        assert!(matches!(
            tcx.node(decl).kind,
            TreeKind::Resolve {
                expected: DeclKind::Global,
                ..
            }
        ));
        resolve(&mut tcx, decl);
        assert!(
            tcx.reports
                .messages()
                .iter()
                .any(|m| m.text.contains("internal-invariant"))
        );
    }
}
